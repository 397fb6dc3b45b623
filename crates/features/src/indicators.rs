//! Technical and microstructure indicators over a window of snapshots.
//!
//! All functions are pure. Windows are ordered oldest first; the last
//! element is the current observation.

use tc_core::types::Snapshot;

/// RSI lookback in price changes.
pub const RSI_PERIOD: usize = 14;

/// Simple moving average over the last `period` prices.
///
/// Returns `None` when fewer than `period` prices are available.
pub fn moving_average(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let tail = &prices[prices.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Wilder relative strength index over `period` changes.
///
/// The first average gain/loss is the simple mean of the first `period`
/// changes; later changes are folded in with Wilder smoothing. An average
/// loss of exactly zero yields 100. Returns `None` when fewer than
/// `period + 1` prices are available. The result always lies in [0, 100].
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }
    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let (seed, rest) = changes.split_at(period);
    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / period as f64;

    let n = period as f64;
    for &c in rest {
        avg_gain = (avg_gain * (n - 1.0) + c.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-c).max(0.0)) / n;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
}

/// Sample standard deviation (Bessel-corrected) of log returns.
///
/// Steps touching a non-positive price are skipped. Fewer than two
/// returns gives 0.
pub fn log_return_volatility(prices: &[f64]) -> f64 {
    let returns: Vec<f64> = prices
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.max(0.0).sqrt()
}

/// Absolute and fractional change from the first to the last price.
pub fn price_change(prices: &[f64]) -> Option<(f64, f64)> {
    let (first, last) = (*prices.first()?, *prices.last()?);
    let change = last - first;
    let pct = if first != 0.0 { change / first } else { 0.0 };
    Some((change, pct))
}

/// `(a - b) / (a + b)`, or 0 when the total is not positive.
pub fn imbalance(a: f64, b: f64) -> f64 {
    let total = a + b;
    if total > 0.0 {
        (a - b) / total
    } else {
        0.0
    }
}

/// Quantity-weighted fair price of the top of book.
///
/// Each side's price is weighted by the *opposite* side's quantity, so a
/// heavy bid pulls the price towards the ask. Falls back to mid when both
/// quantities are zero.
pub fn microprice(snap: &Snapshot) -> f64 {
    let total = snap.bid_qty + snap.ask_qty;
    if total > 0.0 {
        (snap.bid_price * snap.ask_qty + snap.ask_price * snap.bid_qty) / total
    } else {
        snap.mid_price
    }
}

/// Top-of-book order-flow imbalance between two consecutive snapshots.
///
/// Bid contribution: current bid quantity if the bid did not fall, minus
/// the previous bid quantity if the bid did not rise. The ask side mirrors
/// it with the opposite sign.
pub fn order_flow_imbalance(prev: &Snapshot, curr: &Snapshot) -> f64 {
    let mut e = 0.0;
    if curr.bid_price >= prev.bid_price {
        e += curr.bid_qty;
    }
    if curr.bid_price <= prev.bid_price {
        e -= prev.bid_qty;
    }
    if curr.ask_price <= prev.ask_price {
        e -= curr.ask_qty;
    }
    if curr.ask_price >= prev.ask_price {
        e += prev.ask_qty;
    }
    e
}

/// Spread relative to mid.
pub fn effective_spread(snap: &Snapshot) -> f64 {
    if snap.mid_price != 0.0 {
        snap.spread / snap.mid_price
    } else {
        0.0
    }
}

/// Absolute fractional mid move since the previous snapshot.
pub fn market_impact(prev: &Snapshot, curr: &Snapshot) -> f64 {
    if prev.mid_price != 0.0 {
        ((curr.mid_price - prev.mid_price) / prev.mid_price).abs()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::types::{Symbol, Timestamp};

    fn snap(bid: f64, ask: f64, bid_qty: f64, ask_qty: f64) -> Snapshot {
        Snapshot::new(Symbol::new("T"), Timestamp(0), bid, ask, bid_qty, ask_qty)
    }

    #[test]
    fn test_moving_average() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(moving_average(&prices, 5), Some(4.0));
        assert_eq!(moving_average(&prices, 6), Some(3.5));
        assert_eq!(moving_average(&prices, 7), None);
    }

    #[test]
    fn test_rsi_requires_period_plus_one() {
        let prices: Vec<f64> = (0..14).map(|i| i as f64).collect();
        assert!(rsi(&prices, RSI_PERIOD).is_none());
        let prices: Vec<f64> = (0..15).map(|i| i as f64).collect();
        assert!(rsi(&prices, RSI_PERIOD).is_some());
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert_eq!(rsi(&prices, RSI_PERIOD), Some(100.0));
    }

    #[test]
    fn test_rsi_flat_is_100() {
        // No losses at all: average loss is exactly zero.
        let prices = vec![50.0; 20];
        assert_eq!(rsi(&prices, RSI_PERIOD), Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&prices, RSI_PERIOD), Some(0.0));
    }

    #[test]
    fn test_rsi_balanced_is_50() {
        // Alternating +1 / -1 over 14 changes: equal gains and losses.
        let prices: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        let v = rsi(&prices, RSI_PERIOD).unwrap();
        assert!((v - 50.0).abs() < 1e-9, "got {v}");
    }

    #[test]
    fn test_rsi_bounded_on_noisy_series() {
        let prices: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0 + (i as f64 * 0.13).cos())
            .collect();
        for end in 15..=prices.len() {
            let v = rsi(&prices[..end], RSI_PERIOD).unwrap();
            assert!((0.0..=100.0).contains(&v), "rsi out of range: {v}");
        }
    }

    #[test]
    fn test_volatility_edge_cases() {
        assert_eq!(log_return_volatility(&[]), 0.0);
        assert_eq!(log_return_volatility(&[100.0, 101.0]), 0.0);
        assert_eq!(log_return_volatility(&[100.0; 10]), 0.0);
        let v = log_return_volatility(&[100.0, 101.0, 99.0, 102.0]);
        assert!(v > 0.0);
    }

    #[test]
    fn test_volatility_matches_manual() {
        let prices = [100.0, 110.0, 99.0];
        let r1 = (110.0_f64 / 100.0).ln();
        let r2 = (99.0_f64 / 110.0).ln();
        let mean = (r1 + r2) / 2.0;
        let expected = (((r1 - mean).powi(2) + (r2 - mean).powi(2)) / 1.0).sqrt();
        assert!((log_return_volatility(&prices) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_price_change() {
        assert_eq!(price_change(&[]), None);
        let (abs, pct) = price_change(&[100.0, 90.0, 110.0]).unwrap();
        assert!((abs - 10.0).abs() < 1e-12);
        assert!((pct - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_imbalance() {
        assert_eq!(imbalance(3.0, 1.0), 0.5);
        assert_eq!(imbalance(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_microprice_leans_toward_thin_side() {
        // Heavy bid, thin ask: price leans toward the ask.
        let s = snap(100.0, 101.0, 9.0, 1.0);
        let mp = microprice(&s);
        assert!((mp - 100.9).abs() < 1e-9, "got {mp}");
        let empty = snap(100.0, 101.0, 0.0, 0.0);
        assert_eq!(microprice(&empty), 100.5);
    }

    #[test]
    fn test_order_flow_imbalance_unchanged_book() {
        let a = snap(100.0, 101.0, 5.0, 3.0);
        let b = snap(100.0, 101.0, 7.0, 2.0);
        // Same prices: (7 - 5) - (2 - 3) = 3.
        assert!((order_flow_imbalance(&a, &b) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_order_flow_imbalance_bid_up() {
        let a = snap(100.0, 101.0, 5.0, 3.0);
        let b = snap(100.5, 101.0, 2.0, 3.0);
        // Bid rose: +2; ask unchanged: -3 + 3.
        assert!((order_flow_imbalance(&a, &b) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_effective_spread_and_impact() {
        let a = snap(99.0, 101.0, 1.0, 1.0);
        assert!((effective_spread(&a) - 0.02).abs() < 1e-12);
        let b = snap(109.0, 111.0, 1.0, 1.0);
        assert!((market_impact(&a, &b) - 0.1).abs() < 1e-12);
        assert!((market_impact(&b, &a) - 10.0 / 110.0).abs() < 1e-12);
    }
}
