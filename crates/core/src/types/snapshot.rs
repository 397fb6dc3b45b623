//! Order-book snapshot: one top-of-book observation plus aggregate depth.
//!
//! Snapshots are the raw input of the feature pipeline. They are immutable
//! once ingested and ordered by timestamp within a symbol.

use serde::{Deserialize, Serialize};

use super::market::Symbol;
use super::timestamp::Timestamp;

/// One timestamped order-book observation.
///
/// `mid_price` and `spread` are derived from the best bid/ask at
/// construction. When deserializing, they may be omitted and are then
/// derived the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRecord")]
pub struct Snapshot {
    /// Trading pair.
    pub symbol: Symbol,
    /// Observation time.
    pub timestamp: Timestamp,
    /// Best bid price.
    pub bid_price: f64,
    /// Best ask price.
    pub ask_price: f64,
    /// Quantity resting at the best bid.
    pub bid_qty: f64,
    /// Quantity resting at the best ask.
    pub ask_qty: f64,
    /// `(bid + ask) / 2`.
    pub mid_price: f64,
    /// `ask - bid`.
    pub spread: f64,
    /// Aggregate resting bid quantity across the recorded levels.
    pub bid_depth: f64,
    /// Aggregate resting ask quantity across the recorded levels.
    pub ask_depth: f64,
    /// Traded volume on the bid side since the previous snapshot.
    pub bid_volume: f64,
    /// Traded volume on the ask side since the previous snapshot.
    pub ask_volume: f64,
}

impl Snapshot {
    /// Build a snapshot from the top of book.
    ///
    /// Depth defaults to the best-level quantities and volumes to zero;
    /// use [`with_depth`](Self::with_depth) and
    /// [`with_volume`](Self::with_volume) to fill them in.
    pub fn new(
        symbol: Symbol,
        timestamp: Timestamp,
        bid_price: f64,
        ask_price: f64,
        bid_qty: f64,
        ask_qty: f64,
    ) -> Self {
        Self {
            symbol,
            timestamp,
            bid_price,
            ask_price,
            bid_qty,
            ask_qty,
            mid_price: (bid_price + ask_price) / 2.0,
            spread: ask_price - bid_price,
            bid_depth: bid_qty,
            ask_depth: ask_qty,
            bid_volume: 0.0,
            ask_volume: 0.0,
        }
    }

    /// Set aggregate book depth on each side.
    pub fn with_depth(mut self, bid_depth: f64, ask_depth: f64) -> Self {
        self.bid_depth = bid_depth;
        self.ask_depth = ask_depth;
        self
    }

    /// Set traded volume on each side.
    pub fn with_volume(mut self, bid_volume: f64, ask_volume: f64) -> Self {
        self.bid_volume = bid_volume;
        self.ask_volume = ask_volume;
        self
    }

    /// Spread in basis points of the mid price (0 when mid is not positive).
    pub fn spread_bps(&self) -> f64 {
        if self.mid_price > 0.0 {
            self.spread / self.mid_price * 10_000.0
        } else {
            0.0
        }
    }
}

/// Wire shape of a snapshot row; derived fields are optional.
#[derive(Deserialize)]
struct SnapshotRecord {
    symbol: Symbol,
    timestamp: Timestamp,
    bid_price: f64,
    ask_price: f64,
    bid_qty: f64,
    ask_qty: f64,
    #[serde(default)]
    mid_price: Option<f64>,
    #[serde(default)]
    spread: Option<f64>,
    #[serde(default)]
    bid_depth: Option<f64>,
    #[serde(default)]
    ask_depth: Option<f64>,
    #[serde(default)]
    bid_volume: f64,
    #[serde(default)]
    ask_volume: f64,
}

impl From<SnapshotRecord> for Snapshot {
    fn from(r: SnapshotRecord) -> Self {
        let mut snap = Snapshot::new(
            r.symbol,
            r.timestamp,
            r.bid_price,
            r.ask_price,
            r.bid_qty,
            r.ask_qty,
        );
        if let Some(mid) = r.mid_price {
            snap.mid_price = mid;
        }
        if let Some(spread) = r.spread {
            snap.spread = spread;
        }
        snap.bid_depth = r.bid_depth.unwrap_or(r.bid_qty);
        snap.ask_depth = r.ask_depth.unwrap_or(r.ask_qty);
        snap.with_volume(r.bid_volume, r.ask_volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot::new(
            Symbol::new("BTCUSDT"),
            Timestamp::from_millis(1706000000000),
            50000.0,
            50001.0,
            1.5,
            0.5,
        )
    }

    #[test]
    fn test_derived_fields() {
        let snap = sample();
        assert_eq!(snap.mid_price, 50000.5);
        assert_eq!(snap.spread, 1.0);
        assert_eq!(snap.bid_depth, 1.5);
        assert_eq!(snap.ask_volume, 0.0);
    }

    #[test]
    fn test_spread_bps() {
        let snap = sample();
        let bps = snap.spread_bps();
        assert!((bps - 1.0 / 50000.5 * 10_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_deserialize_derives_missing_fields() {
        let json = r#"{
            "symbol": "ETHUSDT",
            "timestamp": 1000,
            "bid_price": 99.0,
            "ask_price": 101.0,
            "bid_qty": 2.0,
            "ask_qty": 3.0,
            "bid_volume": 7.0
        }"#;
        let snap: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.mid_price, 100.0);
        assert_eq!(snap.spread, 2.0);
        assert_eq!(snap.ask_depth, 3.0);
        assert_eq!(snap.bid_volume, 7.0);
    }

    #[test]
    fn test_serialize_roundtrip_keeps_depth() {
        let snap = sample().with_depth(10.0, 12.0).with_volume(1.0, 2.0);
        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
