//! Trading metrics from direction predictions.
//!
//! Each sample's simulated return is `base_return × predicted_sign ×
//! actual_sign`: a correct directional call earns `base_return`, a wrong
//! one loses it, and a flat call (or flat outcome) returns nothing.

use serde::{Deserialize, Serialize};

use tc_core::config::EvaluationSettings;
use tc_core::types::{ClassProbs, Direction};
use tc_ml::argmax;

/// Parameters of the return simulation and Sharpe ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingParams {
    pub base_return: f64,
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl Default for TradingParams {
    fn default() -> Self {
        Self::from(&EvaluationSettings::default())
    }
}

impl From<&EvaluationSettings> for TradingParams {
    fn from(s: &EvaluationSettings) -> Self {
        Self {
            base_return: s.base_return,
            risk_free_rate: s.risk_free_rate,
            periods_per_year: s.periods_per_year,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingMetrics {
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    /// Compounded return of the simulated series.
    pub total_return: f64,
    pub mean_return: f64,
}

/// Per-sample simulated returns.
pub fn simulated_returns(predictions: &[ClassProbs], labels: &[ClassProbs], base_return: f64) -> Vec<f64> {
    predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| {
            let predicted = Direction::from_class(argmax(p)).sign() as f64;
            let actual = Direction::from_class(argmax(y)).sign() as f64;
            base_return * predicted * actual
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// `(mean − rf / periods) / std` over per-period returns; 0 when the
/// returns have no volatility.
pub fn sharpe_ratio(returns: &[f64], annual_risk_free: f64, periods_per_year: f64) -> f64 {
    let sd = std_dev(returns);
    if sd == 0.0 || !sd.is_finite() {
        return 0.0;
    }
    let per_period_rf = if periods_per_year > 0.0 {
        annual_risk_free / periods_per_year
    } else {
        0.0
    };
    (mean(returns) - per_period_rf) / sd
}

/// Largest peak-to-trough fractional decline of a value curve.
pub fn max_drawdown_of_curve(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}

/// Compounded curve starting at 1.0 (the start point is included).
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut v = 1.0;
    curve.push(v);
    for r in returns {
        v *= 1.0 + r;
        curve.push(v);
    }
    curve
}

/// Max drawdown of the compounded curve of `returns`.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    max_drawdown_of_curve(&equity_curve(returns))
}

/// Fraction of returns strictly above zero.
pub fn win_rate(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
}

/// All trading metrics for a prediction set.
pub fn trading_metrics(predictions: &[ClassProbs], labels: &[ClassProbs], params: &TradingParams) -> TradingMetrics {
    let returns = simulated_returns(predictions, labels, params.base_return);
    let curve = equity_curve(&returns);
    TradingMetrics {
        sharpe_ratio: sharpe_ratio(&returns, params.risk_free_rate, params.periods_per_year),
        max_drawdown: max_drawdown_of_curve(&curve),
        win_rate: win_rate(&returns),
        total_return: curve.last().copied().unwrap_or(1.0) - 1.0,
        mean_return: mean(&returns),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hot(d: Direction) -> ClassProbs {
        d.one_hot()
    }

    #[test]
    fn test_simulated_returns_sign_rules() {
        let preds = [hot(Direction::Up), hot(Direction::Up), hot(Direction::Flat), hot(Direction::Down)];
        let labels = [hot(Direction::Up), hot(Direction::Down), hot(Direction::Up), hot(Direction::Down)];
        let r = simulated_returns(&preds, &labels, 0.01);
        assert_eq!(r, vec![0.01, -0.01, 0.0, 0.01]);
    }

    #[test]
    fn test_sharpe_zero_without_volatility() {
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 0.02, 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[], 0.02, 252.0), 0.0);
    }

    #[test]
    fn test_sharpe_value() {
        let r = [0.02, 0.0];
        // mean 0.01, population std 0.01, rf per period 0
        assert!((sharpe_ratio(&r, 0.0, 252.0) - 1.0).abs() < 1e-12);
        let with_rf = sharpe_ratio(&r, 0.252, 252.0);
        assert!((with_rf - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown() {
        // 1.0 → 1.1 → 0.88 → 0.968
        let dd = max_drawdown(&[0.1, -0.2, 0.1]);
        assert!((dd - 0.2).abs() < 1e-12);
        assert_eq!(max_drawdown(&[0.01, 0.02]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
        // A first-step loss counts against the 1.0 start.
        assert!((max_drawdown(&[-0.5]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(&[0.01, 0.0, -0.01, 0.02]), 0.5);
        assert_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn test_trading_metrics_perfect_calls() {
        let preds = vec![hot(Direction::Up), hot(Direction::Down)];
        let labels = preds.clone();
        let m = trading_metrics(&preds, &labels, &TradingParams::default());
        assert_eq!(m.win_rate, 1.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert!((m.total_return - (1.01f64 * 1.01 - 1.0)).abs() < 1e-12);
    }
}
