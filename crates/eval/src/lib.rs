//! # tc-eval
//!
//! Metrics and replay over model predictions.
//!
//! - [`classification`]: loss, accuracy, macro precision/recall/F1, confusion
//!   matrix, one-hot regression diagnostics
//! - [`trading`]: simulated directional returns, Sharpe ratio, drawdown,
//!   win rate
//! - [`backtest`]: position-by-position replay with a trade log
//! - [`cv`]: contiguous k-fold cross-validation
//! - [`compare`]: ranking of evaluated runs

pub mod backtest;
pub mod classification;
pub mod compare;
pub mod cv;
pub mod trading;

use serde::{Deserialize, Serialize};

use tc_core::types::ClassProbs;

pub use backtest::{run_backtest, BacktestConfig, BacktestPoint, BacktestResult, Trade};
pub use classification::{
    accuracy, classification_metrics, correct_count, cross_entropy, regression_metrics,
    ClassificationMetrics, RegressionMetrics,
};
pub use compare::{rank_runs, RunEvaluation};
pub use cv::{cross_validate, fold_ranges, CrossValidationResult};
pub use trading::{trading_metrics, TradingMetrics, TradingParams};

/// Everything computed for one prediction set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub samples: usize,
    pub loss: f64,
    pub classification: ClassificationMetrics,
    pub regression: RegressionMetrics,
    pub trading: TradingMetrics,
}

/// Score `predictions` against one-hot `labels`.
pub fn evaluate_predictions(
    predictions: &[ClassProbs],
    labels: &[ClassProbs],
    params: &TradingParams,
) -> EvaluationMetrics {
    EvaluationMetrics {
        samples: predictions.len().min(labels.len()),
        loss: cross_entropy(predictions, labels),
        classification: classification_metrics(predictions, labels),
        regression: regression_metrics(predictions, labels),
        trading: trading_metrics(predictions, labels, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::types::Direction;

    #[test]
    fn test_evaluate_predictions_bundle() {
        let labels = vec![Direction::Up.one_hot(), Direction::Down.one_hot(), Direction::Flat.one_hot()];
        let m = evaluate_predictions(&labels, &labels, &TradingParams::default());
        assert_eq!(m.samples, 3);
        assert_eq!(m.loss, 0.0);
        assert_eq!(m.classification.accuracy, 1.0);
        assert_eq!(m.regression.mse, 0.0);
        // Flat row contributes a zero return.
        assert!((m.trading.win_rate - 2.0 / 3.0).abs() < 1e-12);
    }
}
