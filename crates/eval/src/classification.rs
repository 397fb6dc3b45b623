//! Classification, regression-style and loss metrics over class
//! probabilities.
//!
//! Predictions and labels are rows of [`ClassProbs`]; labels are one-hot.
//! The predicted and true class of a row is its argmax (first index wins
//! ties).

use serde::{Deserialize, Serialize};

use tc_core::types::{ClassProbs, NUM_CLASSES};
use tc_ml::argmax;

/// Floor applied to probabilities before taking the log.
pub const LOG_EPSILON: f64 = 1e-7;

/// Mean over rows of `Σ_c -y_c · ln(max(p_c, ε))`. Empty input gives 0.
pub fn cross_entropy(predictions: &[ClassProbs], labels: &[ClassProbs]) -> f64 {
    let n = predictions.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = predictions
        .iter()
        .zip(labels)
        .map(|(p, y)| {
            (0..NUM_CLASSES)
                .map(|c| -y[c] * p[c].max(LOG_EPSILON).ln())
                .sum::<f64>()
        })
        .sum();
    total / n as f64
}

/// Number of rows whose predicted class equals the true class.
pub fn correct_count(predictions: &[ClassProbs], labels: &[ClassProbs]) -> usize {
    predictions
        .iter()
        .zip(labels)
        .filter(|(p, y)| argmax(p) == argmax(y))
        .count()
}

/// Fraction of rows classified correctly. Empty input gives 0.
pub fn accuracy(predictions: &[ClassProbs], labels: &[ClassProbs]) -> f64 {
    let n = predictions.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    correct_count(predictions, labels) as f64 / n as f64
}

/// Macro-averaged classification metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// `confusion[true][predicted]`.
    pub confusion: [[usize; NUM_CLASSES]; NUM_CLASSES],
    pub support: usize,
}

/// Accuracy, macro precision/recall, F1 and the confusion matrix.
///
/// A class with no predicted instances contributes no precision term, and
/// one with no true instances contributes no recall term, so the macro
/// averages run only over classes where the ratio is defined. F1 is the
/// harmonic mean of the two macro averages.
pub fn classification_metrics(predictions: &[ClassProbs], labels: &[ClassProbs]) -> ClassificationMetrics {
    let mut confusion = [[0usize; NUM_CLASSES]; NUM_CLASSES];
    for (p, y) in predictions.iter().zip(labels) {
        confusion[argmax(y)][argmax(p)] += 1;
    }
    let support: usize = confusion.iter().flatten().sum();
    if support == 0 {
        return ClassificationMetrics::default();
    }

    let correct: usize = (0..NUM_CLASSES).map(|c| confusion[c][c]).sum();
    let mut precisions = Vec::with_capacity(NUM_CLASSES);
    let mut recalls = Vec::with_capacity(NUM_CLASSES);
    for c in 0..NUM_CLASSES {
        let tp = confusion[c][c];
        let predicted: usize = (0..NUM_CLASSES).map(|t| confusion[t][c]).sum();
        let actual: usize = confusion[c].iter().sum();
        if predicted > 0 {
            precisions.push(tp as f64 / predicted as f64);
        }
        if actual > 0 {
            recalls.push(tp as f64 / actual as f64);
        }
    }

    let mean = |v: &[f64]| {
        if v.is_empty() {
            0.0
        } else {
            v.iter().sum::<f64>() / v.len() as f64
        }
    };
    let precision = mean(&precisions);
    let recall = mean(&recalls);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassificationMetrics {
        accuracy: correct as f64 / support as f64,
        precision,
        recall,
        f1,
        confusion,
        support,
    }
}

/// Elementwise error metrics between one-hot predictions and labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

/// MSE, MAE, RMSE and R² over the flattened one-hot matrices.
///
/// Each prediction row is first reduced to the one-hot vector of its
/// argmax. R² is 0 when the labels have no variance.
pub fn regression_metrics(predictions: &[ClassProbs], labels: &[ClassProbs]) -> RegressionMetrics {
    let pairs: Vec<(f64, f64)> = predictions
        .iter()
        .zip(labels)
        .flat_map(|(p, y)| {
            let hot = argmax(p);
            (0..NUM_CLASSES).map(move |c| (if c == hot { 1.0 } else { 0.0 }, y[c]))
        })
        .collect();
    if pairs.is_empty() {
        return RegressionMetrics::default();
    }
    let n = pairs.len() as f64;
    let mse = pairs.iter().map(|(p, y)| (p - y).powi(2)).sum::<f64>() / n;
    let mae = pairs.iter().map(|(p, y)| (p - y).abs()).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let ss_tot: f64 = pairs.iter().map(|(_, y)| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = pairs.iter().map(|(p, y)| (y - p).powi(2)).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    RegressionMetrics {
        mse,
        mae,
        rmse: mse.sqrt(),
        r2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::types::Direction;

    fn hot(c: usize) -> ClassProbs {
        Direction::from_class(c).one_hot()
    }

    #[test]
    fn test_all_class_zero_is_perfect() {
        let preds = vec![[0.8, 0.1, 0.1]; 5];
        let labels = vec![hot(0); 5];
        let m = classification_metrics(&preds, &labels);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.precision, 1.0);
        assert_eq!(m.recall, 1.0);
        assert_eq!(m.f1, 1.0);
        assert_eq!(m.confusion[0][0], 5);
    }

    #[test]
    fn test_disjoint_classes_score_zero() {
        let preds = vec![hot(0); 4];
        let labels = vec![hot(2); 4];
        let m = classification_metrics(&preds, &labels);
        assert_eq!(m.accuracy, 0.0);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.recall, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.confusion[2][0], 4);
    }

    #[test]
    fn test_macro_skips_undefined_classes() {
        // Predictions never use class 1; labels never use class 2.
        let preds = vec![hot(0), hot(0), hot(2), hot(2)];
        let labels = vec![hot(0), hot(1), hot(0), hot(1)];
        let m = classification_metrics(&preds, &labels);
        // precision: class0 = 1/2, class2 = 0/2 → mean 0.25 (class 1 skipped)
        assert!((m.precision - 0.25).abs() < 1e-12);
        // recall: class0 = 1/2, class1 = 0/2 → mean 0.25 (class 2 skipped)
        assert!((m.recall - 0.25).abs() < 1e-12);
        assert!((m.f1 - 0.25).abs() < 1e-12);
        assert!((m.accuracy - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_empty_metrics() {
        let m = classification_metrics(&[], &[]);
        assert_eq!(m, ClassificationMetrics::default());
        assert_eq!(accuracy(&[], &[]), 0.0);
        assert_eq!(cross_entropy(&[], &[]), 0.0);
    }

    #[test]
    fn test_cross_entropy_floor() {
        let loss = cross_entropy(&[[0.0, 1.0, 0.0]], &[hot(0)]);
        assert!((loss - (-(1e-7f64).ln())).abs() < 1e-9);
        let perfect = cross_entropy(&[[1.0, 0.0, 0.0]], &[hot(0)]);
        assert_eq!(perfect, 0.0);
        let uniform = cross_entropy(&[[1.0 / 3.0; 3]], &[hot(1)]);
        assert!((uniform - 3f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_accuracy_argmax_ties() {
        // Tie between 0 and 2 resolves to class 0.
        let preds = vec![[0.4, 0.2, 0.4], [0.1, 0.1, 0.8]];
        let labels = vec![hot(0), hot(0)];
        assert_eq!(accuracy(&preds, &labels), 0.5);
    }

    #[test]
    fn test_regression_metrics() {
        let perfect = regression_metrics(&[hot(1), hot(2)], &[hot(1), hot(2)]);
        assert_eq!(perfect.mse, 0.0);
        assert_eq!(perfect.r2, 1.0);

        let wrong = regression_metrics(&[hot(0)], &[hot(1)]);
        // Two of three cells differ by 1.
        assert!((wrong.mse - 2.0 / 3.0).abs() < 1e-12);
        assert!((wrong.mae - 2.0 / 3.0).abs() < 1e-12);
        assert!((wrong.rmse - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
        // mean_y = 1/3, ss_tot = 2/3, ss_res = 2 → r2 = 1 - 3 = -2
        assert!((wrong.r2 + 2.0).abs() < 1e-12);

        assert_eq!(regression_metrics(&[], &[]), RegressionMetrics::default());
    }
}
