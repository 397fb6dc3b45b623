//! Contiguous k-fold cross-validation.
//!
//! Folds are ordering-preserving blocks: the first `n % k` folds hold one
//! extra sample. Each fold trains a fresh model on the concatenation of the
//! other folds and is scored on the held-out block.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tc_core::config::TrainingConfig;
use tc_core::error::{PipelineError, PipelineResult};
use tc_core::types::ClassProbs;
use tc_ml::ModelFactory;

use crate::classification::accuracy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub folds: usize,
    pub fold_accuracies: Vec<f64>,
    pub mean_accuracy: f64,
    /// Sample standard deviation (n − 1) of the fold accuracies.
    pub std_accuracy: f64,
}

/// Contiguous validation ranges covering `0..n` exactly once.
pub fn fold_ranges(n: usize, k: usize) -> PipelineResult<Vec<Range<usize>>> {
    if k < 2 {
        return Err(PipelineError::InvalidArgument(format!(
            "cross-validation needs at least 2 folds, got {k}"
        )));
    }
    if n < k {
        return Err(PipelineError::InvalidArgument(format!(
            "cannot split {n} samples into {k} folds"
        )));
    }
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    Ok((0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect())
}

fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Train and score one fresh model per fold.
///
/// `epochs` full passes are run per fold with the configured batch size
/// and learning rate.
pub fn cross_validate(
    features: &[Vec<f64>],
    labels: &[ClassProbs],
    k: usize,
    epochs: usize,
    config: &TrainingConfig,
    factory: &dyn ModelFactory,
) -> PipelineResult<CrossValidationResult> {
    if features.len() != labels.len() {
        return Err(PipelineError::InvalidArgument(format!(
            "{} feature rows but {} labels",
            features.len(),
            labels.len()
        )));
    }
    let ranges = fold_ranges(features.len(), k)?;
    let input_dim = features.first().map_or(0, Vec::len);

    let mut fold_accuracies = Vec::with_capacity(k);
    for (fold, range) in ranges.iter().enumerate() {
        let train_x: Vec<Vec<f64>> = features[..range.start]
            .iter()
            .chain(&features[range.end..])
            .cloned()
            .collect();
        let train_y: Vec<ClassProbs> = labels[..range.start]
            .iter()
            .chain(&labels[range.end..])
            .copied()
            .collect();

        let mut model = factory.build(input_dim, config)?;
        model.calibrate(&train_x)?;
        for _ in 0..epochs {
            model.fit_epoch(&train_x, &train_y, config.batch_size, config.learning_rate)?;
        }
        let preds = model.predict(&features[range.clone()])?;
        let acc = accuracy(&preds, &labels[range.clone()]);
        debug!(fold, start = range.start, end = range.end, accuracy = acc, "fold scored");
        fold_accuracies.push(acc);
    }

    let (mean_accuracy, std_accuracy) = mean_and_sample_std(&fold_accuracies);
    info!(folds = k, mean_accuracy, std_accuracy, "cross-validation finished");
    Ok(CrossValidationResult {
        folds: k,
        fold_accuracies,
        mean_accuracy,
        std_accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use anyhow::Result;
    use tc_core::types::Direction;
    use tc_ml::{ModelSummary, TrainableModel};

    /// Predicts the class of the first feature's sign; never learns.
    struct SignModel;

    impl TrainableModel for SignModel {
        fn predict(&self, batch: &[Vec<f64>]) -> Result<Vec<ClassProbs>> {
            Ok(batch
                .iter()
                .map(|row| {
                    let d = if row[0] > 0.0 { Direction::Up } else { Direction::Down };
                    d.one_hot()
                })
                .collect())
        }
        fn fit_batch(&mut self, _: &[Vec<f64>], _: &[ClassProbs], _: f64) -> Result<()> {
            Ok(())
        }
        fn save(&self, _: &Path) -> Result<()> {
            Ok(())
        }
        fn load(&mut self, _: &Path) -> Result<()> {
            Ok(())
        }
        fn summary(&self) -> ModelSummary {
            ModelSummary {
                name: "sign".into(),
                input_dim: 1,
                layers: vec![3],
                parameters: 0,
            }
        }
    }

    struct SignFactory;

    impl ModelFactory for SignFactory {
        fn build(&self, _: usize, _: &TrainingConfig) -> Result<Box<dyn TrainableModel>> {
            Ok(Box::new(SignModel))
        }
    }

    #[test]
    fn test_fold_ranges_cover_exactly_once() {
        let ranges = fold_ranges(100, 5).unwrap();
        assert_eq!(ranges.len(), 5);
        assert!(ranges.iter().all(|r| r.len() == 20));
        let mut covered = vec![0u8; 100];
        for r in &ranges {
            for i in r.clone() {
                covered[i] += 1;
            }
        }
        assert!(covered.iter().all(|c| *c == 1));
        assert!(ranges.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn test_fold_ranges_uneven() {
        let ranges = fold_ranges(11, 3).unwrap();
        assert_eq!(ranges, vec![0..4, 4..8, 8..11]);
    }

    #[test]
    fn test_fold_ranges_invalid() {
        assert!(matches!(fold_ranges(10, 1), Err(PipelineError::InvalidArgument(_))));
        assert!(matches!(fold_ranges(3, 4), Err(PipelineError::InvalidArgument(_))));
    }

    #[test]
    fn test_cross_validate_stats() {
        // Fold 0 all correct, folds 1..3 half correct.
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let up = if i < 10 { true } else { i % 2 == 0 };
            features.push(vec![1.0]);
            labels.push(if up { Direction::Up } else { Direction::Down }.one_hot());
        }
        let res = cross_validate(&features, &labels, 4, 1, &TrainingConfig::default(), &SignFactory).unwrap();
        assert_eq!(res.fold_accuracies, vec![1.0, 0.5, 0.5, 0.5]);
        assert!((res.mean_accuracy - 0.625).abs() < 1e-12);
        // Sample std of [1, .5, .5, .5] = sqrt(0.1875 / 3) = 0.25
        assert!((res.std_accuracy - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_cross_validate_length_mismatch() {
        let res = cross_validate(&[vec![1.0]], &[], 2, 1, &TrainingConfig::default(), &SignFactory);
        assert!(matches!(res, Err(PipelineError::InvalidArgument(_))));
    }
}
