//! Capability interface of a trainable direction model.
//!
//! The training loop only ever talks to a model through [`TrainableModel`];
//! any backend (the candle classifier, or a deterministic stub in tests)
//! satisfies the orchestration contract.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use tc_core::config::TrainingConfig;
use tc_core::types::ClassProbs;

/// Static description of a built model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub input_dim: usize,
    /// Layer widths from the first hidden layer to the output layer.
    pub layers: Vec<usize>,
    pub parameters: usize,
}

/// A model that maps feature rows to class probabilities and can be
/// trained, persisted and restored.
pub trait TrainableModel: Send {
    /// Class probabilities for each row. Each output row sums to 1.
    fn predict(&self, batch: &[Vec<f64>]) -> Result<Vec<ClassProbs>>;

    /// Fit input normalization on the training rows. Default: no-op.
    fn calibrate(&mut self, _features: &[Vec<f64>]) -> Result<()> {
        Ok(())
    }

    /// One parameter update on a batch of rows and one-hot targets.
    fn fit_batch(
        &mut self,
        features: &[Vec<f64>],
        labels: &[ClassProbs],
        learning_rate: f64,
    ) -> Result<()>;

    /// One pass over the data in order, `batch_size` rows at a time.
    fn fit_epoch(
        &mut self,
        features: &[Vec<f64>],
        labels: &[ClassProbs],
        batch_size: usize,
        learning_rate: f64,
    ) -> Result<()> {
        let bs = batch_size.max(1);
        for (x, y) in features.chunks(bs).zip(labels.chunks(bs)) {
            self.fit_batch(x, y, learning_rate)?;
        }
        Ok(())
    }

    /// Persist model state at `path` (plus any sidecars next to it).
    fn save(&self, path: &Path) -> Result<()>;

    /// Restore model state previously written by [`save`](Self::save).
    fn load(&mut self, path: &Path) -> Result<()>;

    fn summary(&self) -> ModelSummary;
}

/// Builds fresh models for a run or a cross-validation fold.
pub trait ModelFactory: Send + Sync {
    fn build(&self, input_dim: usize, config: &TrainingConfig) -> Result<Box<dyn TrainableModel>>;
}

/// Index of the largest probability; the first index wins ties.
pub fn argmax(probs: &ClassProbs) -> usize {
    let mut best = 0;
    for (i, p) in probs.iter().enumerate().skip(1) {
        if *p > probs[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.3]), 1);
        assert_eq!(argmax(&[0.4, 0.2, 0.4]), 0);
        assert_eq!(argmax(&[1.0 / 3.0; 3]), 0);
        assert_eq!(argmax(&[0.0, 0.0, 1.0]), 2);
    }
}
