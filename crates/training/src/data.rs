//! Model-ready views of an extraction.

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tc_core::config::TrainingConfig;
use tc_core::types::{ClassProbs, Snapshot, SplitTag};
use tc_features::{feature_keys, feature_matrix, Extraction, ExtractorConfig, FeatureExtractor, Sample};

/// Labelled rows of one split, flattened in a fixed key order.
#[derive(Debug, Clone, Default)]
pub struct SplitData {
    pub samples: Vec<Sample>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<ClassProbs>,
}

impl SplitData {
    fn build(samples: Vec<Sample>, keys: &[String]) -> Self {
        let features = feature_matrix(&samples, keys);
        let labels = samples.iter().filter_map(Sample::target).collect();
        Self {
            samples,
            features,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Train/validation/test matrices sharing one feature key order.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub keys: Vec<String>,
    pub extraction: Extraction,
    pub train: SplitData,
    pub validation: SplitData,
    pub test: SplitData,
}

impl PreparedData {
    pub fn input_dim(&self) -> usize {
        self.keys.len()
    }

    /// Every sample of the test split in time order, labelled or not.
    pub fn test_replay(&self) -> Vec<Sample> {
        self.extraction
            .samples
            .iter()
            .filter(|s| s.split == SplitTag::Test)
            .cloned()
            .collect()
    }
}

/// Extract samples and flatten them for the model. `Ok(None)` when the
/// extraction was cancelled.
pub fn prepare_data(
    config: &TrainingConfig,
    snapshots: &[Snapshot],
    cancel: &CancellationToken,
) -> Result<Option<PreparedData>> {
    let extractor = FeatureExtractor::new(ExtractorConfig::from(config));
    let extraction = extractor.extract(snapshots, cancel);
    if extraction.report.cancelled {
        return Ok(None);
    }
    let labelled = extraction.labelled();
    if labelled.is_empty() {
        bail!(
            "no labelled samples from {} snapshots (window {}, horizon {})",
            snapshots.len(),
            config.window_size,
            config.horizon
        );
    }
    let keys = feature_keys(&labelled);
    let report = &extraction.report;
    info!(
        candidates = report.candidates,
        labelled = report.labelled,
        train = report.train,
        validation = report.validation,
        test = report.test,
        features = keys.len(),
        "features extracted"
    );

    let train = SplitData::build(extraction.split(SplitTag::Train), &keys);
    let validation = SplitData::build(extraction.split(SplitTag::Validation), &keys);
    let test = SplitData::build(extraction.split(SplitTag::Test), &keys);
    Ok(Some(PreparedData {
        keys,
        extraction,
        train,
        validation,
        test,
    }))
}

/// Resolve stored hyperparameter JSON on top of `defaults`.
///
/// Keys present in `raw` override the defaults field by field through the
/// tolerant parser; rejected fields and unusable documents keep the value
/// from `defaults`.
pub fn resolve_hyperparameters(defaults: &TrainingConfig, raw: &str) -> TrainingConfig {
    let parsed = TrainingConfig::from_json_str_over(raw, defaults);
    if !parsed.fallbacks.is_empty() {
        warn!(fallbacks = ?parsed.fallbacks, "hyperparameters fell back to defaults");
    }
    parsed.config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tc_core::config::OptimizerKind;
    use tc_core::types::{Symbol, Timestamp};

    fn series(n: usize) -> Vec<Snapshot> {
        (0..n)
            .map(|i| {
                let mid = 100.0 + (i as f64 * 0.3).sin() * 2.0;
                Snapshot::new(Symbol::new("BTCUSDT"), Timestamp::from_secs(i as u64), mid - 0.05, mid + 0.05, 1.0, 2.0)
            })
            .collect()
    }

    #[test]
    fn test_prepare_shapes() {
        let config = TrainingConfig::default();
        let data = prepare_data(&config, &series(200), &CancellationToken::new()).unwrap().unwrap();
        assert!(data.input_dim() > 0);
        assert_eq!(data.train.features.len(), data.train.labels.len());
        assert!(data.train.features.iter().all(|r| r.len() == data.input_dim()));
        assert_eq!(data.train.len() + data.validation.len() + data.test.len(), 185);
        // Unlabelled tail belongs to the test split.
        assert_eq!(data.test_replay().len(), data.test.len() + 5);
    }

    #[test]
    fn test_prepare_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let out = prepare_data(&TrainingConfig::default(), &series(50), &token).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_prepare_too_short() {
        let res = prepare_data(&TrainingConfig::default(), &series(12), &CancellationToken::new());
        assert!(res.is_err());
    }

    #[test]
    fn test_resolve_overrides_defaults() {
        let mut defaults = TrainingConfig::default();
        defaults.epochs = 7;
        let cfg = resolve_hyperparameters(&defaults, r#"{"batch_size": 8, "optimizer": "sgd"}"#);
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.optimizer, OptimizerKind::Sgd);
        assert_eq!(cfg.epochs, 7);

        assert_eq!(resolve_hyperparameters(&defaults, "not json"), defaults);
        assert_eq!(resolve_hyperparameters(&defaults, "[1, 2]"), defaults);
        assert_eq!(resolve_hyperparameters(&defaults, ""), defaults);
    }

    #[test]
    fn test_resolve_mistyped_field_keeps_configured_default() {
        let mut defaults = TrainingConfig::default();
        defaults.epochs = 7;
        defaults.hidden_units = vec![16];
        let cfg = resolve_hyperparameters(&defaults, r#"{"epochs": "seven", "hidden_units": [0]}"#);
        assert_eq!(cfg.epochs, 7);
        assert_eq!(cfg.hidden_units, vec![16]);
        assert_eq!(resolve_hyperparameters(&defaults, "{}").epochs, 7);
    }
}
