//! Layered configuration for the TickCast pipeline.
//!
//! Two kinds of configuration live here:
//!
//! - [`AppConfig`]: process-level settings, loaded in layers with increasing
//!   priority: compiled-in defaults, an optional TOML file, then environment
//!   overrides (prefix `TC_`, nested with `__`).
//! - [`TrainingConfig`]: the typed hyperparameter set of one model
//!   configuration. Stored configurations carry their hyperparameters as
//!   free-form JSON; [`TrainingConfig::from_json_lenient`] turns that JSON
//!   into the typed struct field by field, falling back to the documented
//!   default for anything missing or malformed.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Default value functions ────────────────────────────────────────────

/// Default window length: 10 prior snapshots.
fn default_window_size() -> usize {
    10
}

/// Default label horizon: 5 steps ahead.
fn default_horizon() -> usize {
    5
}

/// Default relative move threshold: 0.1 %.
fn default_threshold() -> f64 {
    0.001
}

/// Default mini-batch size: 32 samples.
fn default_batch_size() -> usize {
    32
}

/// Default epoch budget: 100.
fn default_epochs() -> usize {
    100
}

/// Default initial learning rate: 1e-3.
fn default_learning_rate() -> f64 {
    1e-3
}

/// Default early-stopping patience: 10 epochs.
fn default_patience() -> usize {
    10
}

/// Default minimum improvement: 1e-4.
fn default_min_delta() -> f64 {
    1e-4
}

/// Default monitored metric: validation loss.
fn default_monitor() -> String {
    "val_loss".to_string()
}

/// Default hidden layer widths: 64 → 32.
fn default_hidden_units() -> Vec<usize> {
    vec![64, 32]
}

/// Default shuffle / init seed: 42.
fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

/// Default checkpoint root directory.
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

/// Default export directory.
fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

/// Default per-sample simulated return magnitude: 1 %.
fn default_base_return() -> f64 {
    0.01
}

/// Default annual risk-free rate: 2 %.
fn default_risk_free_rate() -> f64 {
    0.02
}

/// Default trading periods per year used to de-annualize the risk-free rate.
fn default_periods_per_year() -> f64 {
    252.0
}

/// Default cross-validation folds: 5.
fn default_cv_folds() -> usize {
    5
}

/// Default epochs per cross-validation fold: 10.
fn default_cv_epochs() -> usize {
    10
}

/// Default backtest starting capital: 10 000.
fn default_initial_capital() -> f64 {
    10_000.0
}

/// Default backtest warm-up: 20 samples.
fn default_lookback() -> usize {
    20
}

/// Default minimum prediction confidence to act: 0.6.
fn default_confidence_threshold() -> f64 {
    0.6
}

/// Default materiality threshold for a position change: half a unit.
fn default_position_change_threshold() -> f64 {
    0.5
}

/// Default unit position size: 1.0.
fn default_position_size() -> f64 {
    1.0
}

// ── Hyperparameters ────────────────────────────────────────────────────

/// Learning-rate controller variant, resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Constant-momentum SGD.
    Sgd,
    /// Adaptive per-parameter (Adam).
    #[default]
    Adam,
    /// RMS-based (RMSprop).
    Rmsprop,
    /// Plain step decay.
    StepDecay,
}

impl OptimizerKind {
    /// Parse a user-facing optimizer name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sgd" | "momentum" => Some(Self::Sgd),
            "adam" => Some(Self::Adam),
            "rmsprop" | "rms_prop" => Some(Self::Rmsprop),
            "step_decay" | "stepdecay" | "step" => Some(Self::StepDecay),
            _ => None,
        }
    }
}

/// Enabled feature-type groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureGroups {
    /// Direct snapshot fields and calendar fields.
    #[serde(default = "default_true")]
    pub basic: bool,
    /// Moving averages, RSI, volatility, price change.
    #[serde(default = "default_true")]
    pub technical: bool,
    /// Microprice, order-flow imbalance, effective spread, market impact.
    #[serde(default = "default_true")]
    pub advanced: bool,
}

impl Default for FeatureGroups {
    fn default() -> Self {
        Self {
            basic: true,
            technical: true,
            advanced: true,
        }
    }
}

impl FeatureGroups {
    /// Build from a list of group names. Returns `None` on an unknown name.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let mut groups = Self {
            basic: false,
            technical: false,
            advanced: false,
        };
        for name in names {
            match name.trim().to_ascii_lowercase().as_str() {
                "basic" => groups.basic = true,
                "technical" => groups.technical = true,
                "advanced" => groups.advanced = true,
                _ => return None,
            }
        }
        Some(groups)
    }

    /// Returns `true` if no group is enabled.
    pub fn is_empty(&self) -> bool {
        !(self.basic || self.technical || self.advanced)
    }
}

/// Typed hyperparameters of one model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of prior snapshots in each sample's window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Steps ahead used for the direction label.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    /// Relative mid-price move separating up/down from flat.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Enabled feature groups.
    #[serde(default)]
    pub feature_groups: FeatureGroups,
    /// Training mini-batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Initial learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Learning-rate controller variant.
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Apply the optimizer's epoch-based decay.
    #[serde(default = "default_true")]
    pub lr_schedule: bool,
    /// Early-stopping patience in epochs.
    #[serde(default = "default_patience")]
    pub early_stopping_patience: usize,
    /// Minimum improvement that counts as progress.
    #[serde(default = "default_min_delta")]
    pub min_delta: f64,
    /// Metric watched by early stopping (`val_loss`, `val_accuracy`, ...).
    #[serde(default = "default_monitor")]
    pub monitor: String,
    /// Persist numbered checkpoints only on improvement.
    #[serde(default = "default_true")]
    pub save_best_only: bool,
    /// Hidden layer widths of the classifier.
    #[serde(default = "default_hidden_units")]
    pub hidden_units: Vec<usize>,
    /// Seed for weight initialization and shuffling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            horizon: default_horizon(),
            threshold: default_threshold(),
            feature_groups: FeatureGroups::default(),
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            optimizer: OptimizerKind::default(),
            lr_schedule: true,
            early_stopping_patience: default_patience(),
            min_delta: default_min_delta(),
            monitor: default_monitor(),
            save_best_only: true,
            hidden_units: default_hidden_units(),
            seed: default_seed(),
        }
    }
}

/// Result of a tolerant hyperparameter parse.
#[derive(Debug, Clone)]
pub struct LenientConfig {
    /// The parsed configuration, defaults filled in.
    pub config: TrainingConfig,
    /// Fields that were present but unusable and fell back to defaults.
    pub fallbacks: Vec<String>,
}

impl TrainingConfig {
    /// Parse hyperparameters from raw JSON text on top of `base`, never
    /// failing.
    ///
    /// Empty or unparseable text yields `base` unchanged (reported as the
    /// `*` fallback).
    pub fn from_json_str_over(raw: &str, base: &TrainingConfig) -> LenientConfig {
        if raw.trim().is_empty() {
            tracing::warn!("empty hyperparameter JSON, using defaults");
            return LenientConfig {
                config: base.clone(),
                fallbacks: vec!["*".to_string()],
            };
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_json_over(&value, base),
            Err(e) => {
                tracing::warn!(error = %e, "malformed hyperparameter JSON, using defaults");
                LenientConfig {
                    config: base.clone(),
                    fallbacks: vec!["*".to_string()],
                }
            }
        }
    }

    /// Parse hyperparameters field by field from a JSON object, with the
    /// documented defaults as the base.
    pub fn from_json_lenient(value: &Value) -> LenientConfig {
        Self::from_json_over(value, &Self::default())
    }

    /// Parse hyperparameters field by field from a JSON object.
    ///
    /// Missing fields take their value from `base` silently. Present but
    /// mistyped or out-of-range fields also take the `base` value, are
    /// logged at `warn`, and are listed in [`LenientConfig::fallbacks`].
    pub fn from_json_over(value: &Value, base: &TrainingConfig) -> LenientConfig {
        let Some(map) = value.as_object() else {
            tracing::warn!(value = %value, "hyperparameters are not a JSON object, using defaults");
            return LenientConfig {
                config: base.clone(),
                fallbacks: vec!["*".to_string()],
            };
        };

        let d = base.clone();
        let mut r = FieldReader::new(map);
        let config = Self {
            window_size: r.usize("window_size", d.window_size, 1),
            horizon: r.usize("horizon", d.horizon, 1),
            threshold: r.f64("threshold", d.threshold, |v| v >= 0.0),
            feature_groups: r.feature_groups("feature_types", d.feature_groups),
            batch_size: r.usize("batch_size", d.batch_size, 1),
            epochs: r.usize("epochs", d.epochs, 1),
            learning_rate: r.f64("learning_rate", d.learning_rate, |v| v > 0.0),
            optimizer: r.optimizer("optimizer", d.optimizer),
            lr_schedule: r.bool("lr_schedule", d.lr_schedule),
            early_stopping_patience: r.usize("early_stopping_patience", d.early_stopping_patience, 1),
            min_delta: r.f64("min_delta", d.min_delta, |v| v >= 0.0),
            monitor: r.string("monitor", d.monitor),
            save_best_only: r.bool("save_best_only", d.save_best_only),
            hidden_units: r.hidden_units("hidden_units", d.hidden_units),
            seed: r.usize("seed", d.seed as usize, 0) as u64,
        };

        LenientConfig {
            config,
            fallbacks: r.fallbacks,
        }
    }

    /// Serialize into the JSON form accepted by [`from_json_lenient`](Self::from_json_lenient).
    pub fn to_json(&self) -> Value {
        let mut groups = Vec::new();
        if self.feature_groups.basic {
            groups.push("basic");
        }
        if self.feature_groups.technical {
            groups.push("technical");
        }
        if self.feature_groups.advanced {
            groups.push("advanced");
        }
        serde_json::json!({
            "window_size": self.window_size,
            "horizon": self.horizon,
            "threshold": self.threshold,
            "feature_types": groups,
            "batch_size": self.batch_size,
            "epochs": self.epochs,
            "learning_rate": self.learning_rate,
            "optimizer": self.optimizer,
            "lr_schedule": self.lr_schedule,
            "early_stopping_patience": self.early_stopping_patience,
            "min_delta": self.min_delta,
            "monitor": self.monitor,
            "save_best_only": self.save_best_only,
            "hidden_units": self.hidden_units,
            "seed": self.seed,
        })
    }

    /// Validate invariants the tolerant parser cannot repair on its own.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.horizon == 0 {
            bail!("window_size and horizon must be at least 1");
        }
        if self.batch_size == 0 || self.epochs == 0 {
            bail!("batch_size and epochs must be at least 1");
        }
        if !(self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if self.early_stopping_patience == 0 {
            bail!("early_stopping_patience must be at least 1");
        }
        if self.threshold < 0.0 || self.min_delta < 0.0 {
            bail!("threshold and min_delta must be non-negative");
        }
        if self.feature_groups.is_empty() {
            bail!("at least one feature group must be enabled");
        }
        Ok(())
    }
}

/// Per-field tolerant reader over a JSON object.
struct FieldReader<'a> {
    map: &'a Map<String, Value>,
    fallbacks: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            fallbacks: Vec::new(),
        }
    }

    fn reject(&mut self, key: &str, value: &Value) {
        tracing::warn!(field = key, value = %value, "invalid hyperparameter, using default");
        self.fallbacks.push(key.to_string());
    }

    fn usize(&mut self, key: &str, default: usize, min: usize) -> usize {
        let Some(v) = self.map.get(key) else {
            return default;
        };
        let parsed = match v {
            Value::Number(n) => n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                    .map(|f| f as u64)
            }),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        match parsed {
            Some(n) if n as usize >= min => n as usize,
            _ => {
                self.reject(key, v);
                default
            }
        }
    }

    fn f64(&mut self, key: &str, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
        let Some(v) = self.map.get(key) else {
            return default;
        };
        let parsed = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(x) if x.is_finite() && valid(x) => x,
            _ => {
                self.reject(key, v);
                default
            }
        }
    }

    fn bool(&mut self, key: &str, default: bool) -> bool {
        let Some(v) = self.map.get(key) else {
            return default;
        };
        let parsed = match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            self.reject(key, v);
            default
        })
    }

    fn string(&mut self, key: &str, default: String) -> String {
        match self.map.get(key) {
            None => default,
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(v) => {
                self.reject(key, v);
                default
            }
        }
    }

    fn optimizer(&mut self, key: &str, default: OptimizerKind) -> OptimizerKind {
        let Some(v) = self.map.get(key) else {
            return default;
        };
        match v.as_str().and_then(OptimizerKind::parse) {
            Some(kind) => kind,
            None => {
                self.reject(key, v);
                default
            }
        }
    }

    fn feature_groups(&mut self, key: &str, default: FeatureGroups) -> FeatureGroups {
        let Some(v) = self.map.get(key) else {
            return default;
        };
        let parsed = match v {
            Value::Array(items) => {
                let names: Option<Vec<&str>> = items.iter().map(|i| i.as_str()).collect();
                names.and_then(FeatureGroups::from_names)
            }
            Value::Object(_) => serde_json::from_value::<FeatureGroups>(v.clone()).ok(),
            _ => None,
        };
        match parsed {
            Some(groups) if !groups.is_empty() => groups,
            _ => {
                self.reject(key, v);
                default
            }
        }
    }

    fn hidden_units(&mut self, key: &str, default: Vec<usize>) -> Vec<usize> {
        let Some(v) = self.map.get(key) else {
            return default;
        };
        let parsed: Option<Vec<usize>> = v.as_array().and_then(|items| {
            items
                .iter()
                .map(|i| i.as_u64().filter(|n| *n > 0).map(|n| n as usize))
                .collect()
        });
        match parsed {
            Some(units) if !units.is_empty() => units,
            _ => {
                self.reject(key, v);
                default
            }
        }
    }
}

// ── Process configuration ──────────────────────────────────────────────

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Default hyperparameters used when a stored configuration omits them.
    #[serde(default)]
    pub training: TrainingConfig,
    /// Checkpoint storage.
    pub checkpoint: CheckpointSettings,
    /// Evaluation and trading-metric parameters.
    pub evaluation: EvaluationSettings,
    /// Backtest simulation parameters.
    pub backtest: BacktestSettings,
    /// Export locations.
    pub storage: StorageSettings,
    /// Log output format.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Checkpoint storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSettings {
    /// Root directory; each run writes to `<dir>/<run_id>/`.
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,
}

/// Evaluation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationSettings {
    /// Magnitude of the simulated per-sample return.
    #[serde(default = "default_base_return")]
    pub base_return: f64,
    /// Annual risk-free rate used by the Sharpe ratio.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Periods per year used to de-annualize the risk-free rate.
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
    /// Number of cross-validation folds.
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Epochs trained per cross-validation fold.
    #[serde(default = "default_cv_epochs")]
    pub cv_epochs: usize,
}

/// Backtest configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestSettings {
    /// Starting portfolio cash.
    #[serde(default = "default_initial_capital")]
    pub initial_capital: f64,
    /// Samples skipped before the first decision.
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Minimum top-class probability required to act.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minimum absolute position change (in units) worth trading.
    #[serde(default = "default_position_change_threshold")]
    pub position_change_threshold: f64,
    /// Units held per directional call.
    #[serde(default = "default_position_size")]
    pub position_size: f64,
}

/// Export configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Directory receiving exported artifacts.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSettings {
    /// Emit JSON logs instead of pretty output.
    #[serde(default)]
    pub json: bool,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            base_return: default_base_return(),
            risk_free_rate: default_risk_free_rate(),
            periods_per_year: default_periods_per_year(),
            cv_folds: default_cv_folds(),
            cv_epochs: default_cv_epochs(),
        }
    }
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            initial_capital: default_initial_capital(),
            lookback: default_lookback(),
            confidence_threshold: default_confidence_threshold(),
            position_change_threshold: default_position_change_threshold(),
            position_size: default_position_size(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            training: TrainingConfig::default(),
            checkpoint: CheckpointSettings {
                dir: default_checkpoint_dir(),
            },
            evaluation: EvaluationSettings::default(),
            backtest: BacktestSettings::default(),
            storage: StorageSettings {
                export_dir: default_export_dir(),
            },
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration using layered sources.
    ///
    /// 1. Compiled-in defaults.
    /// 2. TOML file at `config_path` (if `Some`).
    /// 3. Environment variable overrides with prefix `TC_` and `__` as
    ///    the nesting separator (e.g., `TC_TRAINING__EPOCHS=50`).
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder()
            // ── Layer 1: compiled-in defaults ───────────────────────
            .set_default("checkpoint.dir", "checkpoints")?
            .set_default("evaluation.base_return", default_base_return())?
            .set_default("evaluation.risk_free_rate", default_risk_free_rate())?
            .set_default("evaluation.periods_per_year", default_periods_per_year())?
            .set_default("evaluation.cv_folds", default_cv_folds() as i64)?
            .set_default("evaluation.cv_epochs", default_cv_epochs() as i64)?
            .set_default("backtest.initial_capital", default_initial_capital())?
            .set_default("backtest.lookback", default_lookback() as i64)?
            .set_default("backtest.confidence_threshold", default_confidence_threshold())?
            .set_default(
                "backtest.position_change_threshold",
                default_position_change_threshold(),
            )?
            .set_default("backtest.position_size", default_position_size())?
            .set_default("storage.export_dir", "exports")?
            .set_default("logging.json", false)?;

        // ── Layer 2: TOML file ─────────────────────────────────────
        if let Some(path) = config_path {
            let path_str = path
                .to_str()
                .context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        // ── Layer 3: env var overrides (TC_ prefix) ───────────────
        // The prefix separator is set explicitly: with a `__` nesting
        // separator the crate would otherwise expect `TC__`.
        builder = builder.add_source(
            Environment::with_prefix("TC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: AppConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        self.training
            .validate()
            .context("invalid [training] defaults")?;
        if self.evaluation.cv_folds < 2 {
            bail!("evaluation.cv_folds must be at least 2, got {}", self.evaluation.cv_folds);
        }
        if self.evaluation.cv_epochs == 0 {
            bail!("evaluation.cv_epochs must be at least 1");
        }
        if !(self.backtest.initial_capital > 0.0) {
            bail!("backtest.initial_capital must be positive");
        }
        if !(0.0..=1.0).contains(&self.backtest.confidence_threshold) {
            bail!("backtest.confidence_threshold must lie in [0, 1]");
        }
        if !(self.backtest.position_size > 0.0) {
            bail!("backtest.position_size must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    /// Serializes tests that manipulate environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn clear_env() {
        std::env::remove_var("TC_TRAINING__EPOCHS");
        std::env::remove_var("TC_BACKTEST__LOOKBACK");
        std::env::remove_var("TC_EVALUATION__CV_FOLDS");
    }

    fn write_temp_toml(content: &str) -> (tempfile::NamedTempFile, PathBuf) {
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        write!(f, "{}", content).expect("write temp file");
        let path = f.path().to_path_buf();
        (f, path)
    }

    #[test]
    fn test_load_defaults_only() {
        let _lock = lock_env();
        clear_env();

        let cfg = AppConfig::load(None).expect("load defaults");
        assert_eq!(cfg.training, TrainingConfig::default());
        assert_eq!(cfg.checkpoint.dir, PathBuf::from("checkpoints"));
        assert_eq!(cfg.evaluation.cv_folds, 5);
        assert_eq!(cfg.backtest.lookback, 20);
        assert_eq!(cfg.backtest.position_change_threshold, 0.5);
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_load_from_toml() {
        let _lock = lock_env();
        clear_env();

        let toml_content = r#"
[training]
window_size = 20
optimizer = "rmsprop"
hidden_units = [16]

[training.feature_groups]
advanced = false

[checkpoint]
dir = "/tmp/tc-ckpt"

[backtest]
initial_capital = 500.0
confidence_threshold = 0.4
"#;
        let (_f, path) = write_temp_toml(toml_content);
        let cfg = AppConfig::load(Some(path)).expect("load from toml");

        assert_eq!(cfg.training.window_size, 20);
        assert_eq!(cfg.training.optimizer, OptimizerKind::Rmsprop);
        assert_eq!(cfg.training.hidden_units, vec![16]);
        assert!(cfg.training.feature_groups.basic);
        assert!(!cfg.training.feature_groups.advanced);
        assert_eq!(cfg.training.horizon, 5);
        assert_eq!(cfg.checkpoint.dir, PathBuf::from("/tmp/tc-ckpt"));
        assert_eq!(cfg.backtest.initial_capital, 500.0);
        assert_eq!(cfg.backtest.confidence_threshold, 0.4);
    }

    #[test]
    fn test_env_var_overrides() {
        let _lock = lock_env();
        clear_env();
        std::env::set_var("TC_TRAINING__EPOCHS", "7");
        std::env::set_var("TC_BACKTEST__LOOKBACK", "3");

        let cfg = AppConfig::load(None).expect("load with env override");
        assert_eq!(cfg.training.epochs, 7);
        assert_eq!(cfg.backtest.lookback, 3);

        clear_env();
    }

    #[test]
    fn test_invalid_cv_folds_rejected() {
        let _lock = lock_env();
        clear_env();
        std::env::set_var("TC_EVALUATION__CV_FOLDS", "1");

        let result = AppConfig::load(None);
        assert!(result.is_err());
        let err_msg = format!("{:#}", result.unwrap_err());
        assert!(err_msg.contains("cv_folds"));

        clear_env();
    }

    #[test]
    fn test_lenient_parse_full_object() {
        let json = serde_json::json!({
            "window_size": 15,
            "horizon": 3,
            "threshold": 0.002,
            "feature_types": ["basic", "advanced"],
            "batch_size": 64,
            "epochs": 20,
            "learning_rate": 0.01,
            "optimizer": "SGD",
            "lr_schedule": false,
            "early_stopping_patience": 4,
            "min_delta": 0.0,
            "monitor": "val_accuracy",
            "save_best_only": false,
            "hidden_units": [8, 4],
            "seed": 7
        });
        let parsed = TrainingConfig::from_json_lenient(&json);
        assert!(parsed.fallbacks.is_empty(), "{:?}", parsed.fallbacks);
        let cfg = parsed.config;
        assert_eq!(cfg.window_size, 15);
        assert_eq!(cfg.optimizer, OptimizerKind::Sgd);
        assert!(!cfg.feature_groups.technical);
        assert!(cfg.feature_groups.advanced);
        assert_eq!(cfg.monitor, "val_accuracy");
        assert_eq!(cfg.hidden_units, vec![8, 4]);
        assert_eq!(cfg.seed, 7);
    }

    #[test]
    fn test_lenient_parse_falls_back_per_field() {
        let json = serde_json::json!({
            "window_size": "abc",
            "horizon": 0,
            "learning_rate": -1.0,
            "optimizer": "lbfgs",
            "batch_size": "16",
            "epochs": 12.0,
            "feature_types": ["basic", "quantum"]
        });
        let parsed = TrainingConfig::from_json_lenient(&json);
        let d = TrainingConfig::default();
        assert_eq!(parsed.config.window_size, d.window_size);
        assert_eq!(parsed.config.horizon, d.horizon);
        assert_eq!(parsed.config.learning_rate, d.learning_rate);
        assert_eq!(parsed.config.optimizer, OptimizerKind::Adam);
        assert_eq!(parsed.config.feature_groups, FeatureGroups::default());
        // Numeric strings and integral floats are accepted.
        assert_eq!(parsed.config.batch_size, 16);
        assert_eq!(parsed.config.epochs, 12);
        for key in ["window_size", "horizon", "learning_rate", "optimizer", "feature_types"] {
            assert!(parsed.fallbacks.iter().any(|f| f == key), "missing {key}");
        }
        assert_eq!(parsed.fallbacks.len(), 5);
    }

    #[test]
    fn test_lenient_parse_malformed_text() {
        let parsed = TrainingConfig::from_json_str_over("{not json", &TrainingConfig::default());
        assert_eq!(parsed.config, TrainingConfig::default());
        assert_eq!(parsed.fallbacks, vec!["*".to_string()]);

        let parsed = TrainingConfig::from_json_str_over("[1, 2]", &TrainingConfig::default());
        assert_eq!(parsed.config, TrainingConfig::default());
    }

    #[test]
    fn test_rejected_field_keeps_base_value() {
        let mut base = TrainingConfig::default();
        base.epochs = 7;
        base.learning_rate = 0.05;
        let parsed = TrainingConfig::from_json_str_over(
            r#"{"epochs": "seven", "learning_rate": -1, "batch_size": 8}"#,
            &base,
        );
        assert_eq!(parsed.config.epochs, 7);
        assert_eq!(parsed.config.learning_rate, 0.05);
        assert_eq!(parsed.config.batch_size, 8);
        assert_eq!(parsed.fallbacks, vec!["epochs".to_string(), "learning_rate".to_string()]);

        let parsed = TrainingConfig::from_json_str_over("", &base);
        assert_eq!(parsed.config, base);
    }

    #[test]
    fn test_to_json_roundtrips_through_lenient_parse() {
        let mut cfg = TrainingConfig::default();
        cfg.optimizer = OptimizerKind::StepDecay;
        cfg.feature_groups.technical = false;
        cfg.hidden_units = vec![5];
        let parsed = TrainingConfig::from_json_lenient(&cfg.to_json());
        assert!(parsed.fallbacks.is_empty());
        assert_eq!(parsed.config, cfg);
    }

    #[test]
    fn test_optimizer_kind_parse() {
        assert_eq!(OptimizerKind::parse("Adam"), Some(OptimizerKind::Adam));
        assert_eq!(OptimizerKind::parse("rmsprop"), Some(OptimizerKind::Rmsprop));
        assert_eq!(OptimizerKind::parse("step_decay"), Some(OptimizerKind::StepDecay));
        assert_eq!(OptimizerKind::parse("momentum"), Some(OptimizerKind::Sgd));
        assert_eq!(OptimizerKind::parse("nadam"), None);
    }
}
