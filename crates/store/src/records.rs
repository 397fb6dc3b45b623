//! Persisted records: model configurations, datasets, training runs and
//! per-epoch metrics.
//!
//! Records reference each other by identifier only; a run holds the ids of
//! its configuration and dataset, never the records themselves.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tc_core::types::{Snapshot, SplitTag, Symbol};
use tc_ml::ModelSummary;

/// A storable record with a string identifier.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Human-readable kind, used in not-found errors.
    const KIND: &'static str;

    fn id(&self) -> &str;
}

/// Lifecycle state of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Record exists; the loop has not started.
    Created,
    /// The epoch loop is running.
    InProgress,
    /// Finished normally or by early stopping; terminal state.
    Completed,
    /// The loop raised an error; terminal state.
    Failed,
    /// Cooperative cancellation was observed; terminal state.
    Cancelled,
}

impl RunStatus {
    /// Returns `true` if this status is terminal (no further transitions
    /// other than an explicit resume).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the run may be resumed from this status.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(&self, to: RunStatus) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::InProgress)
                | (Self::Created, Self::Failed)
                | (Self::Created, Self::Cancelled)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
                | (Self::InProgress, Self::Cancelled)
                | (Self::Failed, Self::InProgress)
                | (Self::Cancelled, Self::InProgress)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Loss and classification metrics of one split at one point in training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub loss: f64,
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1: Option<f64>,
}

impl MetricSet {
    /// Loss and accuracy only, as tracked inside the epoch loop.
    pub fn basic(loss: f64, accuracy: f64) -> Self {
        Self {
            loss,
            accuracy,
            ..Self::default()
        }
    }
}

/// A named model configuration with free-form hyperparameter JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfigRecord {
    pub id: String,
    pub name: String,
    /// Raw hyperparameters; parsed tolerantly at run start.
    pub hyperparameters: String,
    pub created_at: DateTime<Utc>,
}

impl ModelConfigRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, hyperparameters: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            hyperparameters: hyperparameters.into(),
            created_at: Utc::now(),
        }
    }
}

impl Entity for ModelConfigRecord {
    const KIND: &'static str = "configuration";

    fn id(&self) -> &str {
        &self.id
    }
}

/// An ordered snapshot sequence for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    pub symbol: Symbol,
    pub snapshots: Vec<Snapshot>,
    pub created_at: DateTime<Utc>,
}

impl DatasetRecord {
    pub fn new(id: impl Into<String>, symbol: Symbol, snapshots: Vec<Snapshot>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            symbol,
            snapshots,
            created_at: Utc::now(),
        }
    }
}

impl Entity for DatasetRecord {
    const KIND: &'static str = "dataset";

    fn id(&self) -> &str {
        &self.id
    }
}

/// One training run and its terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub id: String,
    pub config_id: String,
    pub dataset_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub epochs_completed: usize,
    pub best_epoch: Option<usize>,
    pub best_val_loss: Option<f64>,
    pub test_metrics: Option<MetricSet>,
    pub error_message: Option<String>,
    pub model_summary: Option<ModelSummary>,
    /// Hyperparameters the run actually used, as JSON.
    pub config_snapshot: serde_json::Value,
    pub checkpoint_dir: Option<PathBuf>,
    pub resume_count: u32,
}

impl TrainingRun {
    /// A fresh run in the `Created` state.
    pub fn new(id: impl Into<String>, config_id: impl Into<String>, dataset_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config_id: config_id.into(),
            dataset_id: dataset_id.into(),
            status: RunStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            epochs_completed: 0,
            best_epoch: None,
            best_val_loss: None,
            test_metrics: None,
            error_message: None,
            model_summary: None,
            config_snapshot: serde_json::Value::Null,
            checkpoint_dir: None,
            resume_count: 0,
        }
    }
}

impl Entity for TrainingRun {
    const KIND: &'static str = "run";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Metrics of one split after one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetricsRecord {
    pub id: String,
    pub run_id: String,
    pub epoch: usize,
    pub split: SplitTag,
    pub metrics: MetricSet,
    pub learning_rate: f64,
    pub recorded_at: DateTime<Utc>,
}

impl EpochMetricsRecord {
    pub fn new(run_id: &str, epoch: usize, split: SplitTag, metrics: MetricSet, learning_rate: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            epoch,
            split,
            metrics,
            learning_rate,
            recorded_at: Utc::now(),
        }
    }
}

impl Entity for EpochMetricsRecord {
    const KIND: &'static str = "metrics";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!RunStatus::Created.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(RunStatus::Created.can_transition_to(RunStatus::InProgress));
        assert!(RunStatus::InProgress.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Failed.can_transition_to(RunStatus::InProgress));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::InProgress));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Created.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_resumable() {
        assert!(RunStatus::Failed.is_resumable());
        assert!(RunStatus::Cancelled.is_resumable());
        assert!(!RunStatus::Completed.is_resumable());
        assert!(!RunStatus::InProgress.is_resumable());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&RunStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(RunStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_run_record_roundtrip() {
        let mut run = TrainingRun::new("r1", "c1", "d1");
        run.test_metrics = Some(MetricSet::basic(0.5, 0.75));
        let json = serde_json::to_string(&run).unwrap();
        let back: TrainingRun = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }
}
