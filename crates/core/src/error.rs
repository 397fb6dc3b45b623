//! Caller-visible error taxonomy.
//!
//! Internals propagate `anyhow::Error` with context; the service boundary
//! maps outcomes onto [`PipelineError`] so callers can match on the kind.
//! Training failures and cancellations observed *inside* a run are recorded
//! on the run record instead of being returned.

/// Errors surfaced to callers of the training and evaluation entry points.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A referenced configuration, dataset, run, or checkpoint does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// Process configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// An argument is outside the operation's domain (e.g. `k < 2`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The run is in a state that does not permit the operation.
    #[error("run {run_id} is {status}, operation not permitted")]
    InvalidState { run_id: String, status: String },
    /// Cooperative cancellation was observed.
    #[error("cancelled")]
    Cancelled,
    /// The epoch loop failed.
    #[error("training failed: {0}")]
    TrainingFailure(String),
    /// Any other failure (I/O, model backend, serialization).
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Returns `true` for [`PipelineError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for service-level operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
