//! # tc-training
//!
//! The training loop and its control components.
//!
//! - [`optimizer`]: learning-rate controllers with epoch decay schedules
//! - [`early_stopping`]: patience-based stop signal
//! - [`checkpoint`]: numbered and best-so-far checkpoints per run
//! - [`registry`]: cancellation handles of in-flight runs
//! - [`data`]: extraction into model-ready matrices, hyperparameter resolution
//! - [`orchestrator`]: the run state machine and epoch/batch loop

pub mod checkpoint;
pub mod data;
pub mod early_stopping;
pub mod optimizer;
pub mod orchestrator;
pub mod registry;

pub use checkpoint::{CheckpointInfo, CheckpointManager, CheckpointMeta};
pub use data::{prepare_data, resolve_hyperparameters, PreparedData, SplitData};
pub use early_stopping::{EarlyStopping, MonitorState, Polarity};
pub use optimizer::{build_optimizer, Optimizer};
pub use orchestrator::{Orchestrator, OrchestratorSettings, TrainedModel};
pub use registry::{RunLease, RunRegistry};
