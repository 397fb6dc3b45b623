//! # tc-store
//!
//! Storage collaborators of the training pipeline:
//!
//! - [`records`]: configuration, dataset, run and epoch-metric records
//! - [`repository`]: async repository and unit-of-work traits
//! - [`memory`]: in-memory implementation used by the CLI and tests
//! - [`model_store`]: blob storage for checkpoints and exports

pub mod memory;
pub mod model_store;
pub mod records;
pub mod repository;

pub use memory::{MemoryRepository, MemoryStore};
pub use model_store::{FsModelStore, ModelStore};
pub use records::{
    DatasetRecord, Entity, EpochMetricsRecord, MetricSet, ModelConfigRecord, RunStatus, TrainingRun,
};
pub use repository::{PendingWrite, Repository, UnitOfWork};
