//! Repository and unit-of-work collaborator traits.
//!
//! The training core consumes storage only through these traits. Writes
//! that must land together (a run's terminal record plus its final
//! metrics) go through [`UnitOfWork::commit`], which applies them
//! atomically.

use anyhow::Result;
use async_trait::async_trait;

use tc_core::types::{Snapshot, Symbol, Timestamp};

use crate::records::{DatasetRecord, EpochMetricsRecord, Entity, ModelConfigRecord, TrainingRun};

/// Predicate used by [`Repository::find`].
pub type Predicate<'a, E> = &'a (dyn Fn(&E) -> bool + Send + Sync);

/// CRUD access to one record type.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Fetch by id. `Ok(None)` when absent.
    async fn get(&self, id: &str) -> Result<Option<E>>;

    /// All records matching `predicate`, in unspecified order.
    async fn find(&self, predicate: Predicate<'_, E>) -> Result<Vec<E>>;

    /// Insert a new record. Fails if the id is taken.
    async fn add(&self, entity: E) -> Result<()>;

    /// Replace an existing record. Fails if the id is unknown.
    async fn update(&self, entity: E) -> Result<()>;

    /// Remove by id, returning whether a record was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// One write inside an atomic commit.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    AddConfig(ModelConfigRecord),
    AddDataset(DatasetRecord),
    AddRun(TrainingRun),
    UpdateRun(TrainingRun),
    AddMetrics(EpochMetricsRecord),
    DeleteRun(String),
}

/// Grouped repositories plus atomic multi-write commit.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn configs(&self) -> &dyn Repository<ModelConfigRecord>;
    fn datasets(&self) -> &dyn Repository<DatasetRecord>;
    fn runs(&self) -> &dyn Repository<TrainingRun>;
    fn metrics(&self) -> &dyn Repository<EpochMetricsRecord>;

    /// Apply all writes or none. Concurrent commits are serialized.
    async fn commit(&self, writes: Vec<PendingWrite>) -> Result<()>;
}

/// Snapshots of `symbol` with `from <= timestamp < to` across all
/// datasets, sorted by timestamp.
pub async fn snapshots_in_range(
    uow: &dyn UnitOfWork,
    symbol: &Symbol,
    from: Timestamp,
    to: Timestamp,
) -> Result<Vec<Snapshot>> {
    let datasets = uow.datasets().find(&|d: &DatasetRecord| &d.symbol == symbol).await?;
    let mut out: Vec<Snapshot> = datasets
        .into_iter()
        .flat_map(|d| d.snapshots)
        .filter(|s| &s.symbol == symbol && s.timestamp >= from && s.timestamp < to)
        .collect();
    out.sort_by_key(|s| s.timestamp);
    Ok(out)
}

/// Runs of a configuration, oldest first.
pub async fn run_history(uow: &dyn UnitOfWork, config_id: &str) -> Result<Vec<TrainingRun>> {
    let mut runs = uow.runs().find(&|r: &TrainingRun| r.config_id == config_id).await?;
    runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(runs)
}

/// Epoch metrics of a run ordered by epoch then split.
pub async fn metrics_history(uow: &dyn UnitOfWork, run_id: &str) -> Result<Vec<EpochMetricsRecord>> {
    let mut rows = uow.metrics().find(&|m: &EpochMetricsRecord| m.run_id == run_id).await?;
    rows.sort_by(|a, b| a.epoch.cmp(&b.epoch).then(a.split.cmp(&b.split)));
    Ok(rows)
}
