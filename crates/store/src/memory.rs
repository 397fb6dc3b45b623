//! In-memory repository and unit of work.
//!
//! Thread-safe: each repository is a `DashMap` keyed by id, and commits are
//! serialized by a `parking_lot::Mutex` so a multi-write commit is never
//! interleaved with another.

use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;

use crate::records::{DatasetRecord, EpochMetricsRecord, Entity, ModelConfigRecord, TrainingRun};
use crate::repository::{PendingWrite, Predicate, Repository, UnitOfWork};

/// Map-backed repository for one record type.
pub struct MemoryRepository<E: Entity> {
    items: DashMap<String, E>,
}

impl<E: Entity> Default for MemoryRepository<E> {
    fn default() -> Self {
        Self {
            items: DashMap::new(),
        }
    }
}

impl<E: Entity> MemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert_new(&self, entity: E) -> Result<()> {
        match self.items.entry(entity.id().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                bail!("{} {} already exists", E::KIND, entity.id())
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(())
            }
        }
    }

    fn replace(&self, entity: E) -> Result<()> {
        match self.items.get_mut(entity.id()) {
            Some(mut slot) => {
                *slot = entity;
                Ok(())
            }
            None => bail!("{} {} does not exist", E::KIND, entity.id()),
        }
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for MemoryRepository<E> {
    async fn get(&self, id: &str) -> Result<Option<E>> {
        Ok(self.items.get(id).map(|e| e.value().clone()))
    }

    async fn find(&self, predicate: Predicate<'_, E>) -> Result<Vec<E>> {
        Ok(self
            .items
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect())
    }

    async fn add(&self, entity: E) -> Result<()> {
        self.insert_new(entity)
    }

    async fn update(&self, entity: E) -> Result<()> {
        self.replace(entity)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.items.remove(id).is_some())
    }
}

/// In-memory [`UnitOfWork`] holding all four record types.
#[derive(Default)]
pub struct MemoryStore {
    configs: MemoryRepository<ModelConfigRecord>,
    datasets: MemoryRepository<DatasetRecord>,
    runs: MemoryRepository<TrainingRun>,
    metrics: MemoryRepository<EpochMetricsRecord>,
    commit_lock: parking_lot::Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every write against current state before anything is applied.
    fn validate(&self, writes: &[PendingWrite]) -> Result<()> {
        let mut added_runs = std::collections::HashSet::new();
        for w in writes {
            match w {
                PendingWrite::AddConfig(c) if self.configs.items.contains_key(&c.id) => {
                    bail!("configuration {} already exists", c.id)
                }
                PendingWrite::AddDataset(d) if self.datasets.items.contains_key(&d.id) => {
                    bail!("dataset {} already exists", d.id)
                }
                PendingWrite::AddRun(r) => {
                    if self.runs.items.contains_key(&r.id) || !added_runs.insert(r.id.clone()) {
                        bail!("run {} already exists", r.id);
                    }
                }
                PendingWrite::UpdateRun(r)
                    if !self.runs.items.contains_key(&r.id) && !added_runs.contains(&r.id) =>
                {
                    bail!("run {} does not exist", r.id)
                }
                PendingWrite::AddMetrics(m) if self.metrics.items.contains_key(&m.id) => {
                    bail!("metrics {} already exists", m.id)
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    fn configs(&self) -> &dyn Repository<ModelConfigRecord> {
        &self.configs
    }

    fn datasets(&self) -> &dyn Repository<DatasetRecord> {
        &self.datasets
    }

    fn runs(&self) -> &dyn Repository<TrainingRun> {
        &self.runs
    }

    fn metrics(&self) -> &dyn Repository<EpochMetricsRecord> {
        &self.metrics
    }

    async fn commit(&self, writes: Vec<PendingWrite>) -> Result<()> {
        let _guard = self.commit_lock.lock();
        self.validate(&writes)?;
        let count = writes.len();
        for w in writes {
            match w {
                PendingWrite::AddConfig(c) => self.configs.insert_new(c)?,
                PendingWrite::AddDataset(d) => self.datasets.insert_new(d)?,
                PendingWrite::AddRun(r) => self.runs.insert_new(r)?,
                PendingWrite::UpdateRun(r) => self.runs.replace(r)?,
                PendingWrite::AddMetrics(m) => self.metrics.insert_new(m)?,
                PendingWrite::DeleteRun(id) => {
                    self.runs.items.remove(&id);
                    self.metrics.items.retain(|_, m| m.run_id != id);
                }
            }
        }
        tracing::trace!(writes = count, "committed unit of work");
        Ok(())
    }
}
