//! Cancellation handles of in-flight runs.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Maps run id → cancellation token for runs currently executing.
///
/// Entries are only created through [`RunRegistry::claim`] and only removed
/// when the returned [`RunLease`] drops, so the map holds live runs and at
/// most one executor per run id.
#[derive(Debug, Default)]
pub struct RunRegistry {
    tokens: DashMap<String, CancellationToken>,
}

/// Exclusive hold on a run id. Dropping the lease (on return, error or
/// panic unwinding) removes the registry entry.
#[derive(Debug)]
pub struct RunLease {
    registry: Arc<RunRegistry>,
    run_id: String,
    token: CancellationToken,
}

impl RunLease {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.registry.tokens.remove(&self.run_id);
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically register `run_id` with a fresh token. Returns `None` when
    /// the run is already in flight.
    pub fn claim(self: &Arc<Self>, run_id: &str) -> Option<RunLease> {
        let token = match self.tokens.entry(run_id.to_string()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => slot.insert(CancellationToken::new()).value().clone(),
        };
        Some(RunLease {
            registry: Arc::clone(self),
            run_id: run_id.to_string(),
            token,
        })
    }

    /// Signal cancellation. Returns `false` if no such run is in flight.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.tokens.get(run_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(run_id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.tokens.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
