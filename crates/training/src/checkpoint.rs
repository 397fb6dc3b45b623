//! Per-run checkpoint persistence.
//!
//! Layout under the run directory:
//!
//! ```text
//! <root>/<run_id>/epoch_0003.ckpt          model state written by the model
//! <root>/<run_id>/epoch_0003.meta.json     CheckpointMeta
//! <root>/<run_id>/best_model.ckpt          copy of the best state
//! <root>/<run_id>/best_model.meta.json
//! ```
//!
//! Scores are loss-like: lower is better.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tc_ml::TrainableModel;
use tc_store::{MetricSet, ModelStore};

pub const BEST_CHECKPOINT: &str = "best_model.ckpt";
const CHECKPOINT_EXT: &str = "ckpt";
const META_EXT: &str = "meta.json";

/// Metadata persisted next to each checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub score: f64,
    pub train_metrics: MetricSet,
    pub val_metrics: MetricSet,
    pub timestamp: DateTime<Utc>,
    pub is_best: bool,
}

/// A located checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub meta: CheckpointMeta,
}

/// Metadata path of a checkpoint: `epoch_0003.ckpt` → `epoch_0003.meta.json`.
pub fn meta_path(checkpoint: &Path) -> PathBuf {
    checkpoint.with_extension(META_EXT)
}

fn checkpoint_name(epoch: usize) -> String {
    format!("epoch_{epoch:04}.{CHECKPOINT_EXT}")
}

/// Epoch of a numbered checkpoint file name, `None` for anything else.
fn parse_epoch(path: &Path) -> Option<usize> {
    if path.extension()? != CHECKPOINT_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.strip_prefix("epoch_")?.parse().ok()
}

/// Writes numbered and best checkpoints for one run.
pub struct CheckpointManager {
    store: Arc<dyn ModelStore>,
    dir: PathBuf,
    save_best_only: bool,
    best_score: Option<f64>,
    best_epoch: Option<usize>,
}

impl CheckpointManager {
    /// Manager for `<root>/<run_id>`. The directory is created on first
    /// save.
    pub fn new(store: Arc<dyn ModelStore>, root: &Path, run_id: &str, save_best_only: bool) -> Self {
        Self {
            store,
            dir: root.join(run_id),
            save_best_only,
            best_score: None,
            best_epoch: None,
        }
    }

    /// Like [`new`](Self::new), seeding best bookkeeping from an existing
    /// best checkpoint so a resumed run only overwrites it on a real
    /// improvement.
    pub fn open(store: Arc<dyn ModelStore>, root: &Path, run_id: &str, save_best_only: bool) -> Result<Self> {
        let mut manager = Self::new(store, root, run_id, save_best_only);
        if let Some(meta) = manager.read_meta(&manager.best_path())? {
            manager.best_score = Some(meta.score);
            manager.best_epoch = Some(meta.epoch);
        }
        Ok(manager)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(BEST_CHECKPOINT)
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Metadata of the best checkpoint, if one exists.
    pub fn best_meta(&self) -> Result<Option<CheckpointMeta>> {
        self.read_meta(&self.best_path())
    }

    fn write_meta(&self, checkpoint: &Path, meta: &CheckpointMeta) -> Result<()> {
        let json = serde_json::to_vec_pretty(meta).context("serialize checkpoint metadata")?;
        self.store.write(&meta_path(checkpoint), &json)
    }

    fn read_meta(&self, checkpoint: &Path) -> Result<Option<CheckpointMeta>> {
        let path = meta_path(checkpoint);
        if !self.store.exists(&path) {
            return Ok(None);
        }
        let bytes = self.store.read(&path)?;
        let meta = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse checkpoint metadata {}", path.display()))?;
        Ok(Some(meta))
    }

    /// Persist a checkpoint for `epoch`.
    ///
    /// With `save_best_only` a numbered checkpoint is written only when
    /// `score` is strictly below the best seen so far; otherwise always.
    /// A new best also (over)writes the best checkpoint. Returns the
    /// numbered checkpoint path when one was written.
    pub fn save_checkpoint(
        &mut self,
        model: &dyn TrainableModel,
        epoch: usize,
        score: f64,
        train_metrics: MetricSet,
        val_metrics: MetricSet,
    ) -> Result<Option<PathBuf>> {
        let is_best = self.best_score.map_or(true, |best| score < best);
        if self.save_best_only && !is_best {
            debug!(epoch, score, "checkpoint skipped, no improvement");
            return Ok(None);
        }

        self.store.ensure_dir(&self.dir)?;
        let meta = CheckpointMeta {
            epoch,
            score,
            train_metrics,
            val_metrics,
            timestamp: Utc::now(),
            is_best,
        };

        let path = self.dir.join(checkpoint_name(epoch));
        model
            .save(&path)
            .with_context(|| format!("save checkpoint {}", path.display()))?;
        self.write_meta(&path, &meta)?;

        if is_best {
            let best = self.best_path();
            model
                .save(&best)
                .with_context(|| format!("save best checkpoint {}", best.display()))?;
            self.write_meta(&best, &meta)?;
            self.best_score = Some(score);
            self.best_epoch = Some(epoch);
            info!(epoch, score, path = %best.display(), "new best checkpoint");
        }
        Ok(Some(path))
    }

    /// Restore the best checkpoint into `model`. `Ok(None)` when no best
    /// checkpoint exists; the model is left untouched.
    pub fn load_best_checkpoint(&self, model: &mut dyn TrainableModel) -> Result<Option<CheckpointMeta>> {
        let best = self.best_path();
        if !self.store.exists(&best) {
            debug!(dir = %self.dir.display(), "no best checkpoint to restore");
            return Ok(None);
        }
        model
            .load(&best)
            .with_context(|| format!("load best checkpoint {}", best.display()))?;
        let meta = self.read_meta(&best)?;
        if let Some(m) = &meta {
            info!(epoch = m.epoch, score = m.score, "restored best checkpoint");
        }
        Ok(meta)
    }

    /// The numbered checkpoint with the highest epoch. The best checkpoint
    /// is never returned. `Ok(None)` when there is none.
    pub fn get_last_checkpoint(&self) -> Result<Option<CheckpointInfo>> {
        let last = self
            .store
            .list(&self.dir)?
            .into_iter()
            .filter_map(|p| parse_epoch(&p).map(|e| (e, p)))
            .max_by_key(|(e, _)| *e);
        let Some((_, path)) = last else {
            return Ok(None);
        };
        let meta = self
            .read_meta(&path)?
            .with_context(|| format!("checkpoint {} has no metadata", path.display()))?;
        Ok(Some(CheckpointInfo { path, meta }))
    }
}
