//! Artifact export of completed runs.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use tc_store::{EpochMetricsRecord, ModelStore, TrainingRun};
use tc_training::checkpoint::BEST_CHECKPOINT;

/// Export artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Best checkpoint weights, sidecars and metadata.
    Native,
    /// Run record plus epoch metrics as pretty JSON.
    Json,
    /// Epoch metrics as CSV.
    Csv,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "checkpoint" => Ok(Self::Native),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown export format '{other}' (native, json, csv)")),
        }
    }
}

#[derive(Serialize)]
struct RunExport<'a> {
    run: &'a TrainingRun,
    metrics: &'a [EpochMetricsRecord],
}

/// Copy every `best_model.*` file of `checkpoint_dir` into `out_dir`.
/// Returns `Ok(None)` when the run has no best checkpoint.
pub fn export_native(store: &dyn ModelStore, checkpoint_dir: &Path, out_dir: &Path) -> Result<Option<PathBuf>> {
    if !store.exists(&checkpoint_dir.join(BEST_CHECKPOINT)) {
        return Ok(None);
    }
    let stem = BEST_CHECKPOINT.trim_end_matches(".ckpt");
    store.ensure_dir(out_dir)?;
    for path in store.list(checkpoint_dir)? {
        let Some(name) = path.file_name() else { continue };
        if name.to_string_lossy().starts_with(stem) {
            store.copy(&path, &out_dir.join(name))?;
        }
    }
    Ok(Some(out_dir.join(BEST_CHECKPOINT)))
}

pub fn export_json(
    store: &dyn ModelStore,
    run: &TrainingRun,
    metrics: &[EpochMetricsRecord],
    out_dir: &Path,
) -> Result<PathBuf> {
    let path = out_dir.join("run.json");
    let body = serde_json::to_vec_pretty(&RunExport { run, metrics }).context("serialize run export")?;
    store.write(&path, &body)?;
    Ok(path)
}

const CSV_HEADER: [&str; 9] = [
    "epoch",
    "split",
    "loss",
    "accuracy",
    "precision",
    "recall",
    "f1",
    "learning_rate",
    "recorded_at",
];

/// One CSV row; `None` metrics are written as empty fields. Field order
/// matches [`CSV_HEADER`].
#[derive(Serialize)]
struct MetricsRow<'a> {
    epoch: usize,
    split: String,
    loss: f64,
    accuracy: f64,
    precision: Option<f64>,
    recall: Option<f64>,
    f1: Option<f64>,
    learning_rate: f64,
    recorded_at: &'a str,
}

/// Render epoch metrics as CSV, one row per (epoch, split).
pub fn metrics_csv(metrics: &[EpochMetricsRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if metrics.is_empty() {
        writer.write_record(CSV_HEADER)?;
    }
    for m in metrics {
        let recorded_at = m.recorded_at.to_rfc3339();
        writer
            .serialize(MetricsRow {
                epoch: m.epoch,
                split: m.split.to_string(),
                loss: m.metrics.loss,
                accuracy: m.metrics.accuracy,
                precision: m.metrics.precision,
                recall: m.metrics.recall,
                f1: m.metrics.f1,
                learning_rate: m.learning_rate,
                recorded_at: &recorded_at,
            })
            .with_context(|| format!("write metrics row for epoch {}", m.epoch))?;
    }
    writer.into_inner().map_err(|e| anyhow!("flush metrics csv: {}", e.error()))
}

pub fn export_csv(store: &dyn ModelStore, metrics: &[EpochMetricsRecord], out_dir: &Path) -> Result<PathBuf> {
    let path = out_dir.join("metrics.csv");
    store.write(&path, &metrics_csv(metrics)?)?;
    Ok(path)
}
