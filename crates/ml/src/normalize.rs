use std::path::Path;

use anyhow::{Context, Result};

/// Z-score clamp applied after normalization.
const CLAMP: f64 = 5.0;

/// Per-feature normalization statistics fitted on the training split.
///
/// Stored in a JSON sidecar next to the model weights so that a reloaded
/// model normalizes exactly as it did during training.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl NormStats {
    /// Fit mean and population std per column. Constant columns get std 1.
    pub fn fit(rows: &[Vec<f64>], dim: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut m2 = vec![0.0; dim];
        for row in rows {
            for i in 0..dim.min(row.len()) {
                let d = row[i] - mean[i];
                m2[i] += d * d;
            }
        }
        let std = m2
            .into_iter()
            .map(|v| {
                let s = (v / n).sqrt();
                if s < 1e-12 {
                    1.0
                } else {
                    s
                }
            })
            .collect();
        Self { mean, std }
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Load normalization stats from a JSON file, checking the dimension.
    pub fn load(path: &Path, expected_dim: usize) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read norm stats {}", path.display()))?;
        let stats: NormStats = serde_json::from_str(&data)
            .with_context(|| format!("parse norm stats {}", path.display()))?;
        anyhow::ensure!(
            stats.mean.len() == expected_dim && stats.std.len() == expected_dim,
            "norm stats have {}/{} elements, expected {}",
            stats.mean.len(),
            stats.std.len(),
            expected_dim
        );
        Ok(stats)
    }

    /// Save normalization stats to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data).with_context(|| format!("write norm stats {}", path.display()))?;
        Ok(())
    }

    /// Apply the fitted normalization, clamped to [-5, 5].
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        raw.iter()
            .enumerate()
            .map(|(i, &x)| match (self.mean.get(i), self.std.get(i)) {
                (Some(m), Some(s)) if *s > 1e-12 => ((x - m) / s).clamp(-CLAMP, CLAMP),
                _ => 0.0,
            })
            .collect()
    }
}
