//! Candle feedforward classifier for mid-price direction.
//!
//! Architecture: input → hidden layers (ReLU) → 3 logits, softmax output.
//! Default widths are 64 → 32, as configured by `hidden_units`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{linear, ops, optim, Linear, Module, Optimizer, VarBuilder, VarMap};

use tc_core::config::TrainingConfig;
use tc_core::types::{ClassProbs, NUM_CLASSES};

use crate::model::{ModelFactory, ModelSummary, TrainableModel};
use crate::normalize::NormStats;

/// Sidecar path holding normalization stats for the weights at `path`.
pub fn norm_path(path: &Path) -> PathBuf {
    path.with_extension("norm.json")
}

/// Feedforward network predicting P(down), P(flat), P(up).
pub struct DirectionClassifier {
    hidden: Vec<Linear>,
    output: Linear,
    varmap: VarMap,
    optimizer: optim::AdamW,
    device: Device,
    input_dim: usize,
    widths: Vec<usize>,
    norm: Option<NormStats>,
}

impl DirectionClassifier {
    /// Create a model with freshly initialized trainable weights.
    pub fn new(input_dim: usize, hidden_units: &[usize], learning_rate: f64) -> Result<Self> {
        if input_dim == 0 {
            bail!("classifier needs at least one input feature");
        }
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let mut hidden = Vec::with_capacity(hidden_units.len());
        let mut prev = input_dim;
        for (i, &width) in hidden_units.iter().enumerate() {
            hidden.push(linear(prev, width, vb.pp(format!("fc{}", i + 1)))?);
            prev = width;
        }
        let output = linear(prev, NUM_CLASSES, vb.pp("out"))?;

        let optimizer = optim::AdamW::new(
            varmap.all_vars(),
            optim::ParamsAdamW {
                lr: learning_rate,
                weight_decay: 1e-4,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-8,
            },
        )?;

        let mut widths = hidden_units.to_vec();
        widths.push(NUM_CLASSES);

        Ok(Self {
            hidden,
            output,
            varmap,
            optimizer,
            device,
            input_dim,
            widths,
            norm: None,
        })
    }

    /// Forward pass returning raw logits (before softmax).
    pub fn forward_logits(&self, x: &Tensor) -> Result<Tensor> {
        let mut h = x.clone();
        for layer in &self.hidden {
            h = layer.forward(&h)?.relu()?;
        }
        Ok(self.output.forward(&h)?)
    }

    pub fn norm_stats(&self) -> Option<&NormStats> {
        self.norm.as_ref()
    }

    fn to_tensor(&self, rows: &[Vec<f64>]) -> Result<Tensor> {
        let mut flat = Vec::with_capacity(rows.len() * self.input_dim);
        for row in rows {
            if row.len() != self.input_dim {
                bail!(
                    "feature row has {} columns, model expects {}",
                    row.len(),
                    self.input_dim
                );
            }
            match &self.norm {
                Some(stats) => flat.extend(stats.normalize(row).into_iter().map(|v| v as f32)),
                None => flat.extend(row.iter().map(|v| *v as f32)),
            }
        }
        Ok(Tensor::from_vec(flat, (rows.len(), self.input_dim), &self.device)?)
    }
}

impl TrainableModel for DirectionClassifier {
    fn predict(&self, batch: &[Vec<f64>]) -> Result<Vec<ClassProbs>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.to_tensor(batch)?;
        let probs = ops::softmax(&self.forward_logits(&x)?, D::Minus1)?;
        let rows = probs.to_vec2::<f32>()?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let mut out = [0.0; NUM_CLASSES];
                for (o, p) in out.iter_mut().zip(r) {
                    *o = p as f64;
                }
                out
            })
            .collect())
    }

    fn calibrate(&mut self, features: &[Vec<f64>]) -> Result<()> {
        if features.is_empty() {
            return Ok(());
        }
        self.norm = Some(NormStats::fit(features, self.input_dim));
        Ok(())
    }

    fn fit_batch(
        &mut self,
        features: &[Vec<f64>],
        labels: &[ClassProbs],
        learning_rate: f64,
    ) -> Result<()> {
        if features.is_empty() {
            return Ok(());
        }
        if features.len() != labels.len() {
            bail!("{} feature rows but {} labels", features.len(), labels.len());
        }
        let x = self.to_tensor(features)?;
        let targets: Vec<f32> = labels.iter().flat_map(|l| l.iter().map(|v| *v as f32)).collect();
        let y = Tensor::from_vec(targets, (labels.len(), NUM_CLASSES), &self.device)?;

        let log_probs = ops::log_softmax(&self.forward_logits(&x)?, D::Minus1)?;
        let loss = y.mul(&log_probs)?.sum(D::Minus1)?.neg()?.mean_all()?;

        self.optimizer.set_learning_rate(learning_rate);
        self.optimizer.backward_step(&loss)?;
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        self.varmap
            .save(path)
            .with_context(|| format!("save weights {}", path.display()))?;
        if let Some(stats) = &self.norm {
            stats.save(&norm_path(path))?;
        }
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.varmap
            .load(path)
            .with_context(|| format!("load weights {}", path.display()))?;
        let sidecar = norm_path(path);
        self.norm = if sidecar.exists() {
            Some(NormStats::load(&sidecar, self.input_dim)?)
        } else {
            None
        };
        Ok(())
    }

    fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: "direction_classifier".to_string(),
            input_dim: self.input_dim,
            layers: self.widths.clone(),
            parameters: self.varmap.all_vars().iter().map(|v| v.elem_count()).sum(),
        }
    }
}

/// Builds [`DirectionClassifier`]s from a training configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifierFactory;

impl ModelFactory for ClassifierFactory {
    fn build(&self, input_dim: usize, config: &TrainingConfig) -> Result<Box<dyn TrainableModel>> {
        let model = DirectionClassifier::new(input_dim, &config.hidden_units, config.learning_rate)?;
        tracing::debug!(
            input_dim,
            hidden = ?config.hidden_units,
            parameters = model.summary().parameters,
            "built direction classifier"
        );
        Ok(Box::new(model))
    }
}
