//! Training orchestrator.
//!
//! Drives one run through `Created → InProgress → Completed | Failed |
//! Cancelled`. The epoch loop wires the optimizer, the early-stopping
//! monitor and the checkpoint manager around an opaque [`TrainableModel`].
//! Whatever happens inside the loop, the run record receives exactly one
//! terminal write, and the run's cancellation handle is dropped from the
//! registry.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use tc_core::config::TrainingConfig;
use tc_core::error::{PipelineError, PipelineResult};
use tc_core::types::{ClassProbs, SplitTag};
use tc_eval::{accuracy, classification_metrics, correct_count, cross_entropy};
use tc_ml::{ModelFactory, TrainableModel};
use tc_store::{
    EpochMetricsRecord, MetricSet, ModelStore, PendingWrite, RunStatus, TrainingRun, UnitOfWork,
};

use crate::checkpoint::CheckpointManager;
use crate::data::{prepare_data, resolve_hyperparameters, PreparedData, SplitData};
use crate::early_stopping::EarlyStopping;
use crate::optimizer::build_optimizer;
use crate::registry::{RunLease, RunRegistry};

/// Static settings of an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Root under which each run gets `<root>/<run_id>/`.
    pub checkpoint_root: PathBuf,
    /// Hyperparameters used where a stored configuration is silent.
    pub defaults: TrainingConfig,
}

/// How the epoch loop ended, short of an error.
enum LoopOutcome {
    Completed { test: MetricSet },
    Cancelled,
}

/// Where a (re-)entered loop starts.
struct StartPoint {
    epoch: usize,
    /// Numbered checkpoint to restore model state from.
    checkpoint: Option<PathBuf>,
}

/// A trained model restored from its best checkpoint, with the data and
/// configuration it was trained on.
pub struct TrainedModel {
    pub run: TrainingRun,
    pub config: TrainingConfig,
    pub data: PreparedData,
    pub model: Box<dyn TrainableModel>,
}

/// Owns the collaborators shared by all runs. Per-run state lives on the
/// stack of the task executing that run.
pub struct Orchestrator {
    uow: Arc<dyn UnitOfWork>,
    models: Arc<dyn ModelStore>,
    factory: Arc<dyn ModelFactory>,
    registry: Arc<RunRegistry>,
    settings: OrchestratorSettings,
}

/// Deterministic Fisher-Yates permutation of `0..n` (64-bit LCG).
pub fn shuffle_indices(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = seed;
    for i in (1..n).rev() {
        rng = rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = (rng >> 33) as usize % (i + 1);
        indices.swap(i, j);
    }
    indices
}

/// The value early stopping watches, chosen by metric name.
fn monitored_value(monitor: &str, train: &MetricSet, val: &MetricSet) -> f64 {
    match monitor {
        "val_accuracy" | "val_acc" => val.accuracy,
        "loss" | "train_loss" => train.loss,
        "accuracy" | "acc" | "train_accuracy" => train.accuracy,
        _ => val.loss,
    }
}

fn ensure_resumable(run: &TrainingRun) -> PipelineResult<()> {
    if run.status.is_resumable() {
        return Ok(());
    }
    Err(PipelineError::InvalidState {
        run_id: run.id.clone(),
        status: run.status.to_string(),
    })
}

/// Full-batch loss and accuracy of `split`.
fn score_split(model: &dyn TrainableModel, split: &SplitData) -> Result<(MetricSet, Vec<ClassProbs>)> {
    let preds = model.predict(&split.features)?;
    let metrics = MetricSet::basic(cross_entropy(&preds, &split.labels), accuracy(&preds, &split.labels));
    Ok((metrics, preds))
}

impl Orchestrator {
    pub fn new(
        uow: Arc<dyn UnitOfWork>,
        models: Arc<dyn ModelStore>,
        factory: Arc<dyn ModelFactory>,
        registry: Arc<RunRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            uow,
            models,
            factory,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn factory(&self) -> &Arc<dyn ModelFactory> {
        &self.factory
    }

    async fn fetch_run(&self, run_id: &str) -> PipelineResult<TrainingRun> {
        self.uow
            .runs()
            .get(run_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("run", run_id))
    }

    /// Resolved hyperparameters of a stored configuration.
    pub async fn load_config(&self, config_id: &str) -> PipelineResult<TrainingConfig> {
        let record = self
            .uow
            .configs()
            .get(config_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("configuration", config_id))?;
        Ok(resolve_hyperparameters(&self.settings.defaults, &record.hyperparameters))
    }

    /// Persist a fresh `Created` run after checking its references.
    async fn create_run(&self, config_id: &str, dataset_id: &str) -> PipelineResult<TrainingRun> {
        let config = self.load_config(config_id).await?;
        if self.uow.datasets().get(dataset_id).await?.is_none() {
            return Err(PipelineError::not_found("dataset", dataset_id));
        }
        let mut run = TrainingRun::new(uuid::Uuid::new_v4().to_string(), config_id, dataset_id);
        run.config_snapshot = config.to_json();
        run.checkpoint_dir = Some(self.settings.checkpoint_root.join(&run.id));
        self.uow.commit(vec![PendingWrite::AddRun(run.clone())]).await?;
        info!(run_id = %run.id, config_id, dataset_id, "run created");
        Ok(run)
    }

    /// Claim the registry slot of a run that is about to execute.
    fn claim(&self, run: &TrainingRun) -> PipelineResult<RunLease> {
        self.registry.claim(&run.id).ok_or_else(|| PipelineError::InvalidState {
            run_id: run.id.clone(),
            status: "already running".to_string(),
        })
    }

    /// Execute on a background task. A panic in the loop drops the lease
    /// with the task and is recorded as a failure of the run.
    fn spawn_execute(self: &Arc<Self>, run: TrainingRun, lease: RunLease, resuming: bool) {
        let run_id = run.id.clone();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.execute(run, lease, resuming).await });
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!(run_id = %run_id, error = %e, "run bookkeeping failed"),
                Err(e) if e.is_panic() => {
                    error!(run_id = %run_id, "run task panicked");
                    if let Err(e) = this.record_panic(&run_id).await {
                        error!(run_id = %run_id, error = %e, "failed to record panicked run");
                    }
                }
                Err(e) => warn!(run_id = %run_id, error = %e, "run task aborted"),
            }
        });
    }

    /// Mark a run whose task panicked mid-loop as failed.
    async fn record_panic(&self, run_id: &str) -> PipelineResult<()> {
        let mut run = self.fetch_run(run_id).await?;
        if run.status != RunStatus::InProgress {
            return Ok(());
        }
        run.status = RunStatus::Failed;
        run.error_message = Some("run task panicked".to_string());
        run.completed_at = Some(Utc::now());
        self.uow.commit(vec![PendingWrite::UpdateRun(run)]).await?;
        Ok(())
    }

    /// Create a run and execute it on a background task. Returns the run id
    /// immediately; the run record reports the outcome.
    pub async fn start_run(self: &Arc<Self>, config_id: &str, dataset_id: &str) -> PipelineResult<String> {
        let run = self.create_run(config_id, dataset_id).await?;
        let run_id = run.id.clone();
        let lease = self.claim(&run)?;
        self.spawn_execute(run, lease, false);
        Ok(run_id)
    }

    /// Create a run and execute it to a terminal state on the caller's task.
    pub async fn run(&self, config_id: &str, dataset_id: &str) -> PipelineResult<TrainingRun> {
        let run = self.create_run(config_id, dataset_id).await?;
        let lease = self.claim(&run)?;
        self.execute(run, lease, false).await
    }

    /// Signal cancellation to an in-flight run.
    pub fn stop(&self, run_id: &str) -> bool {
        self.registry.cancel(run_id)
    }

    /// Check that a run may be resumed, claim its registry slot and bump its
    /// resume count. The status transition is persisted when the loop
    /// re-enters.
    async fn reopen(&self, run_id: &str) -> PipelineResult<(TrainingRun, RunLease)> {
        let run = self.fetch_run(run_id).await?;
        ensure_resumable(&run)?;
        let lease = self.claim(&run)?;
        // a racing resume may have finished between the fetch and the claim
        let mut run = self.fetch_run(run_id).await?;
        ensure_resumable(&run)?;
        run.resume_count += 1;
        info!(run_id, resume_count = run.resume_count, "resuming run");
        Ok((run, lease))
    }

    /// Resume a failed or cancelled run on a background task.
    pub async fn resume(self: &Arc<Self>, run_id: &str) -> PipelineResult<String> {
        let (run, lease) = self.reopen(run_id).await?;
        self.spawn_execute(run, lease, true);
        Ok(run_id.to_string())
    }

    /// Resume a failed or cancelled run on the caller's task.
    pub async fn resume_and_wait(&self, run_id: &str) -> PipelineResult<TrainingRun> {
        let (run, lease) = self.reopen(run_id).await?;
        self.execute(run, lease, true).await
    }

    /// Run the loop and record the terminal outcome. The lease is released
    /// when this returns or unwinds.
    async fn execute(&self, run: TrainingRun, lease: RunLease, resuming: bool) -> PipelineResult<TrainingRun> {
        let span = info_span!("run", run_id = %run.id);
        let run_id = run.id.clone();
        let result = self.execute_inner(run, lease.token(), resuming).instrument(span).await;
        drop(lease);
        debug!(run_id = %run_id, ok = result.is_ok(), "run task finished");
        result
    }

    async fn execute_inner(&self, mut run: TrainingRun, token: &CancellationToken, resuming: bool) -> PipelineResult<TrainingRun> {
        if !run.status.can_transition_to(RunStatus::InProgress) {
            return Err(PipelineError::InvalidState {
                run_id: run.id.clone(),
                status: run.status.to_string(),
            });
        }
        run.status = RunStatus::InProgress;
        run.error_message = None;
        run.completed_at = None;
        run.started_at.get_or_insert_with(Utc::now);
        self.uow.commit(vec![PendingWrite::UpdateRun(run.clone())]).await?;
        info!(resuming, "run in progress");

        let outcome = self.train(&mut run, token, resuming).await;
        let mut writes = Vec::with_capacity(2);
        match outcome {
            Ok(LoopOutcome::Completed { test }) => {
                run.status = RunStatus::Completed;
                run.test_metrics = Some(test);
                writes.push(PendingWrite::AddMetrics(EpochMetricsRecord::new(
                    &run.id,
                    run.epochs_completed,
                    SplitTag::Test,
                    test,
                    0.0,
                )));
                info!(
                    epochs = run.epochs_completed,
                    best_epoch = ?run.best_epoch,
                    best_val_loss = ?run.best_val_loss,
                    test_accuracy = test.accuracy,
                    "run completed"
                );
            }
            Ok(LoopOutcome::Cancelled) => {
                run.status = RunStatus::Cancelled;
                info!(epochs = run.epochs_completed, "run cancelled");
            }
            Err(e) => {
                run.status = RunStatus::Failed;
                run.error_message = Some(format!("{e:#}"));
                error!(error = %format!("{e:#}"), epochs = run.epochs_completed, "run failed");
            }
        }
        run.completed_at = Some(Utc::now());
        writes.insert(0, PendingWrite::UpdateRun(run.clone()));
        self.uow.commit(writes).await?;
        Ok(run)
    }

    /// Epoch to start from and state to restore, for a fresh or resumed run.
    fn start_point(&self, checkpoints: &CheckpointManager, resuming: bool) -> Result<StartPoint> {
        if !resuming {
            return Ok(StartPoint {
                epoch: 0,
                checkpoint: None,
            });
        }
        Ok(match checkpoints.get_last_checkpoint()? {
            Some(last) => StartPoint {
                epoch: last.meta.epoch + 1,
                checkpoint: Some(last.path),
            },
            None => StartPoint {
                epoch: 0,
                checkpoint: None,
            },
        })
    }

    /// Drop metric rows of epochs that will be trained again.
    async fn prune_metrics(&self, run_id: &str, from_epoch: usize) -> Result<()> {
        let stale = self
            .uow
            .metrics()
            .find(&|m: &EpochMetricsRecord| m.run_id == run_id && (m.epoch >= from_epoch || m.split == SplitTag::Test))
            .await?;
        for row in &stale {
            self.uow.metrics().delete(&row.id).await?;
        }
        if !stale.is_empty() {
            debug!(removed = stale.len(), from_epoch, "pruned superseded metrics");
        }
        Ok(())
    }

    /// The epoch loop. Errors are recorded as a failed run by the caller.
    async fn train(&self, run: &mut TrainingRun, token: &CancellationToken, resuming: bool) -> Result<LoopOutcome> {
        let config = self
            .load_config(&run.config_id)
            .await
            .map_err(anyhow::Error::from)?;
        config.validate()?;
        run.config_snapshot = config.to_json();

        let dataset = self
            .uow
            .datasets()
            .get(&run.dataset_id)
            .await?
            .with_context(|| format!("dataset {} disappeared", run.dataset_id))?;

        let Some(data) = prepare_data(&config, &dataset.snapshots, token)? else {
            return Ok(LoopOutcome::Cancelled);
        };
        if data.train.is_empty() {
            bail!("training split has no labelled samples");
        }
        if data.validation.is_empty() {
            bail!("validation split has no labelled samples");
        }

        let mut model = self.factory.build(data.input_dim(), &config)?;
        run.model_summary = Some(model.summary());

        let checkpoint_root = run
            .checkpoint_dir
            .as_ref()
            .and_then(|d| d.parent().map(PathBuf::from))
            .unwrap_or_else(|| self.settings.checkpoint_root.clone());
        let mut checkpoints = CheckpointManager::open(self.models.clone(), &checkpoint_root, &run.id, config.save_best_only)?;
        let mut optimizer = build_optimizer(config.optimizer, config.learning_rate);
        let mut early = EarlyStopping::new(config.early_stopping_patience, config.min_delta, &config.monitor);
        let mut best_val_loss = checkpoints.best_score().unwrap_or(f64::INFINITY);

        let start = self.start_point(&checkpoints, resuming)?;
        match &start.checkpoint {
            Some(path) => {
                model.load(path).with_context(|| format!("restore {}", path.display()))?;
                info!(epoch = start.epoch, path = %path.display(), "restored last checkpoint");
            }
            None => model.calibrate(&data.train.features)?,
        }
        if resuming {
            self.prune_metrics(&run.id, start.epoch).await?;
            if config.lr_schedule {
                for epoch in 0..start.epoch {
                    optimizer.update_learning_rate(epoch, f64::NAN);
                }
            }
            if let Some(best) = checkpoints.best_meta()? {
                let since_best = start.epoch.saturating_sub(best.epoch + 1);
                early.seed(monitored_value(&config.monitor, &best.train_metrics, &best.val_metrics), since_best);
            }
        }
        run.epochs_completed = start.epoch;
        run.best_epoch = checkpoints.best_epoch();
        run.best_val_loss = checkpoints.best_score();

        info!(
            optimizer = optimizer.name(),
            start_epoch = start.epoch,
            epochs = config.epochs,
            train = data.train.len(),
            validation = data.validation.len(),
            test = data.test.len(),
            "training started"
        );

        let batch_size = config.batch_size.max(1);
        let mut no_improvement = 0usize;
        for epoch in start.epoch..config.epochs {
            if token.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }

            let order = shuffle_indices(data.train.len(), config.seed.wrapping_add(epoch as u64));
            let mut loss_sum = 0.0;
            let mut correct = 0usize;
            for chunk in order.chunks(batch_size) {
                tokio::task::yield_now().await;
                if token.is_cancelled() {
                    return Ok(LoopOutcome::Cancelled);
                }
                let x: Vec<Vec<f64>> = chunk.iter().map(|&i| data.train.features[i].clone()).collect();
                let y: Vec<ClassProbs> = chunk.iter().map(|&i| data.train.labels[i]).collect();
                let preds = model.predict(&x)?;
                loss_sum += cross_entropy(&preds, &y) * chunk.len() as f64;
                correct += correct_count(&preds, &y);
                model.fit_batch(&x, &y, optimizer.learning_rate())?;
                optimizer.step();
            }
            let n = data.train.len() as f64;
            let train_metrics = MetricSet::basic(loss_sum / n, correct as f64 / n);
            let (val_metrics, _) = score_split(&*model, &data.validation)?;
            let lr = optimizer.learning_rate();

            self.uow
                .commit(vec![
                    PendingWrite::AddMetrics(EpochMetricsRecord::new(&run.id, epoch, SplitTag::Train, train_metrics, lr)),
                    PendingWrite::AddMetrics(EpochMetricsRecord::new(&run.id, epoch, SplitTag::Validation, val_metrics, lr)),
                ])
                .await?;

            let val_loss = val_metrics.loss;
            let improved = val_loss < best_val_loss - config.min_delta;
            if improved {
                best_val_loss = val_loss;
                no_improvement = 0;
            } else {
                no_improvement += 1;
            }
            if improved || !config.save_best_only {
                checkpoints.save_checkpoint(&*model, epoch, val_loss, train_metrics, val_metrics)?;
            }
            run.epochs_completed = epoch + 1;
            run.best_epoch = checkpoints.best_epoch();
            run.best_val_loss = checkpoints.best_score();

            info!(
                epoch,
                train_loss = train_metrics.loss,
                train_accuracy = train_metrics.accuracy,
                val_loss,
                val_accuracy = val_metrics.accuracy,
                lr,
                no_improvement,
                "epoch finished"
            );

            let monitored = monitored_value(&config.monitor, &train_metrics, &val_metrics);
            if early.should_stop(monitored) {
                info!(epoch, monitor = %config.monitor, "stopping early");
                break;
            }

            if config.lr_schedule && optimizer.update_learning_rate(epoch, val_loss) {
                info!(epoch, lr = optimizer.learning_rate(), "learning rate decayed");
            }
        }

        if checkpoints.load_best_checkpoint(&mut *model)?.is_none() {
            warn!("no best checkpoint, evaluating final weights");
        }
        let (mut test, test_preds) = score_split(&*model, &data.test)?;
        let cm = classification_metrics(&test_preds, &data.test.labels);
        test.precision = Some(cm.precision);
        test.recall = Some(cm.recall);
        test.f1 = Some(cm.f1);
        Ok(LoopOutcome::Completed { test })
    }

    /// Rebuild a completed run's data and restore its best weights.
    pub async fn load_trained(&self, run_id: &str) -> PipelineResult<TrainedModel> {
        let run = self.fetch_run(run_id).await?;
        if run.status != RunStatus::Completed {
            return Err(PipelineError::InvalidState {
                run_id: run.id.clone(),
                status: run.status.to_string(),
            });
        }
        let config = match &run.config_snapshot {
            serde_json::Value::Object(_) => TrainingConfig::from_json_lenient(&run.config_snapshot).config,
            _ => self.load_config(&run.config_id).await?,
        };
        let dataset = self
            .uow
            .datasets()
            .get(&run.dataset_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("dataset", &run.dataset_id))?;
        let data = prepare_data(&config, &dataset.snapshots, &CancellationToken::new())?
            .ok_or(PipelineError::Cancelled)?;

        let mut model = self.factory.build(data.input_dim(), &config)?;
        let root = run
            .checkpoint_dir
            .as_ref()
            .and_then(|d| d.parent().map(PathBuf::from))
            .unwrap_or_else(|| self.settings.checkpoint_root.clone());
        let checkpoints = CheckpointManager::new(self.models.clone(), &root, &run.id, config.save_best_only);
        if checkpoints.load_best_checkpoint(&mut *model)?.is_none() {
            return Err(PipelineError::not_found("checkpoint", checkpoints.best_path().display()));
        }
        Ok(TrainedModel {
            run,
            config,
            data,
            model,
        })
    }
}
