//! Caller-facing facade over the orchestrator, the store and the
//! evaluation engine.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use tc_core::config::AppConfig;
use tc_core::error::{PipelineError, PipelineResult};
use tc_core::types::{ClassProbs, Snapshot};
use tc_eval::{
    evaluate_predictions, rank_runs, run_backtest, BacktestConfig, BacktestPoint, BacktestResult,
    CrossValidationResult, EvaluationMetrics, RunEvaluation, TradingParams,
};
use tc_features::feature_matrix;
use tc_ml::{ClassifierFactory, ModelFactory};
use tc_store::repository::{metrics_history, run_history};
use tc_store::{
    DatasetRecord, FsModelStore, MemoryStore, ModelConfigRecord, ModelStore, PendingWrite, RunStatus, TrainingRun,
    UnitOfWork,
};
use tc_training::{Orchestrator, OrchestratorSettings, RunRegistry, TrainedModel};

use crate::export::{export_csv, export_json, export_native, ExportFormat};

pub struct TrainingService {
    config: AppConfig,
    uow: Arc<dyn UnitOfWork>,
    models: Arc<dyn ModelStore>,
    orchestrator: Arc<Orchestrator>,
}

impl TrainingService {
    pub fn new(
        config: AppConfig,
        uow: Arc<dyn UnitOfWork>,
        models: Arc<dyn ModelStore>,
        factory: Arc<dyn ModelFactory>,
    ) -> Self {
        let settings = OrchestratorSettings {
            checkpoint_root: config.checkpoint.dir.clone(),
            defaults: config.training.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(
            uow.clone(),
            models.clone(),
            factory,
            Arc::new(RunRegistry::new()),
            settings,
        ));
        Self {
            config,
            uow,
            models,
            orchestrator,
        }
    }

    /// In-memory records, filesystem checkpoints, candle classifier.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(FsModelStore),
            Arc::new(ClassifierFactory),
        )
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Store a model configuration; `hyperparameters` is raw JSON text.
    pub async fn register_config(&self, name: &str, hyperparameters: &str) -> PipelineResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = ModelConfigRecord::new(id.clone(), name, hyperparameters);
        self.uow.commit(vec![PendingWrite::AddConfig(record)]).await?;
        info!(config_id = %id, name, "configuration registered");
        Ok(id)
    }

    /// Store a snapshot sequence as a dataset. All snapshots must share one symbol.
    pub async fn register_dataset(&self, snapshots: Vec<Snapshot>) -> PipelineResult<String> {
        let Some(first) = snapshots.first() else {
            return Err(PipelineError::InvalidArgument("dataset has no snapshots".into()));
        };
        let symbol = first.symbol.clone();
        if let Some(other) = snapshots.iter().find(|s| s.symbol != symbol) {
            return Err(PipelineError::InvalidArgument(format!(
                "dataset mixes symbols {symbol} and {}",
                other.symbol
            )));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let count = snapshots.len();
        let record = DatasetRecord::new(id.clone(), symbol, snapshots);
        self.uow.commit(vec![PendingWrite::AddDataset(record)]).await?;
        info!(dataset_id = %id, snapshots = count, "dataset registered");
        Ok(id)
    }

    /// Start a run in the background and return its id.
    pub async fn start_run(&self, config_id: &str, dataset_id: &str) -> PipelineResult<String> {
        self.orchestrator.start_run(config_id, dataset_id).await
    }

    /// Train on the caller's task until the run is terminal.
    pub async fn run_to_completion(&self, config_id: &str, dataset_id: &str) -> PipelineResult<TrainingRun> {
        self.orchestrator.run(config_id, dataset_id).await
    }

    /// `true` when the run was in flight and has been signalled.
    pub fn stop(&self, run_id: &str) -> bool {
        self.orchestrator.stop(run_id)
    }

    pub async fn resume(&self, run_id: &str) -> PipelineResult<String> {
        self.orchestrator.resume(run_id).await
    }

    pub async fn get_result(&self, run_id: &str) -> PipelineResult<TrainingRun> {
        self.uow
            .runs()
            .get(run_id)
            .await?
            .ok_or_else(|| PipelineError::not_found("run", run_id))
    }

    /// Runs of a configuration, oldest first.
    pub async fn get_history(&self, config_id: &str) -> PipelineResult<Vec<TrainingRun>> {
        if self.uow.configs().get(config_id).await?.is_none() {
            return Err(PipelineError::not_found("configuration", config_id));
        }
        Ok(run_history(&*self.uow, config_id).await?)
    }

    /// Write an artifact for a completed run and return its path.
    pub async fn export(&self, run_id: &str, format: ExportFormat) -> PipelineResult<PathBuf> {
        let run = self.get_result(run_id).await?;
        if run.status != RunStatus::Completed {
            return Err(PipelineError::InvalidState {
                run_id: run.id,
                status: run.status.to_string(),
            });
        }
        let out_dir = self.config.storage.export_dir.join(&run.id);
        let path = match format {
            ExportFormat::Native => {
                let checkpoint_dir = run
                    .checkpoint_dir
                    .clone()
                    .unwrap_or_else(|| self.config.checkpoint.dir.join(&run.id));
                export_native(&*self.models, &checkpoint_dir, &out_dir)?.ok_or_else(|| {
                    PipelineError::InvalidState {
                        run_id: run.id.clone(),
                        status: "missing best checkpoint".to_string(),
                    }
                })?
            }
            ExportFormat::Json => {
                let metrics = metrics_history(&*self.uow, &run.id).await?;
                export_json(&*self.models, &run, &metrics, &out_dir)?
            }
            ExportFormat::Csv => {
                let metrics = metrics_history(&*self.uow, &run.id).await?;
                export_csv(&*self.models, &metrics, &out_dir)?
            }
        };
        info!(run_id, format = ?format, path = %path.display(), "run exported");
        Ok(path)
    }

    fn trading_params(&self) -> TradingParams {
        TradingParams::from(&self.config.evaluation)
    }

    /// Full metric bundle of a completed run on its test split.
    pub async fn evaluate(&self, run_id: &str) -> PipelineResult<EvaluationMetrics> {
        let trained = self.orchestrator.load_trained(run_id).await?;
        self.evaluate_trained(&trained)
    }

    fn evaluate_trained(&self, trained: &TrainedModel) -> PipelineResult<EvaluationMetrics> {
        let test = &trained.data.test;
        let preds = trained.model.predict(&test.features)?;
        Ok(evaluate_predictions(&preds, &test.labels, &self.trading_params()))
    }

    /// Evaluate each run and rank them best first.
    pub async fn compare(&self, run_ids: &[String]) -> PipelineResult<Vec<RunEvaluation>> {
        if run_ids.is_empty() {
            return Err(PipelineError::InvalidArgument("no runs to compare".into()));
        }
        let mut evaluations = Vec::with_capacity(run_ids.len());
        for run_id in run_ids {
            let metrics = self.evaluate(run_id).await?;
            evaluations.push(RunEvaluation {
                run_id: run_id.clone(),
                metrics,
            });
        }
        Ok(rank_runs(evaluations))
    }

    /// k-fold cross-validation over every labelled sample of the run's
    /// dataset, in time order, with fresh models per fold.
    pub async fn cross_validate(&self, run_id: &str) -> PipelineResult<CrossValidationResult> {
        let trained = self.orchestrator.load_trained(run_id).await?;
        let labelled = trained.data.extraction.labelled();
        let features = feature_matrix(&labelled, &trained.data.keys);
        let labels: Vec<ClassProbs> = labelled.iter().filter_map(|s| s.target()).collect();
        let eval = &self.config.evaluation;
        tc_eval::cross_validate(
            &features,
            &labels,
            eval.cv_folds,
            eval.cv_epochs,
            &trained.config,
            &**self.orchestrator.factory(),
        )
    }

    /// Replay the test split through the trained model as a trading strategy.
    pub async fn backtest(&self, run_id: &str) -> PipelineResult<BacktestResult> {
        let trained = self.orchestrator.load_trained(run_id).await?;
        let replay = trained.data.test_replay();
        let features = feature_matrix(&replay, &trained.data.keys);
        let probs = trained.model.predict(&features)?;
        let points: Vec<BacktestPoint> = replay
            .iter()
            .zip(probs)
            .map(|(sample, probs)| BacktestPoint {
                timestamp: sample.timestamp,
                price: sample.mid_price,
                probs,
            })
            .collect();
        let eval = &self.config.evaluation;
        let cfg = BacktestConfig::new(&self.config.backtest, eval.risk_free_rate, eval.periods_per_year);
        let result = run_backtest(&points, &cfg);
        info!(
            run_id,
            trades = result.total_trades,
            total_return = result.total_return,
            "backtest finished"
        );
        Ok(result)
    }
}
