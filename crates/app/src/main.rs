//! TickCast command-line tool.
//!
//! Loads a snapshot file, trains a direction classifier in-process against
//! the in-memory store, and prints a JSON report for the chosen subcommand.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use tc_app::{ExportFormat, TrainingService};
use tc_core::config::AppConfig;
use tc_features::dataset::load_dataset;
use tc_store::{RunStatus, TrainingRun};

/// TickCast training and evaluation pipeline
#[derive(Parser, Debug)]
#[command(name = "tc", about = "TickCast direction-model training and backtesting")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model and print the run record.
    Train {
        #[command(flatten)]
        input: Input,
        /// Also export the completed run (native, json, csv).
        #[arg(long)]
        export: Option<ExportFormat>,
    },
    /// Train, then print the test-split metric bundle.
    Evaluate {
        #[command(flatten)]
        input: Input,
    },
    /// Train, then cross-validate the configuration over the dataset.
    CrossValidate {
        #[command(flatten)]
        input: Input,
    },
    /// Train, then replay the test split as a trading strategy.
    Backtest {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(Args, Debug)]
struct Input {
    /// Snapshot file (JSONL, optionally gzip-compressed) or a directory of them.
    #[arg(short, long)]
    data: PathBuf,
    /// Hyperparameters as inline JSON or a path to a JSON file.
    #[arg(long)]
    hyperparameters: Option<String>,
    /// Keep only snapshots of this symbol.
    #[arg(long)]
    symbol: Option<String>,
}

fn hyperparameter_text(arg: Option<&str>) -> anyhow::Result<String> {
    match arg {
        None => Ok("{}".to_string()),
        Some(raw) if Path::new(raw).is_file() => {
            std::fs::read_to_string(raw).with_context(|| format!("read hyperparameters from {raw}"))
        }
        Some(raw) => Ok(raw.to_string()),
    }
}

async fn train(service: &TrainingService, input: &Input) -> anyhow::Result<TrainingRun> {
    let snapshots = load_dataset(&input.data, input.symbol.as_deref())?;
    tracing::info!(path = %input.data.display(), snapshots = snapshots.len(), "snapshots loaded");
    let dataset_id = service.register_dataset(snapshots).await?;
    let hyperparameters = hyperparameter_text(input.hyperparameters.as_deref())?;
    let config_id = service.register_config("cli", &hyperparameters).await?;
    let run = service.run_to_completion(&config_id, &dataset_id).await?;
    if run.status != RunStatus::Completed {
        bail!(
            "run {} ended {}: {}",
            run.id,
            run.status,
            run.error_message.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(run)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config)?;

    tc_core::logging::init_tracing(config.logging.json);

    tracing::info!(
        checkpoints = %config.checkpoint.dir.display(),
        exports = %config.storage.export_dir.display(),
        "starting tc"
    );

    let service = TrainingService::in_memory(config);
    let report = match &cli.command {
        Command::Train { input, export } => {
            let run = train(&service, input).await?;
            let exported = match export {
                Some(format) => Some(service.export(&run.id, *format).await?),
                None => None,
            };
            json!({ "run": run, "export": exported })
        }
        Command::Evaluate { input } => {
            let run = train(&service, input).await?;
            json!({ "run_id": run.id, "evaluation": service.evaluate(&run.id).await? })
        }
        Command::CrossValidate { input } => {
            let run = train(&service, input).await?;
            json!({ "run_id": run.id, "cross_validation": service.cross_validate(&run.id).await? })
        }
        Command::Backtest { input } => {
            let run = train(&service, input).await?;
            json!({ "run_id": run.id, "backtest": service.backtest(&run.id).await? })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
