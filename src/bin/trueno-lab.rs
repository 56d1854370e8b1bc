//! trueno-lab: run an experiment batch from the command line
//!
//! ```text
//! trueno-lab run demo.yml --devices 2 --output-dir out
//! trueno-lab check demo.yml
//! ```
//!
//! Exit codes: 0 batch finished, 1 configuration or ledger error, 130 interrupted.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trueno_lab::config::{load_config, ConfigOverrides, DeviceConfig, LabConfig};
use trueno_lab::device::DeviceAllocator;
use trueno_lab::isolate::CancelFlag;
use trueno_lab::ledger::ResultsLedger;
use trueno_lab::output::BatchOutput;
use trueno_lab::report::BatchReport;
use trueno_lab::storage::ParquetLoader;
use trueno_lab::trainer::CommandTrainer;
use trueno_lab::{BatchSpec, Error, ExperimentScheduler};

const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "trueno-lab", version, about = "Sequential multi-seed experiment runner")]
struct Cli {
    /// Config file (default: ./trueno-lab.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every experiment of a batch once per configured seed pair.
    Run {
        /// Batch file, absolute or relative to `experiment_dir`
        batch: PathBuf,
        /// Use this many accelerators instead of probing
        #[arg(long)]
        devices: Option<usize>,
        /// Root of per-batch output directories
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Directory dataset file names are resolved against
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Parse a batch file and print it in resolved form.
    Check {
        /// Batch file, absolute or relative to `experiment_dir`
        batch: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            batch,
            devices,
            output_dir,
            data_dir,
        } => {
            let overrides = ConfigOverrides {
                data_dir,
                output_dir,
                devices: devices.map(|count| DeviceConfig { count: Some(count) }),
            };
            run(cli.config, &overrides, batch).await
        }
        Command::Check { batch } => check(cli.config, batch),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<Error>() {
            Some(Error::Cancelled { completed }) => {
                warn!(completed, "batch interrupted");
                ExitCode::from(EXIT_INTERRUPTED)
            }
            _ => {
                error!("{err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn load_batch(config: &LabConfig, batch: &std::path::Path) -> anyhow::Result<BatchSpec> {
    let path = config.resolve_batch_path(batch);
    BatchSpec::load(&path).with_context(|| format!("failed to load batch {}", path.display()))
}

fn check(config_file: Option<PathBuf>, batch: PathBuf) -> anyhow::Result<()> {
    let config = load_config(config_file.as_deref(), None)?;
    let batch = load_batch(&config, &batch)?;
    print!("{}", batch.to_yaml()?);
    info!(
        batch = batch.name(),
        experiments = batch.len(),
        repetitions = batch.len() * config.seeds.len(),
        "batch is valid"
    );
    Ok(())
}

async fn run(
    config_file: Option<PathBuf>,
    overrides: &ConfigOverrides,
    batch: PathBuf,
) -> anyhow::Result<()> {
    let config = load_config(config_file.as_deref(), Some(overrides))?;
    config.validate()?;
    let batch = load_batch(&config, &batch)?;

    let program = config.trainer.program.clone().ok_or_else(|| {
        Error::Config("no trainer program configured; set [trainer] program".to_string())
    })?;
    let trainer = CommandTrainer::new(program, config.trainer.args.clone());
    let loader = ParquetLoader::new()
        .index_column(config.datasets.index_column.clone())
        .require_index(config.datasets.require_index);

    let output = BatchOutput::prepare(&config.output_dir, batch.name())?;
    output.echo_spec(&batch)?;
    let ledger = ResultsLedger::create(output.results_path())?;
    info!(dir = %output.dir().display(), "writing results");

    let cancel = CancelFlag::new();
    let mut scheduler = ExperimentScheduler::builder(loader, trainer, ledger)
        .devices(DeviceAllocator::from_config(&config.devices))
        .data_dir(config.data_dir.clone())
        .cancel_flag(cancel.clone())
        .build();

    tokio::spawn(watch_interrupts(cancel));

    let seeds = config.seeds;
    let (report, result) = tokio::task::spawn_blocking(move || {
        let mut report = BatchReport::new(batch.name(), batch.len() * seeds.len());
        let result = scheduler.run_with_report(&batch, &seeds, &mut report);
        (report, result)
    })
    .await?;

    output.write_report(&report)?;
    info!(
        path = %output.report_path().display(),
        logged = report.rows_logged(),
        failed = report.failures().len(),
        "report written"
    );
    result?;
    Ok(())
}

/// First Ctrl-C raises the cancel flag, a second one exits immediately.
async fn watch_interrupts(cancel: CancelFlag) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("interrupt received; stopping after the current repetition (Ctrl-C again to abort)");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("second interrupt; aborting");
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    }
}
