//! Batch scheduler
//!
//! Walks a batch in order: every experiment, and for each experiment every
//! seed pair, strictly sequentially. Per experiment:
//!
//! ```text
//! Pending -> DataLoading -> Ready -> (repetitions) -> Done
//!                        \-> DataLoadFailed
//! ```
//!
//! Per repetition: `Queued -> Running -> Logged | Failed | Cancelled`
//! (see [`RunStatus`]).
//!
//! Toyota Way Principles:
//! - Jidoka: a fault stops only the repetition (or experiment) that raised it
//! - Genchi Genbutsu: every completed row is on disk before the next run starts

use crate::batch::{BatchSpec, ExperimentSpec, SeedPair};
use crate::device::DeviceAllocator;
use crate::isolate::{CancelFlag, FailureDetail, FailureIsolator, RunOutcome};
use crate::ledger::{ResultRow, ResultsLedger};
use crate::report::{BatchReport, FailureKind, FailureRecord, RunRecord, RunStatus};
use crate::storage::{DatasetCache, DatasetId, DatasetLoader};
use crate::trainer::{RunContext, Trainer};
use crate::{Error, Result};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Lifecycle of one experiment within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    /// Not reached yet
    Pending,
    /// Waiting on the dataset cache
    DataLoading,
    /// Datasets available; repetitions running
    Ready,
    /// Train or test data could not be loaded; no repetitions attempted
    DataLoadFailed,
    /// Every repetition reached a terminal status
    Done,
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::DataLoading => "data-loading",
            Self::Ready => "ready",
            Self::DataLoadFailed => "data-load-failed",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Sequential experiment runner.
///
/// One scheduler drives one batch: the ledger header latch and the
/// repetition counter both live for the scheduler's lifetime.
pub struct ExperimentScheduler<L, T> {
    cache: DatasetCache<L>,
    devices: DeviceAllocator,
    ledger: ResultsLedger,
    isolator: FailureIsolator,
    trainer: T,
    data_dir: PathBuf,
    global_index: usize,
}

impl<L, T> fmt::Debug for ExperimentScheduler<L, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentScheduler")
            .field("devices", &self.devices)
            .field("ledger", &self.ledger)
            .field("data_dir", &self.data_dir)
            .field("global_index", &self.global_index)
            .finish_non_exhaustive()
    }
}

impl<L: DatasetLoader, T: Trainer> ExperimentScheduler<L, T> {
    /// Create a scheduler builder.
    #[must_use]
    pub fn builder(loader: L, trainer: T, ledger: ResultsLedger) -> SchedulerBuilder<L, T> {
        SchedulerBuilder {
            loader,
            trainer,
            ledger,
            devices: DeviceAllocator::from_devices(Vec::new()),
            data_dir: PathBuf::new(),
            cancel: CancelFlag::new(),
        }
    }

    /// Run every experiment of `batch` once per seed pair.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if the cancellation flag is raised
    /// - [`Error::Ledger`] or IO errors if a completed row cannot be persisted
    ///
    /// Trainer faults and data-load failures are not errors; they are
    /// recorded in the returned [`BatchReport`].
    pub fn run(&mut self, batch: &BatchSpec, seeds: &[SeedPair]) -> Result<BatchReport> {
        let mut report = BatchReport::new(batch.name(), batch.len() * seeds.len());
        self.run_with_report(batch, seeds, &mut report)?;
        Ok(report)
    }

    /// Like [`Self::run`], recording into a caller-owned report so partial
    /// results survive cancellation.
    ///
    /// # Errors
    /// Same as [`Self::run`]
    pub fn run_with_report(
        &mut self,
        batch: &BatchSpec,
        seeds: &[SeedPair],
        report: &mut BatchReport,
    ) -> Result<()> {
        info!(
            batch = batch.name(),
            experiments = batch.len(),
            seeds = seeds.len(),
            devices = self.devices.device_count(),
            "starting batch"
        );

        for spec in batch.experiments() {
            if self.isolator.cancel_flag().is_cancelled() {
                return Err(Self::cancelled(report));
            }
            self.run_experiment(batch.name(), spec, seeds, report)?;
        }

        let progress = report.progress();
        info!(
            batch = batch.name(),
            logged = report.rows_logged(),
            failed = report.failures().len(),
            completed = progress.completed,
            total = progress.total,
            "batch finished"
        );
        Ok(())
    }

    fn run_experiment(
        &mut self,
        batch: &str,
        spec: &ExperimentSpec,
        seeds: &[SeedPair],
        report: &mut BatchReport,
    ) -> Result<()> {
        info!(experiment = spec.name(), "starting experiment");
        transition(spec, ExperimentState::Pending, ExperimentState::DataLoading);

        let train_id = DatasetId::resolve(&self.data_dir, spec.train_data_file());
        let test_id = DatasetId::resolve(&self.data_dir, spec.test_data_file());
        let (train, test) = match self.cache.ensure_loaded(&train_id, &test_id) {
            Ok(pair) => pair,
            Err(err) if err.is_cancelled() => return Err(Self::cancelled(report)),
            Err(err) => {
                transition(spec, ExperimentState::DataLoading, ExperimentState::DataLoadFailed);
                warn!(experiment = spec.name(), error = %err, "skipping experiment");
                let detail = FailureDetail {
                    message: err.to_string(),
                    trace: format!("{err:?}"),
                };
                report.add_failure(FailureRecord::new(
                    spec.name(),
                    None,
                    FailureKind::DataLoad,
                    detail,
                ));
                let progress = report.advance(seeds.len());
                info!(completed = progress.completed, total = progress.total, "progress");
                return Ok(());
            }
        };
        transition(spec, ExperimentState::DataLoading, ExperimentState::Ready);

        let specification = spec.to_json()?;
        for (repetition, &seed_pair) in seeds.iter().enumerate() {
            let global_index = self.global_index;
            self.global_index += 1;
            let device = self.devices.assign(global_index);

            let mut record =
                RunRecord::new(spec.name(), repetition, global_index, device, seed_pair);
            record.start();
            info!(
                experiment = spec.name(),
                rep = repetition,
                device = %device,
                primary_seed = seed_pair.primary_seed,
                auxiliary_seed = seed_pair.auxiliary_seed,
                "running repetition"
            );

            let ctx = RunContext {
                spec,
                train: &train,
                test: &test,
                seeds: seed_pair,
                device,
                repetition,
                global_index,
                cancel: self.isolator.cancel_flag(),
            };
            let label = format!("{}/rep{repetition}", spec.name());
            let trainer = &mut self.trainer;
            let Ok(outcome) = self.isolator.guard(&label, || trainer.train(&ctx)) else {
                record.complete(RunStatus::Cancelled);
                report.add_run(record);
                return Err(Self::cancelled(report));
            };

            match outcome {
                RunOutcome::Success(output) => {
                    self.ledger.write_header_once(&output.headers)?;
                    self.ledger.append_row(&ResultRow {
                        batch: batch.to_string(),
                        experiment: spec.name().to_string(),
                        repetition,
                        specification: specification.clone(),
                        values: output.values,
                    })?;
                    record.complete(RunStatus::Logged);
                }
                RunOutcome::Failure(detail) => {
                    record.complete(RunStatus::Failed);
                    report.add_failure(FailureRecord::new(
                        spec.name(),
                        Some(repetition),
                        FailureKind::Trainer,
                        detail,
                    ));
                }
            }
            debug!(run = %label, status = ?record.status(), "repetition finished");
            report.add_run(record);

            let progress = report.advance(1);
            info!(completed = progress.completed, total = progress.total, "progress");
        }

        transition(spec, ExperimentState::Ready, ExperimentState::Done);
        Ok(())
    }

    fn cancelled(report: &BatchReport) -> Error {
        let completed = report.progress().completed;
        warn!(completed, "batch cancelled");
        Error::Cancelled { completed }
    }

    /// Dataset cache (for load statistics).
    #[must_use]
    pub const fn cache(&self) -> &DatasetCache<L> {
        &self.cache
    }

    /// Results ledger.
    #[must_use]
    pub const fn ledger(&self) -> &ResultsLedger {
        &self.ledger
    }

    /// Device allocator.
    #[must_use]
    pub const fn devices(&self) -> &DeviceAllocator {
        &self.devices
    }

    /// Trainer.
    #[must_use]
    pub const fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Number of repetitions attempted so far (the next global index).
    #[must_use]
    pub const fn global_index(&self) -> usize {
        self.global_index
    }
}

fn transition(spec: &ExperimentSpec, from: ExperimentState, to: ExperimentState) {
    debug!(experiment = spec.name(), %from, %to, "experiment state");
}

/// Scheduler builder
pub struct SchedulerBuilder<L, T> {
    loader: L,
    trainer: T,
    ledger: ResultsLedger,
    devices: DeviceAllocator,
    data_dir: PathBuf,
    cancel: CancelFlag,
}

impl<L: DatasetLoader, T: Trainer> SchedulerBuilder<L, T> {
    /// Set the device allocator (default: no accelerators)
    #[must_use]
    pub fn devices(mut self, devices: DeviceAllocator) -> Self {
        self.devices = devices;
        self
    }

    /// Set the directory dataset file names are resolved against
    #[must_use]
    pub fn data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Set the cancellation flag observed between and during repetitions
    #[must_use]
    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the scheduler
    #[must_use]
    pub fn build(self) -> ExperimentScheduler<L, T> {
        ExperimentScheduler {
            cache: DatasetCache::new(self.loader),
            devices: self.devices,
            ledger: self.ledger,
            isolator: FailureIsolator::new(self.cancel),
            trainer: self.trainer,
            data_dir: self.data_dir,
            global_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FixedProbe;
    use crate::storage::Dataset;
    use crate::trainer::TrainOutput;
    use anyhow::bail;

    fn empty_loader(id: &DatasetId) -> Result<Dataset> {
        Ok(Dataset::empty(id.clone()))
    }

    fn batch(names: &[&str]) -> BatchSpec {
        let experiments = names
            .iter()
            .map(|n| ExperimentSpec::new(*n, "train.parquet", "test.parquet"))
            .collect();
        BatchSpec::new("unit", experiments).unwrap()
    }

    fn seeds(n: u64) -> Vec<SeedPair> {
        (0..n).map(|i| SeedPair::new(i, i + 100)).collect()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ExperimentState::DataLoadFailed.to_string(), "data-load-failed");
        assert_eq!(ExperimentState::Done.to_string(), "done");
    }

    #[allow(clippy::cast_precision_loss)]
    fn slot_trainer(ctx: &RunContext<'_>) -> anyhow::Result<TrainOutput> {
        let slot = ctx.device.ordinal().unwrap_or(usize::MAX);
        Ok(TrainOutput::new(vec!["slot".to_string()], vec![slot as f64]))
    }

    fn first_rep_fails(ctx: &RunContext<'_>) -> anyhow::Result<TrainOutput> {
        if ctx.repetition == 0 {
            bail!("diverged");
        }
        Ok(TrainOutput::new(vec!["acc".to_string()], vec![1.0]))
    }

    fn never_called(_: &RunContext<'_>) -> anyhow::Result<TrainOutput> {
        bail!("never called")
    }

    #[test]
    fn test_devices_rotate_across_experiments() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
        let mut scheduler = ExperimentScheduler::builder(empty_loader, slot_trainer, ledger)
            .devices(DeviceAllocator::detect(&FixedProbe(2)))
            .build();

        let report = scheduler.run(&batch(&["a", "b"]), &seeds(3)).unwrap();
        let slots: Vec<_> = report.runs().iter().map(|r| r.device().ordinal()).collect();
        assert_eq!(
            slots,
            vec![Some(0), Some(1), Some(0), Some(1), Some(0), Some(1)]
        );
        assert_eq!(scheduler.global_index(), 6);
    }

    #[test]
    fn test_failure_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
        let mut scheduler =
            ExperimentScheduler::builder(empty_loader, first_rep_fails, ledger).build();

        let report = scheduler.run(&batch(&["a"]), &seeds(2)).unwrap();
        assert_eq!(report.rows_logged(), 1);
        assert_eq!(report.failure_count(FailureKind::Trainer), 1);
        assert_eq!(report.failures()[0].repetition, Some(0));
        assert_eq!(scheduler.ledger().rows_written(), 1);
    }

    #[test]
    fn test_empty_seed_list_attempts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
        let mut scheduler =
            ExperimentScheduler::builder(empty_loader, never_called, ledger).build();

        let report = scheduler.run(&batch(&["a", "b"]), &[]).unwrap();
        assert_eq!(report.attempted(), 0);
        assert!(!scheduler.ledger().header_written());
    }
}
