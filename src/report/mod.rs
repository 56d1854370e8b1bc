//! Batch report: what happened to every repetition
//!
//! The ledger only records successes, so a failed repetition shows up there as
//! a missing row. The report keeps the full picture in memory for the caller.
//!
//! ## Invariant
//!
//! ```text
//! rows_logged() + trainer failures == attempted repetitions
//! ```
//!
//! Data-load failures are recorded once per experiment and its repetitions are
//! never attempted, so they are outside that sum.

mod run_record;

pub use run_record::{RunRecord, RunStatus};

use crate::isolate::FailureDetail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which stage failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Train or test data could not be loaded; whole experiment skipped
    DataLoad,
    /// Trainer fault in one repetition
    Trainer,
}

/// A captured failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Experiment name
    pub experiment: String,
    /// Repetition index; `None` for experiment-wide failures
    pub repetition: Option<usize>,
    /// Failing stage
    pub kind: FailureKind,
    /// Diagnostic detail
    pub detail: FailureDetail,
    /// When the failure was recorded
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    /// Record a failure now.
    #[must_use]
    pub fn new(
        experiment: impl Into<String>,
        repetition: Option<usize>,
        kind: FailureKind,
        detail: FailureDetail,
    ) -> Self {
        Self {
            experiment: experiment.into(),
            repetition,
            kind,
            detail,
            recorded_at: Utc::now(),
        }
    }
}

/// Progress over `experiments x seeds` units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Units processed (logged, failed, or skipped by a data-load failure)
    pub completed: usize,
    /// Total units in the batch
    pub total: usize,
}

impl Progress {
    /// Fraction complete in `[0, 1]`; an empty batch counts as complete.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    batch: String,
    runs: Vec<RunRecord>,
    failures: Vec<FailureRecord>,
    progress: Progress,
}

impl BatchReport {
    /// Create an empty report for `total` units of work.
    #[must_use]
    pub fn new(batch: impl Into<String>, total: usize) -> Self {
        Self {
            batch: batch.into(),
            runs: Vec::new(),
            failures: Vec::new(),
            progress: Progress {
                completed: 0,
                total,
            },
        }
    }

    /// Batch name.
    #[must_use]
    pub fn batch(&self) -> &str {
        &self.batch
    }

    /// Check if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.failures.is_empty()
    }

    /// Add an attempted repetition.
    pub fn add_run(&mut self, run: RunRecord) {
        self.runs.push(run);
    }

    /// Add a failure.
    pub fn add_failure(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    /// Mark `units` more units as processed and return the new progress.
    pub fn advance(&mut self, units: usize) -> Progress {
        self.progress.completed += units;
        self.progress
    }

    /// All attempted repetitions, in execution order.
    #[must_use]
    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    /// All failures, in the order they occurred.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Current progress.
    #[must_use]
    pub const fn progress(&self) -> Progress {
        self.progress
    }

    /// Number of attempted repetitions.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.runs.len()
    }

    /// Number of repetitions written to the ledger.
    #[must_use]
    pub fn rows_logged(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.status() == RunStatus::Logged)
            .count()
    }

    /// Number of failures of the given kind.
    #[must_use]
    pub fn failure_count(&self, kind: FailureKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }

    /// Runs of one experiment, ordered by repetition.
    #[must_use]
    pub fn runs_for_experiment(&self, experiment: &str) -> Vec<&RunRecord> {
        let mut runs: Vec<&RunRecord> = self
            .runs
            .iter()
            .filter(|r| r.experiment() == experiment)
            .collect();
        runs.sort_by_key(|r| r.repetition());
        runs
    }
}
