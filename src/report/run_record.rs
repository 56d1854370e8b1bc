//! Run Record - one attempted repetition

use crate::batch::SeedPair;
use crate::device::DeviceSlot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Scheduled, not yet handed to the trainer.
    Queued,
    /// Trainer is executing.
    Running,
    /// Completed and written to the ledger.
    Logged,
    /// Trainer fault captured; no ledger row.
    Failed,
    /// Interrupted by the operator; no ledger row.
    Cancelled,
}

impl RunStatus {
    /// Whether the status is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Logged | Self::Failed | Self::Cancelled)
    }
}

/// Run Record represents a single repetition of an experiment.
///
/// Tracks placement, seeds and the execution lifecycle from queueing to completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    experiment: String,
    repetition: usize,
    global_index: usize,
    device: DeviceSlot,
    seeds: SeedPair,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a new run record in Queued status.
    ///
    /// # Arguments
    ///
    /// * `experiment` - Name of the parent experiment
    /// * `repetition` - Index of the seed pair within the experiment
    /// * `global_index` - Batch-wide repetition counter used for placement
    /// * `device` - Assigned device slot
    /// * `seeds` - Seed pair for this repetition
    #[must_use]
    pub fn new(
        experiment: impl Into<String>,
        repetition: usize,
        global_index: usize,
        device: DeviceSlot,
        seeds: SeedPair,
    ) -> Self {
        Self {
            experiment: experiment.into(),
            repetition,
            global_index,
            device,
            seeds,
            status: RunStatus::Queued,
            started_at: None,
            ended_at: None,
        }
    }

    /// Get the parent experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the repetition index within the experiment.
    #[must_use]
    pub const fn repetition(&self) -> usize {
        self.repetition
    }

    /// Get the batch-wide repetition index.
    #[must_use]
    pub const fn global_index(&self) -> usize {
        self.global_index
    }

    /// Get the assigned device slot.
    #[must_use]
    pub const fn device(&self) -> DeviceSlot {
        self.device
    }

    /// Get the seed pair.
    #[must_use]
    pub const fn seeds(&self) -> SeedPair {
        self.seeds
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Start the run, transitioning from Queued to Running.
    ///
    /// Sets the `started_at` timestamp to now.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Complete the run with the given final status.
    ///
    /// Sets the `ended_at` timestamp to now.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> RunRecord {
        RunRecord::new("exp", 1, 4, DeviceSlot::Accelerator(0), SeedPair::new(7, 8))
    }

    #[test]
    fn test_run_status_default() {
        let run = record();
        assert_eq!(run.status(), RunStatus::Queued);
        assert!(!run.status().is_terminal());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = record();
        run.start();
        assert_eq!(run.status(), RunStatus::Running);
        assert!(run.started_at().is_some());
        run.complete(RunStatus::Logged);
        assert_eq!(run.status(), RunStatus::Logged);
        assert!(run.status().is_terminal());
        assert!(run.ended_at().unwrap() >= run.started_at().unwrap());
    }
}
