//! Trainer seam
//!
//! The scheduler knows nothing about models. It hands a [`RunContext`] to a
//! [`Trainer`] and gets back metric names and values. Seeding internal
//! randomness from the context's [`SeedPair`] and scoping computation to its
//! [`DeviceSlot`] are the trainer's responsibility.

mod command;

pub use command::CommandTrainer;

use crate::batch::{ExperimentSpec, SeedPair};
use crate::device::DeviceSlot;
use crate::isolate::CancelFlag;
use crate::storage::Dataset;
use serde::{Deserialize, Serialize};

/// Tabular result of one repetition: metric names and their values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOutput {
    /// Metric names, in column order
    pub headers: Vec<String>,
    /// Metric values, same order as `headers`
    pub values: Vec<f64>,
}

impl TrainOutput {
    /// Create an output from parallel name/value lists.
    #[must_use]
    pub const fn new(headers: Vec<String>, values: Vec<f64>) -> Self {
        Self { headers, values }
    }
}

/// Everything a trainer receives for one repetition.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Experiment being run
    pub spec: &'a ExperimentSpec,
    /// Cached train dataset
    pub train: &'a Dataset,
    /// Cached test dataset
    pub test: &'a Dataset,
    /// Seeds for this repetition
    pub seeds: SeedPair,
    /// Device this repetition is placed on
    pub device: DeviceSlot,
    /// Repetition index within the experiment
    pub repetition: usize,
    /// Batch-wide repetition counter
    pub global_index: usize,
    /// Interrupt flag; long-running trainers may poll it
    pub cancel: &'a CancelFlag,
}

/// External model construction and fit/evaluate.
pub trait Trainer {
    /// Build, fit and evaluate one model.
    ///
    /// # Errors
    /// Any error fails this repetition only, unless it is [`crate::isolate::Cancelled`]
    fn train(&mut self, ctx: &RunContext<'_>) -> anyhow::Result<TrainOutput>;
}

impl<F> Trainer for F
where
    F: FnMut(&RunContext<'_>) -> anyhow::Result<TrainOutput>,
{
    fn train(&mut self, ctx: &RunContext<'_>) -> anyhow::Result<TrainOutput> {
        self(ctx)
    }
}
