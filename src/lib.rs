//! # Trueno-Lab: Sequential Experiment Orchestration
//!
//! **Version**: 0.1.0
//!
//! Trueno-Lab runs a batch of machine-learning experiments, each repeated once
//! per configured seed pair, spreads the repetitions round-robin over the
//! available accelerators, and appends one row per completed repetition to a
//! durable results ledger. A failing repetition is recorded and skipped; it
//! never aborts the batch.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: consecutive experiments over the same data share one load
//! - **Heijunka**: repetitions rotate across accelerators by a batch-wide counter
//! - **Jidoka**: faults are isolated per repetition and logged with their full trace
//! - **Poka-Yoke**: every ledger row is synced before the next repetition starts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_lab::batch::{BatchSpec, SeedPair};
//! use trueno_lab::device::{DeviceAllocator, VisibleDevicesProbe};
//! use trueno_lab::ledger::ResultsLedger;
//! use trueno_lab::scheduler::ExperimentScheduler;
//! use trueno_lab::storage::ParquetLoader;
//! use trueno_lab::trainer::CommandTrainer;
//!
//! let batch = BatchSpec::load("experiments/demo.yml")?;
//! let ledger = ResultsLedger::create("output/demo/results.csv")?;
//! let trainer = CommandTrainer::new("python3", vec!["train.py".to_string()]);
//!
//! let mut scheduler = ExperimentScheduler::builder(ParquetLoader::new(), trainer, ledger)
//!     .devices(DeviceAllocator::detect(&VisibleDevicesProbe))
//!     .data_dir("data")
//!     .build();
//!
//! let report = scheduler.run(&batch, &[SeedPair::new(1, 100), SeedPair::new(2, 200)])?;
//! println!("{} row(s) logged, {} failure(s)", report.rows_logged(), report.failures().len());
//! # Ok::<(), trueno_lab::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod batch;
pub mod config;
pub mod device;
pub mod error;
pub mod isolate;
pub mod ledger;
pub mod output;
pub mod report;
pub mod scheduler;
pub mod storage;
pub mod trainer;

pub use batch::{BatchSpec, ExperimentSpec, SeedPair};
pub use error::{Error, Result};
pub use scheduler::ExperimentScheduler;
