//! Per-repetition fault isolation
//!
//! Every repetition runs inside [`FailureIsolator::guard`]. Ordinary faults,
//! returned errors and panics alike, become [`RunOutcome::Failure`] and the
//! batch carries on. Operator cancellation is a different channel: it is never
//! converted into an outcome and unwinds the batch as `Err(Cancelled)`.

use crate::trainer::TrainOutput;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;

/// Operator-initiated interrupt.
///
/// Trainers may return this (through `anyhow`) to abort the batch; the
/// isolator never turns it into a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cancelled by operator")
    }
}

impl std::error::Error for Cancelled {}

/// Shared interrupt flag, raised by a signal handler and polled by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    raised: Arc<AtomicBool>,
}

impl CancelFlag {
    /// A flag that has not been raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn cancel(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is raised.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if the flag has been raised
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Diagnostic detail of a captured fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Top-level message
    pub message: String,
    /// Full causal trace (error chain, plus backtrace when captured)
    pub trace: String,
}

impl FailureDetail {
    /// Capture an error's message and full `Debug` rendering.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            trace: format!("{err:?}"),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self {
            trace: format!("panicked: {message}"),
            message,
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.trace)
    }
}

/// Result of one guarded repetition.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Trainer completed and reported metrics
    Success(TrainOutput),
    /// Trainer or data fault, captured
    Failure(FailureDetail),
}

impl RunOutcome {
    /// Whether the repetition succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Wraps repetitions so faults stay local to the repetition that raised them.
#[derive(Debug, Clone, Default)]
pub struct FailureIsolator {
    cancel: CancelFlag,
}

impl FailureIsolator {
    /// Isolator observing the given cancellation flag.
    #[must_use]
    pub const fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    /// The cancellation flag this isolator observes.
    #[must_use]
    pub const fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run `work`, converting faults into [`RunOutcome::Failure`].
    ///
    /// `label` names the repetition in the failure log.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if the flag was raised before or during `work`, or if
    /// `work` itself reported cancellation. Any result of `work` is discarded then.
    pub fn guard<F>(&self, label: &str, work: F) -> Result<RunOutcome, Cancelled>
    where
        F: FnOnce() -> anyhow::Result<TrainOutput>,
    {
        self.cancel.check()?;

        let result = panic::catch_unwind(AssertUnwindSafe(work));
        self.cancel.check()?;

        let detail = match result {
            Ok(Ok(output)) => return Ok(RunOutcome::Success(output)),
            Ok(Err(err)) if err.downcast_ref::<Cancelled>().is_some() => return Err(Cancelled),
            Ok(Err(err)) => FailureDetail::from_error(&err),
            Err(payload) => FailureDetail::from_panic(payload.as_ref()),
        };

        error!(run = label, error = %detail.message, "run failed\n{}", detail.trace);
        Ok(RunOutcome::Failure(detail))
    }
}
