//! Error types for Trueno-Lab
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Scope of each variant:
//! - [`Error::DataLoad`] is fatal to one experiment; the scheduler records it and moves on.
//! - [`Error::Cancelled`] is fatal to the whole batch and is never recovered.
//! - Ledger and I/O errors abort the batch because row durability can no longer be promised.
//!
//! Trainer faults are not represented here: the trainer is an opaque collaborator
//! returning `anyhow::Error`, and those errors never escape the failure isolator.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Lab error types
#[derive(Error, Debug)]
pub enum Error {
    /// Dataset source missing or not deserializable
    #[error("Failed to load dataset {source_id}: {reason}")]
    DataLoad {
        /// Identifier of the dataset that failed to load
        source_id: String,
        /// Underlying cause
        reason: String,
    },

    /// Batch specification rejected (duplicate names, missing keys)
    #[error("Invalid batch specification: {0}")]
    InvalidBatch(String),

    /// Configuration could not be assembled or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Results ledger misuse (e.g. row appended before header)
    #[error("Results ledger error: {0}")]
    Ledger(String),

    /// Operator interrupt: the batch stopped before completing
    #[error("Batch cancelled by operator after {completed} completed repetition(s)")]
    Cancelled {
        /// Repetitions fully processed before the interrupt
        completed: usize,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a [`Error::DataLoad`] for the given dataset identifier.
    pub fn data_load(source_id: impl ToString, reason: impl ToString) -> Self {
        Self::DataLoad {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is the operator cancellation signal.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<Box<figment::Error>> for Error {
    fn from(err: Box<figment::Error>) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
