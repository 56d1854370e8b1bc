//! Dataset storage (Arrow/Parquet)
//!
//! Datasets are loaded whole into memory as Arrow record batches. Loading is
//! the expensive step the [`DatasetCache`] exists to avoid repeating, so
//! everything here is synchronous and read-only once loaded.
//!
//! Toyota Way Principles:
//! - Muda elimination: a dataset shared by consecutive experiments is read once
//! - Poka-Yoke: the index column is validated at load time, not mid-training

mod cache;

pub use cache::{CacheStats, DatasetCache};

use crate::{Error, Result};
use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default name of the column holding the dataset's row index.
pub const DEFAULT_INDEX_COLUMN: &str = "index";

/// Identity of a dataset source: its resolved path.
///
/// Two experiments share a cached dataset exactly when their identifiers compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetId(PathBuf);

impl DatasetId {
    /// Wrap an already-resolved path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Resolve a batch-relative file name against the data directory.
    #[must_use]
    pub fn resolve(data_dir: &Path, file: &str) -> Self {
        Self(data_dir.join(file))
    }

    /// Path of the dataset source.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// An in-memory dataset: an index column plus feature/label columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: DatasetId,
    batches: Vec<RecordBatch>,
    index_column: Option<usize>,
}

impl Dataset {
    /// Create a dataset from record batches.
    ///
    /// `index_column` is the position of the index column in the batches' schema, if any.
    #[must_use]
    pub fn new(id: DatasetId, batches: Vec<RecordBatch>, index_column: Option<usize>) -> Self {
        Self {
            id,
            batches,
            index_column,
        }
    }

    /// Create a dataset with no rows (useful for trainers that ignore data).
    #[must_use]
    pub fn empty(id: DatasetId) -> Self {
        Self::new(id, Vec::new(), None)
    }

    /// Source identifier.
    #[must_use]
    pub const fn id(&self) -> &DatasetId {
        &self.id
    }

    /// All record batches.
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Schema shared by all batches, if any were loaded.
    #[must_use]
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }

    /// Total number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Index column chunks, one per batch, in row order.
    pub fn index(&self) -> impl Iterator<Item = &ArrayRef> + '_ {
        self.index_column
            .into_iter()
            .flat_map(move |i| self.batches.iter().map(move |b| b.column(i)))
    }
}

/// Source of datasets for the cache.
pub trait DatasetLoader {
    /// Load the dataset identified by `id`.
    ///
    /// # Errors
    /// Returns [`Error::DataLoad`] if the source cannot be read or deserialized
    fn load(&mut self, id: &DatasetId) -> Result<Dataset>;
}

impl<F> DatasetLoader for F
where
    F: FnMut(&DatasetId) -> Result<Dataset>,
{
    fn load(&mut self, id: &DatasetId) -> Result<Dataset> {
        self(id)
    }
}

/// Loads datasets from Parquet files.
#[derive(Debug, Clone)]
pub struct ParquetLoader {
    index_column: String,
    require_index: bool,
}

impl Default for ParquetLoader {
    fn default() -> Self {
        Self {
            index_column: DEFAULT_INDEX_COLUMN.to_string(),
            require_index: false,
        }
    }
}

impl ParquetLoader {
    /// Loader using the default `index` column, which may be absent.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different index column name.
    #[must_use]
    pub fn index_column(mut self, name: impl Into<String>) -> Self {
        self.index_column = name.into();
        self
    }

    /// Fail the load when the index column is missing.
    #[must_use]
    pub const fn require_index(mut self, require: bool) -> Self {
        self.require_index = require;
        self
    }

    fn read(&self, id: &DatasetId) -> std::result::Result<Dataset, String> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(id.path()).map_err(|e| format!("Failed to open Parquet file: {e}"))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| format!("Failed to parse Parquet file: {e}"))?;

        let index_column = builder.schema().index_of(&self.index_column).ok();
        if index_column.is_none() && self.require_index {
            return Err(format!("missing index column '{}'", self.index_column));
        }

        let reader = builder
            .build()
            .map_err(|e| format!("Failed to create Parquet reader: {e}"))?;

        // Read all batches into memory
        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to read record batch: {e}"))?;

        Ok(Dataset::new(id.clone(), batches, index_column))
    }
}

impl DatasetLoader for ParquetLoader {
    fn load(&mut self, id: &DatasetId) -> Result<Dataset> {
        self.read(id).map_err(|reason| Error::data_load(id, reason))
    }
}
