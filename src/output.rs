//! Per-batch output directory
//!
//! ```text
//! <output_dir>/<batch>/
//!   experiment.yml   resolved batch, written once at start
//!   results.csv      results ledger
//!   report.json      run report, written when the batch completes
//! ```

use crate::batch::BatchSpec;
use crate::report::BatchReport;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Ledger file name.
pub const RESULTS_FILE: &str = "results.csv";
/// Echoed specification file name.
pub const SPEC_FILE: &str = "experiment.yml";
/// Report file name.
pub const REPORT_FILE: &str = "report.json";

/// Paths of one batch's outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    dir: PathBuf,
}

impl BatchOutput {
    /// Create `<output_root>/<batch_name>` if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    pub fn prepare(output_root: &Path, batch_name: &str) -> Result<Self> {
        let dir = output_root.join(batch_name);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Batch output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the results ledger.
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    /// Path of the echoed specification.
    #[must_use]
    pub fn spec_path(&self) -> PathBuf {
        self.dir.join(SPEC_FILE)
    }

    /// Path of the run report.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.dir.join(REPORT_FILE)
    }

    /// Write the resolved batch for provenance.
    ///
    /// # Errors
    /// Returns error if the batch cannot be serialized or written
    pub fn echo_spec(&self, batch: &BatchSpec) -> Result<()> {
        fs::write(self.spec_path(), batch.to_yaml()?)?;
        Ok(())
    }

    /// Write the run report as pretty JSON.
    ///
    /// # Errors
    /// Returns error if the report cannot be serialized or written
    pub fn write_report(&self, report: &BatchReport) -> Result<()> {
        fs::write(self.report_path(), serde_json::to_string_pretty(report)?)?;
        Ok(())
    }
}
