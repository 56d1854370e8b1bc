//! Append-only results ledger
//!
//! **Write pattern**: one line per completed repetition, appended and synced
//! before `append_row` returns. The file is opened and closed on every write,
//! so a crash right after a row is written loses nothing already appended.
//!
//! Layout:
//!
//! ```text
//! file,experiment,rep,specifications,<metric names...>
//! demo,baseline,0,{"train_data_file":"train.parquet";"lr":0.1},0.91,0.35
//! ```
//!
//! Text columns (names and specification) have `,` replaced by `;` to keep one
//! row per line.
//! This is lossy and is not general CSV quoting.

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fixed leading ledger columns.
pub const FIXED_COLUMNS: [&str; 4] = ["file", "experiment", "rep", "specifications"];

/// One successfully completed repetition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// Batch name
    pub batch: String,
    /// Experiment name
    pub experiment: String,
    /// Repetition index within the experiment
    pub repetition: usize,
    /// Serialized experiment specification
    pub specification: String,
    /// Trainer-reported values, in header order
    pub values: Vec<f64>,
}

impl ResultRow {
    /// Render the row as a ledger line (without trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut fields = vec![
            escape_field(&self.batch),
            escape_field(&self.experiment),
            self.repetition.to_string(),
            escape_field(&self.specification),
        ];
        fields.extend(self.values.iter().map(f64::to_string));
        fields.join(",")
    }
}

/// Replace separators so a text field stays inside one column.
#[must_use]
pub fn escape_field(text: &str) -> String {
    text.replace(',', ";")
}

/// Render the header line for the given metric names.
#[must_use]
pub fn header_line(metrics: &[String]) -> String {
    FIXED_COLUMNS
        .iter()
        .copied()
        .chain(metrics.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(",")
}

/// Append-only, header-once results log.
#[derive(Debug)]
pub struct ResultsLedger {
    path: PathBuf,
    header_written: bool,
    metric_count: Option<usize>,
    rows: usize,
}

impl ResultsLedger {
    /// Create (or truncate) the ledger file for a new batch.
    ///
    /// # Errors
    /// Returns error if the file cannot be created
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        File::create(&path)?;
        Ok(Self {
            path,
            header_written: false,
            metric_count: None,
            rows: 0,
        })
    }

    /// Write the header line on the first call; later calls do nothing.
    ///
    /// # Errors
    /// Returns error if the header cannot be appended
    pub fn write_header_once(&mut self, metrics: &[String]) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.append_line(&header_line(metrics))?;
        self.header_written = true;
        self.metric_count = Some(metrics.len());
        debug!(path = %self.path.display(), "ledger header written");
        Ok(())
    }

    /// Append one row and sync it to disk before returning.
    ///
    /// # Errors
    /// Returns [`Error::Ledger`] if no header has been written yet, or an IO error
    pub fn append_row(&mut self, row: &ResultRow) -> Result<()> {
        let Some(expected) = self.metric_count else {
            return Err(Error::Ledger(
                "row appended before header was written".to_string(),
            ));
        };
        if row.values.len() != expected {
            warn!(
                experiment = %row.experiment,
                rep = row.repetition,
                expected,
                got = row.values.len(),
                "result row width differs from ledger header"
            );
        }
        self.append_line(&row.to_line())?;
        self.rows += 1;
        Ok(())
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the header has been written.
    #[must_use]
    pub const fn header_written(&self) -> bool {
        self.header_written
    }

    /// Rows appended by this ledger instance.
    #[must_use]
    pub const fn rows_written(&self) -> usize {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rep: usize, spec: &str) -> ResultRow {
        ResultRow {
            batch: "demo".to_string(),
            experiment: "baseline".to_string(),
            repetition: rep,
            specification: spec.to_string(),
            values: vec![0.5, 2.0],
        }
    }

    fn metrics() -> Vec<String> {
        vec!["accuracy".to_string(), "loss".to_string()]
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();

        ledger.write_header_once(&metrics()).unwrap();
        ledger.write_header_once(&["other".to_string()]).unwrap();
        ledger.append_row(&row(0, "{}")).unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec!["file,experiment,rep,specifications,accuracy,loss", "demo,baseline,0,{},0.5,2"]
        );
    }

    #[test]
    fn test_specification_commas_escaped() {
        let line = row(1, r#"{"a":1,"b":[1,2]}"#).to_line();
        assert_eq!(line, r#"demo,baseline,1,{"a":1;"b":[1;2]},0.5,2"#);
        assert_eq!(line.split(',').count(), 6);
    }

    #[test]
    fn test_names_with_commas_keep_columns() {
        let mut r = row(0, "{}");
        r.batch = "sweep,v2".to_string();
        r.experiment = "lr=0.1,wd=0".to_string();
        let line = r.to_line();
        assert_eq!(line, "sweep;v2,lr=0.1;wd=0,0,{},0.5,2");
        assert_eq!(line.split(',').count(), 6);
    }

    #[test]
    fn test_row_before_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
        let err = ledger.append_row(&row(0, "{}")).unwrap_err();
        assert!(matches!(err, Error::Ledger(_)));
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), "");
    }

    #[test]
    fn test_create_truncates_previous_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        std::fs::write(&path, "stale\n").unwrap();

        let ledger = ResultsLedger::create(&path).unwrap();
        assert!(!ledger.header_written());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_each_row_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
        ledger.write_header_once(&metrics()).unwrap();

        for rep in 0..3 {
            ledger.append_row(&row(rep, "{}")).unwrap();
            let lines = std::fs::read_to_string(ledger.path()).unwrap().lines().count();
            assert_eq!(lines, rep + 2);
        }
        assert_eq!(ledger.rows_written(), 3);
    }

    #[test]
    fn test_mismatched_width_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ResultsLedger::create(dir.path().join("results.csv")).unwrap();
        ledger.write_header_once(&["only".to_string()]).unwrap();
        ledger.append_row(&row(0, "{}")).unwrap();
        assert_eq!(ledger.rows_written(), 1);
    }
}
