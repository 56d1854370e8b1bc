//! Batch specification: the experiments to run and the seeds to run them with
//!
//! A batch file is YAML with a single `experiments` key holding an ordered
//! sequence of `[name, spec]` pairs:
//!
//! ```yaml
//! experiments:
//!   - - baseline
//!     - train_data_file: train.parquet
//!       test_data_file: test.parquet
//!       layers: [dense, dense]
//!       learning_rate: 0.01
//! ```
//!
//! Everything besides the two data-file keys is free-form and only meaningful
//! to the trainer. Parameter order is preserved so the serialized form written
//! to the ledger is stable.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Free-form, insertion-ordered experiment parameters.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// One named experiment configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSpec {
    name: String,
    body: ExperimentBody,
}

/// Serialized shape of an experiment entry (everything except the name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ExperimentBody {
    train_data_file: String,
    test_data_file: String,
    #[serde(flatten)]
    parameters: Parameters,
}

impl ExperimentSpec {
    /// Create an experiment with no extra parameters.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        train_data_file: impl Into<String>,
        test_data_file: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            body: ExperimentBody {
                train_data_file: train_data_file.into(),
                test_data_file: test_data_file.into(),
                parameters: Parameters::new(),
            },
        }
    }

    /// Add a trainer parameter, keeping insertion order.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.body.parameters.insert(key.into(), value);
        self
    }

    /// Experiment name, unique within its batch.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Train data file as written in the batch (relative to the data directory).
    #[must_use]
    pub fn train_data_file(&self) -> &str {
        &self.body.train_data_file
    }

    /// Test data file as written in the batch (relative to the data directory).
    #[must_use]
    pub fn test_data_file(&self) -> &str {
        &self.body.test_data_file
    }

    /// Trainer parameters (architecture, hyperparameters, layer arguments).
    #[must_use]
    pub const fn parameters(&self) -> &Parameters {
        &self.body.parameters
    }

    /// Look up a single trainer parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.body.parameters.get(key)
    }

    /// Compact single-line JSON of the full specification (data files included).
    ///
    /// # Errors
    /// Returns error if a parameter value cannot be serialized
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.body)?)
    }
}

/// An ordered batch of experiments, named after its source file.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSpec {
    name: String,
    experiments: Vec<ExperimentSpec>,
}

#[derive(Serialize, Deserialize)]
struct RawBatch {
    experiments: Vec<(String, ExperimentBody)>,
}

impl BatchSpec {
    /// Build a batch from already-constructed experiments.
    ///
    /// # Errors
    /// Returns [`Error::InvalidBatch`] if two experiments share a name
    pub fn new(name: impl Into<String>, experiments: Vec<ExperimentSpec>) -> Result<Self> {
        let mut seen = HashSet::new();
        for experiment in &experiments {
            if !seen.insert(experiment.name()) {
                return Err(Error::InvalidBatch(format!(
                    "duplicate experiment name '{}'",
                    experiment.name()
                )));
            }
        }
        Ok(Self {
            name: name.into(),
            experiments,
        })
    }

    /// Parse a batch from YAML text.
    ///
    /// # Errors
    /// Returns error if the YAML is malformed, lacks required keys, or repeats a name
    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self> {
        let raw: RawBatch = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidBatch(format!("cannot parse batch: {e}")))?;
        let experiments = raw
            .experiments
            .into_iter()
            .map(|(name, body)| ExperimentSpec { name, body })
            .collect();
        Self::new(name, experiments)
    }

    /// Read a batch file; the batch is named after the file stem.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(name, &yaml)
    }

    /// Re-serialize the batch as YAML (for the provenance copy).
    ///
    /// # Errors
    /// Returns error if a parameter value cannot be represented in YAML
    pub fn to_yaml(&self) -> Result<String> {
        let raw = RawBatch {
            experiments: self
                .experiments
                .iter()
                .map(|e| (e.name.clone(), e.body.clone()))
                .collect(),
        };
        Ok(serde_yaml::to_string(&raw)?)
    }

    /// Batch name (written to the `file` ledger column).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Experiments in declared order.
    #[must_use]
    pub fn experiments(&self) -> &[ExperimentSpec] {
        &self.experiments
    }

    /// Number of experiments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Whether the batch has no experiments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}

/// Seeds for one repetition.
///
/// Repetition `i` of every experiment uses the `i`-th pair of the configured sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeedPair {
    /// Seed for the numeric framework's internal randomness
    #[serde(alias = "tf_seed")]
    pub primary_seed: u64,
    /// Seed for any auxiliary random-number source
    #[serde(alias = "np_seed")]
    pub auxiliary_seed: u64,
}

impl SeedPair {
    /// Create a seed pair.
    #[must_use]
    pub const fn new(primary_seed: u64, auxiliary_seed: u64) -> Self {
        Self {
            primary_seed,
            auxiliary_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r"
experiments:
  - - baseline
    - train_data_file: train.parquet
      test_data_file: test.parquet
      layers: [dense, dense]
      learning_rate: 0.01
  - - wide
    - train_data_file: train.parquet
      test_data_file: test_b.parquet
      width: 512
";

    #[test]
    fn test_parse_batch_preserves_order() {
        let batch = BatchSpec::from_yaml("demo", BATCH).unwrap();
        assert_eq!(batch.name(), "demo");
        assert_eq!(batch.len(), 2);

        let names: Vec<_> = batch.experiments().iter().map(ExperimentSpec::name).collect();
        assert_eq!(names, vec!["baseline", "wide"]);

        let first = &batch.experiments()[0];
        assert_eq!(first.train_data_file(), "train.parquet");
        assert_eq!(first.test_data_file(), "test.parquet");
        let keys: Vec<_> = first.parameters().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["layers", "learning_rate"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let yaml = r"
experiments:
  - [a, {train_data_file: x, test_data_file: y}]
  - [a, {train_data_file: x, test_data_file: z}]
";
        let err = BatchSpec::from_yaml("dup", yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate experiment name 'a'"));
    }

    #[test]
    fn test_missing_data_file_rejected() {
        let yaml = "experiments:\n  - [a, {train_data_file: x}]\n";
        let err = BatchSpec::from_yaml("bad", yaml).unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
    }

    #[test]
    fn test_spec_json_is_single_line() {
        let spec = ExperimentSpec::new("e", "train.parquet", "test.parquet")
            .with_parameter("layers", serde_json::json!(["a", "b"]));
        let json = spec.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert!(json.starts_with(r#"{"train_data_file":"train.parquet""#));
        assert!(json.contains(r#""layers":["a","b"]"#));
    }

    #[test]
    fn test_yaml_echo_reparses() {
        let batch = BatchSpec::from_yaml("demo", BATCH).unwrap();
        let echoed = batch.to_yaml().unwrap();
        let reparsed = BatchSpec::from_yaml("demo", &echoed).unwrap();
        assert_eq!(batch, reparsed);
    }

    #[test]
    fn test_seed_pair_legacy_keys() {
        let yaml = "- {tf_seed: 1, np_seed: 2}\n- {primary_seed: 3, auxiliary_seed: 4}\n";
        let seeds: Vec<SeedPair> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(seeds, vec![SeedPair::new(1, 2), SeedPair::new(3, 4)]);
    }
}
