//! Configuration for Trueno-Lab batch runs.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//!
//! ```toml
//! data_dir = "data"
//! experiment_dir = "experiments"
//! output_dir = "output"
//!
//! [[seeds]]
//! primary_seed = 1
//! auxiliary_seed = 100
//!
//! [devices]
//! count = 2
//!
//! [trainer]
//! program = "python3"
//! args = ["train.py"]
//! ```

use crate::batch::SeedPair;
use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "trueno-lab.toml";

/// Prefix of environment overrides (`TRUENO_LAB_OUTPUT_DIR`, `TRUENO_LAB_DEVICES__COUNT`).
pub const ENV_PREFIX: &str = "TRUENO_LAB_";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Directory dataset file names are resolved against
    pub data_dir: PathBuf,
    /// Directory relative batch file names are resolved against
    pub experiment_dir: PathBuf,
    /// Root of per-batch output directories
    pub output_dir: PathBuf,
    /// Seed pairs, one repetition each, shared by every experiment
    pub seeds: Vec<SeedPair>,
    /// Device discovery
    pub devices: DeviceConfig,
    /// Dataset loading
    pub datasets: DatasetConfig,
    /// External trainer program
    pub trainer: TrainerConfig,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            experiment_dir: PathBuf::from("experiments"),
            output_dir: PathBuf::from("output"),
            seeds: Vec::new(),
            devices: DeviceConfig::default(),
            datasets: DatasetConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

/// Device discovery settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Use exactly this many accelerators instead of probing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

/// Command-line overrides; only fields that are set take effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigOverrides {
    /// Replaces `data_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Replaces `output_dir`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    /// Replaces `devices.count`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<DeviceConfig>,
}

/// Dataset loading settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Name of the index column
    pub index_column: String,
    /// Fail loads whose files lack the index column
    pub require_index: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            index_column: crate::storage::DEFAULT_INDEX_COLUMN.to_string(),
            require_index: false,
        }
    }
}

/// External trainer settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Program run once per repetition
    pub program: Option<PathBuf>,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl LabConfig {
    /// Reject configurations that cannot run a batch.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if no seeds are configured
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(Error::Config(
                "no seeds configured; add at least one [[seeds]] entry".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a batch file name against `experiment_dir` unless it already exists as given.
    #[must_use]
    pub fn resolve_batch_path(&self, batch: &Path) -> PathBuf {
        if batch.is_absolute() || batch.exists() {
            batch.to_path_buf()
        } else {
            self.experiment_dir.join(batch)
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `TRUENO_LAB_`)
/// 3. Config file (`config_file`, or `trueno-lab.toml` if present)
/// 4. Built-in defaults
///
/// # Errors
/// Returns [`Error::Config`] if an explicit config file is missing or any layer fails to parse
pub fn load_config(
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<LabConfig> {
    let mut figment = Figment::from(Serialized::defaults(LabConfig::default()));

    match config_file {
        Some(path) if !path.exists() => {
            return Err(Error::Config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        Some(path) => figment = figment.merge(Toml::file(path)),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }
    }

    // Environment variables (TRUENO_LAB_OUTPUT_DIR, TRUENO_LAB_DEVICES__COUNT, etc.)
    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Error::from)
}
