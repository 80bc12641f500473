//! Pipeline configuration
//!
//! Built-in defaults, overlaid by an optional TOML file, overlaid by
//! `RACR_*` environment variables.

use crate::errors::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "racr.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub tables_dir: PathBuf,
    pub model_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            tables_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Share of races held out for evaluation
    pub holdout_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    pub fold_count: usize,
    /// Shuffle rows before folding; `None` keeps row order
    pub shuffle_seed: Option<u64>,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            fold_count: 5,
            shuffle_seed: None,
        }
    }
}

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub num_boost_round: usize,
    /// Stop after this many rounds without improvement; 0 disables
    pub early_stopping_rounds: usize,
    pub seed: u64,
    /// Log evaluation metrics every N rounds; 0 disables
    pub verbose_eval: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.03,
            max_depth: 3,
            min_child_weight: 10.0,
            subsample: 0.7,
            colsample_bytree: 0.7,
            reg_lambda: 5.0,
            reg_alpha: 1.0,
            num_boost_round: 500,
            early_stopping_rounds: 25,
            seed: 42,
            verbose_eval: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RacrConfig {
    pub log_level: String,
    pub data: DataConfig,
    pub split: SplitConfig,
    pub encoding: EncodingConfig,
    pub training: TrainingConfig,
    pub serve: ServeConfig,
}

impl Default for RacrConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data: DataConfig::default(),
            split: SplitConfig::default(),
            encoding: EncodingConfig::default(),
            training: TrainingConfig::default(),
            serve: ServeConfig::default(),
        }
    }
}

impl RacrConfig {
    /// Resolve the effective configuration.
    ///
    /// An explicit `path` must exist. Without one, `racr.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply `RACR_*` overrides read through `lookup`. Empty or unparsable
    /// values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = get("RACR_TABLES_DIR") {
            self.data.tables_dir = PathBuf::from(value);
        }

        if let Some(value) = get("RACR_MODEL_DIR") {
            self.data.model_dir = PathBuf::from(value);
        }

        if let Some(value) = get("RACR_SEED") {
            if let Ok(seed) = value.parse::<u64>() {
                self.split.seed = seed;
                self.training.seed = seed;
            }
        }

        if let Some(value) = get("RACR_LOG_LEVEL") {
            self.log_level = value;
        }

        if let Some(value) = get("RACR_BIND") {
            self.serve.bind = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fraction = self.split.holdout_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "split.holdout_fraction must be in (0, 1), got {fraction}"
            )));
        }

        if self.encoding.fold_count < 2 {
            return Err(CoreError::InvalidConfig(format!(
                "encoding.fold_count must be at least 2, got {}",
                self.encoding.fold_count
            )));
        }

        let t = &self.training;
        if !(t.learning_rate > 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "training.learning_rate must be positive, got {}",
                t.learning_rate
            )));
        }
        for (name, value) in [("subsample", t.subsample), ("colsample_bytree", t.colsample_bytree)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CoreError::InvalidConfig(format!(
                    "training.{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if t.reg_lambda < 0.0 || t.reg_alpha < 0.0 || t.min_child_weight < 0.0 {
            return Err(CoreError::InvalidConfig(
                "training regularization terms must be non-negative".to_string(),
            ));
        }

        Ok(())
    }
}
