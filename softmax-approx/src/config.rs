use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde_derive::{Deserialize, Serialize};

use crate::activation::ReluStrategy;
use crate::checkpoint::DEFAULT_CHECKPOINT_PATH;
use crate::data::DEFAULT_INPUT_RANGE;
use crate::errors::ConfigError;
use crate::initializer::Initializer;
use crate::optimizer::Optimizer;
use crate::training_log::TRAINING_LOG_HOME_ENV;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReluKind {
    Exact,
    Polynomial,
}

/// Recognized options for a training run. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftmaxApproxConfig {
    pub hidden_size: usize,
    pub num_samples: usize,
    pub input_size: usize,
    /// Recognized for compatibility; the whole dataset is always a single batch.
    pub batch_size: usize,
    pub learning_rate: f64,
    pub num_epochs: usize,
    pub checkpoint_path: PathBuf,
    pub input_range: f64,
    pub seed: Option<u64>,
    pub relu: ReluKind,
    pub relu_bound: f64,
    pub initializer: Initializer,
    pub log_dir: Option<PathBuf>,
}

impl Default for SoftmaxApproxConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            num_samples: 1_000_000,
            input_size: 128,
            batch_size: 1,
            learning_rate: 0.0001,
            num_epochs: 100,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            input_range: DEFAULT_INPUT_RANGE,
            seed: None,
            relu: ReluKind::Exact,
            relu_bound: 16.0,
            initializer: Initializer::LinearDefault,
            log_dir: None,
        }
    }
}

impl SoftmaxApproxConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fills `log_dir` from `$TRAINING_LOG_HOME` when it was not set explicitly.
    pub fn apply_env_overrides(mut self) -> Self {
        if self.log_dir.is_none() {
            if let Ok(home) = env::var(TRAINING_LOG_HOME_ENV) {
                self.log_dir = Some(PathBuf::from(home));
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hidden_size == 0 {
            return Err(ConfigError::Invalid("hidden_size must be at least 1".to_owned()));
        }
        if self.input_size == 0 {
            return Err(ConfigError::Invalid("input_size must be at least 1".to_owned()));
        }
        if self.num_samples == 0 {
            return Err(ConfigError::Invalid("num_samples must be at least 1".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.input_range.is_finite() && self.input_range > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "input_range must be positive, got {}",
                self.input_range
            )));
        }
        if !(self.relu_bound.is_finite() && self.relu_bound > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "relu_bound must be positive, got {}",
                self.relu_bound
            )));
        }
        Ok(())
    }

    pub fn relu_strategy(&self) -> ReluStrategy {
        match self.relu {
            ReluKind::Exact => ReluStrategy::exact(),
            ReluKind::Polynomial => ReluStrategy::polynomial(self.relu_bound),
        }
    }

    pub fn optimizer(&self) -> Optimizer {
        Optimizer::adam(self.learning_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SoftmaxApproxConfig::default();
        assert_eq!(config.hidden_size, 64);
        assert_eq!(config.num_samples, 1_000_000);
        assert_eq!(config.input_size, 128);
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.learning_rate, 0.0001);
        assert_eq!(config.num_epochs, 100);
        assert_eq!(config.checkpoint_path, PathBuf::from("output/softmax_trained.model"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "hidden_size": 8, "relu": "polynomial", "seed": 3 }"#).unwrap();

        let config = SoftmaxApproxConfig::from_json_file(&path).unwrap();
        assert_eq!(config.hidden_size, 8);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.input_size, 128);
        assert_eq!(config.relu_strategy(), ReluStrategy::polynomial(16.0));
        assert_eq!(config.initializer, Initializer::LinearDefault);
    }

    #[test]
    fn initializer_is_read_from_json() {
        let config: SoftmaxApproxConfig =
            serde_json::from_str(r#"{ "initializer": "he" }"#).unwrap();
        assert_eq!(config.initializer, Initializer::HeForReLUAndVariants);

        assert!(serde_json::from_str::<SoftmaxApproxConfig>(r#"{ "initializer": "manual" }"#)
            .is_err());
    }

    #[test]
    fn unparseable_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "hidden_size = 8").unwrap();
        assert!(matches!(
            SoftmaxApproxConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = SoftmaxApproxConfig {
            hidden_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SoftmaxApproxConfig {
            learning_rate: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SoftmaxApproxConfig {
            input_range: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_log_dir_wins_over_env() {
        let config = SoftmaxApproxConfig {
            log_dir: Some(PathBuf::from("explicit")),
            ..Default::default()
        }
        .apply_env_overrides();
        assert_eq!(config.log_dir, Some(PathBuf::from("explicit")));
    }
}
