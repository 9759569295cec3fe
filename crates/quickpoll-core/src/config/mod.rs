//! Engine configuration parsing.
//!
//! Deployments configure the engine through a small TOML file covering the
//! store location, the submission retry policy, and the reconciliation
//! sweep. Every field has a default; an empty file is a valid
//! configuration. Unknown keys and out-of-range values fail parsing so a
//! typo cannot silently run with defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregator::{AggregatorConfig, DEFAULT_MAX_ATTEMPTS, MAX_ATTEMPTS};
use crate::reconcile::{DEFAULT_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL};


/// Errors raised while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Submission retry policy.
    #[serde(default)]
    pub aggregator: AggregatorSection,

    /// Reconciliation sweep settings.
    #[serde(default)]
    pub reconciler: ReconcilerSection,
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid, contains unknown keys, or
    /// fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agg = &self.aggregator;
        if agg.max_attempts == 0 || agg.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::Validation(format!(
                "aggregator.max_attempts must be in [1, {MAX_ATTEMPTS}], got {}",
                agg.max_attempts
            )));
        }
        if agg.backoff_base_ms == 0 {
            return Err(ConfigError::Validation(
                "aggregator.backoff_base_ms must be at least 1".to_string(),
            ));
        }
        if agg.backoff_cap_ms < agg.backoff_base_ms {
            return Err(ConfigError::Validation(format!(
                "aggregator.backoff_cap_ms ({}) must be >= backoff_base_ms ({})",
                agg.backoff_cap_ms, agg.backoff_base_ms
            )));
        }

        let sweep = self.reconciler.sweep_interval_secs;
        let min = MIN_SWEEP_INTERVAL.as_secs();
        let max = MAX_SWEEP_INTERVAL.as_secs();
        if sweep < min || sweep > max {
            return Err(ConfigError::Validation(format!(
                "reconciler.sweep_interval_secs must be in [{min}, {max}], got {sweep}"
            )));
        }

        Ok(())
    }

    /// The retry policy as an [`AggregatorConfig`].
    #[must_use]
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig::new()
            .with_max_attempts(self.aggregator.max_attempts)
            .with_backoff_base(Duration::from_millis(self.aggregator.backoff_base_ms))
            .with_backoff_cap(Duration::from_millis(self.aggregator.backoff_cap_ms))
    }

    /// The reconciliation sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.reconciler.sweep_interval_secs)
    }
}

/// Store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Submission retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorSection {
    /// Attempts per submission, counting the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling on the exponential delay, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for AggregatorSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

/// Reconciliation sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcilerSection {
    /// Whether the periodic sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pause between sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("quickpoll.db")
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_backoff_base_ms() -> u64 {
    10
}

const fn default_backoff_cap_ms() -> u64 {
    500
}

const fn default_true() -> bool {
    true
}

const fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_secs()
}
