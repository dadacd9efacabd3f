//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `schedule_state.toml` in the working directory, or the file named
//! by `SCHEDULE_STATE_CONFIG`. Every field has a sensible default so the file
//! is optional. Environment variables take precedence over file values.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

use schedule_state_domain::schedule::ScheduleDefinition;

const DEFAULT_PATH: &str = "schedule_state.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Override persistence settings.
    pub storage: StorageConfig,
    /// Update loop settings.
    pub runtime: RuntimeConfig,
    /// Initial states of the virtual entities, `entity_id → state`.
    pub entities: BTreeMap<String, String>,
    /// Schedules to run.
    pub schedules: Vec<ScheduleDefinition>,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Override persistence configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON document per schedule.
    pub directory: PathBuf,
}

/// Update loop configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seconds between two updates of every schedule.
    pub tick_seconds: u64,
}

impl Config {
    /// Load configuration from `schedule_state.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var("SCHEDULE_STATE_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SCHEDULE_STATE_STORAGE") {
            self.storage.directory = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SCHEDULE_STATE_TICK")
            && let Ok(seconds) = val.parse()
        {
            self.runtime.tick_seconds = seconds;
        }
        if let Ok(val) = std::env::var("SCHEDULE_STATE_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.tick_seconds == 0 {
            return Err(ConfigError::Validation(
                "tick_seconds must be non-zero".to_string(),
            ));
        }
        let mut names = BTreeSet::new();
        for schedule in &self.schedules {
            schedule.validate().map_err(|err| {
                ConfigError::Validation(format!("schedule {:?}: {err}", schedule.name))
            })?;
            if !names.insert(schedule.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate schedule name {:?}",
                    schedule.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "schedule_stated=info,schedule_state=info".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".schedule_state"),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_seconds: 60 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
