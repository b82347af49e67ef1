//! Configuration loading and precedence
//!
//! Settings are resolved in this order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Built-in default (fallback)
//!
//! Tiers 1 and 2 arrive together as [`SettingsOverrides`] (the binary's
//! argument parser reads both). This module owns tiers 3 and 4.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default number of rows per chunk and per upsert transaction
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default number of concurrent load workers
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; a missing file behaves like an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Load pipeline tuning
    #[serde(default)]
    pub etl: EtlConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for per-run log files (console only if not specified)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

/// `[etl]` table of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EtlConfig {
    pub batch_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub status_policy: Option<StatusPolicy>,
}

/// Which status label survives when one candidate's tally rows disagree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Status of the most recently processed row
    #[default]
    LastWins,
    /// Status of the first row seen for the candidate
    FirstWins,
}

impl std::str::FromStr for StatusPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last_wins" | "last" => Ok(StatusPolicy::LastWins),
            "first_wins" | "first" => Ok(StatusPolicy::FirstWins),
            other => Err(Error::Config(format!(
                "Unknown status policy '{}' (expected last_wins or first_wins)",
                other
            ))),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub database_path: Option<PathBuf>,
    pub batch_size: Option<usize>,
    pub max_workers: Option<usize>,
    pub status_policy: Option<StatusPolicy>,
    pub log_level: Option<String>,
    pub log_directory: Option<PathBuf>,
}

/// Fully resolved settings for one process
#[derive(Debug, Clone)]
pub struct EtlSettings {
    pub database_path: PathBuf,
    pub batch_size: usize,
    pub max_workers: usize,
    pub status_policy: StatusPolicy,
    pub log_level: String,
    pub log_directory: Option<PathBuf>,
}

impl EtlSettings {
    /// Merge overrides over the TOML file over built-in defaults
    ///
    /// Zero batch sizes or worker counts are rejected rather than clamped.
    pub fn resolve(overrides: SettingsOverrides, toml: &TomlConfig) -> Result<Self> {
        let batch_size = overrides
            .batch_size
            .or(toml.etl.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }

        let max_workers = overrides
            .max_workers
            .or(toml.etl.max_workers)
            .unwrap_or(DEFAULT_MAX_WORKERS);
        if max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }

        let database_path = overrides
            .database_path
            .or_else(|| toml.database_path.clone())
            .unwrap_or_else(default_database_path);

        Ok(Self {
            database_path,
            batch_size,
            max_workers,
            status_policy: overrides
                .status_policy
                .or(toml.etl.status_policy)
                .unwrap_or_default(),
            log_level: overrides
                .log_level
                .unwrap_or_else(|| toml.logging.level.clone()),
            log_directory: overrides
                .log_directory
                .or_else(|| toml.logging.directory.clone()),
        })
    }
}

/// Platform config file location: `<config_dir>/politica/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("politica").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("politica").join("politica.db"))
        .unwrap_or_else(|| PathBuf::from("./politica_data/politica.db"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Load the TOML config, falling back to defaults when it is absent
///
/// A missing file is only logged. A file that exists but does not parse is
/// an error.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    if !path.exists() {
        if explicit.is_some() {
            warn!("Config file {} not found, using defaults", path.display());
        }
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(&path)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_policy_from_str() {
        assert_eq!("last_wins".parse::<StatusPolicy>().unwrap(), StatusPolicy::LastWins);
        assert_eq!("first".parse::<StatusPolicy>().unwrap(), StatusPolicy::FirstWins);
        assert!("sometimes".parse::<StatusPolicy>().is_err());
    }

    #[test]
    fn test_resolve_rejects_zero_workers() {
        let overrides = SettingsOverrides {
            max_workers: Some(0),
            ..Default::default()
        };
        let result = EtlSettings::resolve(overrides, &TomlConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
