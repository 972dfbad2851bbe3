//! Broadcaster Configuration System
//!
//! TOML-based configuration with environment variable override support.

use bc_common::BroadcastConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broadcast: BroadcastConfig,
    pub directory: DirectoryConfig,
}

/// Recipient directory configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON file with `users` and `chats` arrays used to seed the in-memory directory
    pub seed_file: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the dispatcher cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.broadcast;
        if b.workers == 0 {
            return Err(ConfigError::ValidationError("broadcast.workers must be at least 1".into()));
        }
        if b.default_rate_per_second == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast.default_rate_per_second must be at least 1".into(),
            ));
        }
        if b.channel_id_threshold <= 0 {
            return Err(ConfigError::ValidationError(
                "broadcast.channel_id_threshold must be positive".into(),
            ));
        }
        if b.removal_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast.removal_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Broadcaster Configuration
# Environment variables (BROADCAST_*) override these settings

[broadcast]
workers = 20
max_retries = 2
default_rate_per_second = 25
channel_id_threshold = 1000000000000
progress_interval_ms = 5000     # 0 disables progress edits
removal_concurrency = 8
removal_drain_timeout_ms = 10000

[directory]
# seed_file = "./recipients.json"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_example_toml_parses_to_defaults() {
        let config = AppConfig::from_toml_str(&AppConfig::example_toml()).unwrap();
        let defaults = BroadcastConfig::default();
        assert_eq!(config.broadcast.workers, defaults.workers);
        assert_eq!(config.broadcast.max_retries, defaults.max_retries);
        assert_eq!(config.broadcast.channel_id_threshold, defaults.channel_id_threshold);
        assert!(config.directory.seed_file.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[broadcast]\nworkers = 4\n").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.broadcast.workers, 4);
        assert_eq!(config.broadcast.default_rate_per_second, 25);
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml_str("[broadcast\nworkers = 4").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.broadcast.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let mut config = AppConfig::default();
        config.broadcast.default_rate_per_second = 0;
        assert!(config.validate().is_err());
    }
}
