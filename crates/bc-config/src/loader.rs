//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "broadcast.toml",
    "config.toml",
    "./config/broadcast.toml",
    "/etc/broadcaster/broadcast.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!(?path, "Configured config file does not exist, searching defaults");
        }

        if let Ok(path) = env::var("BROADCAST_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `BROADCAST_*` overrides using `lookup` to resolve variables.
/// Unparsable numeric values are ignored with a warning.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let b = &mut config.broadcast;
    override_parsed(&lookup, "BROADCAST_WORKERS", &mut b.workers);
    override_parsed(&lookup, "BROADCAST_MAX_RETRIES", &mut b.max_retries);
    override_parsed(&lookup, "BROADCAST_RATE_PER_SECOND", &mut b.default_rate_per_second);
    override_parsed(&lookup, "BROADCAST_CHANNEL_ID_THRESHOLD", &mut b.channel_id_threshold);
    override_parsed(&lookup, "BROADCAST_PROGRESS_INTERVAL_MS", &mut b.progress_interval_ms);
    override_parsed(&lookup, "BROADCAST_REMOVAL_CONCURRENCY", &mut b.removal_concurrency);
    override_parsed(&lookup, "BROADCAST_REMOVAL_DRAIN_TIMEOUT_MS", &mut b.removal_drain_timeout_ms);

    if let Some(val) = lookup("BROADCAST_SEED_FILE") {
        config.directory.seed_file = (!val.is_empty()).then_some(val);
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(val) = lookup(key) {
        match val.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(key, value = %val, "Ignoring unparsable environment override"),
        }
    }
}
