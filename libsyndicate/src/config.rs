//! Configuration management for Syndicate

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Cadences and bounds for the poller, reclaimer, and queue workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between poller ticks.
    pub poll_interval: u64,
    /// Due attempts admitted per poller tick.
    pub poll_batch: u32,
    /// Seconds between reclaimer ticks.
    pub reclaim_interval: u64,
    /// Failed attempts re-admitted per reclaimer tick.
    pub reclaim_batch: u32,
    /// Seconds a failed attempt stays eligible for automatic reclaim.
    pub reclaim_window: i64,
    /// Wall-clock bound on one publisher invocation, in seconds.
    pub task_timeout: u64,
    /// Age in seconds after which an in-flight admission is considered
    /// orphaned and re-queued.
    pub stale_after: i64,
    /// Queue worker loops run by the daemon.
    pub workers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            poll_batch: 50,
            reclaim_interval: 900,
            reclaim_batch: 20,
            reclaim_window: 24 * 3600,
            task_timeout: 120,
            stale_after: 600,
            workers: 2,
        }
    }
}

/// Which platform tags the built-in sandbox publisher serves.
///
/// Production deployments register real publisher implementations instead;
/// the sandbox list exists so the full pipeline can run without live
/// platform clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub sandbox: Vec<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/syndicate/syndicate.db".to_string(),
            },
            scheduler: SchedulerConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SYNDICATE_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("syndicate").join("config.toml"))
}

/// Resolve the database path, honoring the `SYNDICATE_DB_PATH` override.
pub fn resolve_db_path(configured: &str) -> String {
    match std::env::var("SYNDICATE_DB_PATH") {
        Ok(path) => shellexpand::tilde(&path).to_string(),
        Err(_) => shellexpand::tilde(configured).to_string(),
    }
}
