//! Layered configuration.
//!
//! Settings are resolved from, lowest to highest precedence:
//! - Default values
//! - TOML configuration file (`secretwatch.toml` unless a path is given)
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SECRETWATCH_` and use double
//! underscores to separate nested levels:
//! - `SECRETWATCH_SECRETS__PATH=/var/run/secrets.json` sets `secrets.path`
//! - `SECRETWATCH_SECRETS__PROVIDER=vault_csi` sets `secrets.provider`
//! - `SECRETWATCH_WATCHER__POLL_INTERVAL_MS=5000` sets `watcher.poll_interval_ms`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filewatcher::{DEFAULT_INITIAL_READ_INTERVAL, DEFAULT_MAX_FILE_SIZE};
use crate::secrets::SecretsConfig;

/// Settings file looked up by [`Settings::load`].
pub const DEFAULT_CONFIG_FILE: &str = "secretwatch.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SECRETWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Secret store settings
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// File watcher tuning
    #[serde(default)]
    pub watcher: WatcherSettings,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Periodic change check on top of filesystem events; off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,

    /// Files larger than this many bytes are rejected
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// How often to re-check for a file that does not exist yet
    #[serde(default = "default_initial_read_interval_ms")]
    pub initial_read_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Level for everything without a module override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target levels, e.g. `secretwatch::secrets = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
fn default_initial_read_interval_ms() -> u64 {
    DEFAULT_INITIAL_READ_INTERVAL.as_millis() as u64
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            secrets: SecretsConfig::default(),
            watcher: WatcherSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: None,
            max_file_size: default_max_file_size(),
            initial_read_interval_ms: default_initial_read_interval_ms(),
        }
    }
}

impl WatcherSettings {
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn initial_read_interval(&self) -> Duration {
        // A zero interval would spin.
        Duration::from_millis(self.initial_read_interval_ms.max(1))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from `secretwatch.toml` in the current directory
    /// (if present) and the environment.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file. A missing file is not an
    /// error; defaults and the environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// The settings rendered as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Resolve a path the same way [`load`](Self::load) would.
    pub fn config_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }
}
