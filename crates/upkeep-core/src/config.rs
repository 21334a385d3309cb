//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "UPKEEP_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Append-only log file
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Lock file guarding update runs
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    /// Directory receiving the systemd service and timer units
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,
    /// Base name of the generated systemd units
    #[serde(default = "default_unit_name")]
    pub unit_name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Per-step timeout for package manager commands, unbounded when unset
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    /// Filesystem root for host probes (package managers, os-release,
    /// init system markers)
    #[serde(default = "default_probe_root")]
    pub probe_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            lock_path: default_lock_path(),
            unit_dir: default_unit_dir(),
            unit_name: default_unit_name(),
            log_level: default_log_level(),
            step_timeout_secs: None,
            probe_root: default_probe_root(),
        }
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/log/upkeep.log")
}

fn default_lock_path() -> PathBuf {
    PathBuf::from("/run/upkeep.lock")
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_unit_name() -> String {
    "upkeep".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_probe_root() -> PathBuf {
    PathBuf::from("/")
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::ConfigError(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn parse(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::ConfigError(e.to_string()))
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> Result<Self, CoreError> {
        // Check environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        // Try common paths
        let paths = [
            Some(PathBuf::from("upkeep.toml")),
            Some(PathBuf::from("/etc/upkeep/upkeep.toml")),
            dirs::config_dir().map(|p| p.join("upkeep/upkeep.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Step timeout as a `Duration`
    #[must_use]
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }
}
