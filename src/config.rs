//! Nox Configuration Module
//!
//! Runtime settings for resolvers and remote execution.
//! Config is stored in `~/.config/nox/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (applied by the caller)
//! 2. Environment variables (`NOX_SERVER_URL`, `NOX_CACHE_FILE`)
//! 3. Config file (`~/.config/nox/config.toml`)
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NoxError, Result};
use crate::util::{DEFAULT_PROBE_TIMEOUT, MAX_WALK_DEPTH};

pub const DEFAULT_PROBE_URL: &str = "https://www.msftconnecttest.com/connecttest.txt";
pub const DEFAULT_PUBLIC_IP_URL: &str = "https://api.ipify.org";
pub const DEFAULT_SECRET_ENV_PREFIX: &str = "NOX_SECRET_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoxConfig {
    /// Task server for `run-at-server` steps when the workflow names none
    pub server_url: Option<String>,

    /// Session cache file (JSON with `username`, `upn`, `accessToken`)
    pub cache_file: Option<PathBuf>,

    /// Depth guard for solution / for-each walking
    pub max_walk_depth: usize,

    /// Reachability probe behind `runner.isOnline`
    pub probe_url: String,

    /// Endpoint answering with the caller's public IP (`runner.publicIp`)
    pub public_ip_url: String,

    pub probe_timeout_ms: u64,

    /// Prefix of env vars read by the environment secret backend
    pub secret_env_prefix: String,
}

impl Default for NoxConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            cache_file: None,
            max_walk_depth: MAX_WALK_DEPTH,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            public_ip_url: DEFAULT_PUBLIC_IP_URL.to_string(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT.as_millis() as u64,
            secret_env_prefix: DEFAULT_SECRET_ENV_PREFIX.to_string(),
        }
    }
}

impl NoxConfig {
    /// Returns `~/.config/nox/` on Unix, `%APPDATA%/nox/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nox")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default location
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path
    ///
    /// Returns error if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| NoxError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| NoxError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Environment variables take precedence over file values
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var("NOX_SERVER_URL") {
            if !url.is_empty() {
                self.server_url = Some(url);
            }
        }

        if let Ok(file) = std::env::var("NOX_CACHE_FILE") {
            if !file.is_empty() {
                self.cache_file = Some(PathBuf::from(file));
            }
        }

        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Default session cache location when none is configured
    pub fn cache_path(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("cache.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_contains_nox() {
        let path = NoxConfig::config_path();
        assert!(path.to_string_lossy().contains("nox"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = NoxConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, NoxConfig::default());
        assert_eq!(config.max_walk_depth, 50);
        assert_eq!(config.probe_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "server_url = \"http://tasks:5000\"\nmax_walk_depth = 8\n").unwrap();

        let config = NoxConfig::load_from(&path).unwrap();
        assert_eq!(config.server_url.as_deref(), Some("http://tasks:5000"));
        assert_eq!(config.max_walk_depth, 8);
        assert_eq!(config.secret_env_prefix, DEFAULT_SECRET_ENV_PREFIX);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_walk_depth = \"deep\"").unwrap();

        let err = NoxConfig::load_from(&path).unwrap_err();
        assert_eq!(err.code(), "NOX-090");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        env::set_var("NOX_SERVER_URL", "http://from-env:9000");
        env::set_var("NOX_CACHE_FILE", "/tmp/nox-cache.json");

        let config = NoxConfig {
            server_url: Some("http://from-file".into()),
            ..Default::default()
        }
        .with_env();

        env::remove_var("NOX_SERVER_URL");
        env::remove_var("NOX_CACHE_FILE");

        assert_eq!(config.server_url.as_deref(), Some("http://from-env:9000"));
        assert_eq!(config.cache_path(), PathBuf::from("/tmp/nox-cache.json"));
    }
}
