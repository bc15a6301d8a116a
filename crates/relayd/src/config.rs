//! Daemon configuration.
//!
//! Settings come from three layers, later ones winning:
//! 1. an optional TOML file (`relayd.toml`)
//! 2. environment variables (read by the binary)
//! 3. command-line flags
//!
//! Every field has a default, so an empty or missing file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::DEFAULT_HISTORY_LIMIT;
use relay_protocol::Framing;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::MAX_SESSIONS;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 50000;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default bound on waiting for tasks during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 500;

const CONFIG_FILE_NAME: &str = "relayd.toml";

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub bind_host: String,

    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,

    /// Broadcast lines kept in history
    pub history_limit: usize,

    /// Maximum concurrently registered sessions
    pub max_clients: usize,

    /// Message framing on the wire
    pub framing: Framing,

    /// Close sessions idle for this many seconds (disabled when absent)
    pub idle_timeout_secs: Option<u64>,

    /// Bound on waiting for listener and session tasks at shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_clients: MAX_SESSIONS,
            framing: Framing::Raw,
            idle_timeout_secs: None,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Loopback configuration on an ephemeral port.
    pub fn local_ephemeral() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// Default location of the config file, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatrelay").join(CONFIG_FILE_NAME))
    }

    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else the default file if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Applies optional overrides from the environment or command line.
    #[must_use]
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.bind_host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bind_host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid {
                field: "max_clients",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
