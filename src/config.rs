// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Harness settings and JSON5 settings-file parsing.
//!
//! Every field has a default, so a settings file is optional and may be
//! partial. JSON5 allows comments and trailing commas in the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validation::{validate_listener_count, validate_port};

/// Environment variable holding a float multiplier applied to the watchdog
/// duration. Slow or heavily loaded platforms set it above 1.
pub const TIMEOUT_FACTOR_ENV: &str = "BROADCAST_PROBE_TIMEOUT_FACTOR";

/// Run settings (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// UDP port shared by the sender and every listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of listener processes to spawn
    #[serde(default = "default_listeners")]
    pub listeners: usize,

    /// Base watchdog duration in seconds, before platform scaling
    #[serde(default = "default_watchdog_secs")]
    pub watchdog_secs: u64,

    /// How long a finished listener lingers before exiting, so its final
    /// report drains to the coordinator
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

fn default_port() -> u16 {
    12346
}

fn default_listeners() -> usize {
    3
}

fn default_watchdog_secs() -> u64 {
    20
}

fn default_grace_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            listeners: default_listeners(),
            watchdog_secs: default_watchdog_secs(),
            grace_ms: default_grace_ms(),
        }
    }
}

impl Config {
    /// Load settings from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse settings from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_port(self.port, "port").map_err(|reason| ConfigError::InvalidPort {
            port: self.port,
            reason,
        })?;
        validate_listener_count(self.listeners).map_err(|reason| {
            ConfigError::InvalidListenerCount {
                count: self.listeners,
                reason,
            }
        })?;
        Ok(())
    }

    /// Watchdog duration with the environment factor applied.
    pub fn watchdog_timeout(&self) -> Duration {
        let factor = std::env::var(TIMEOUT_FACTOR_ENV)
            .ok()
            .and_then(|v| v.parse::<f64>().ok());
        self.scaled_watchdog(factor)
    }

    fn scaled_watchdog(&self, factor: Option<f64>) -> Duration {
        let base = self.watchdog_secs as f64;
        let secs = match factor {
            Some(f) if f.is_finite() && f > 0.0 => base * f,
            _ => base,
        };
        Duration::from_secs_f64(secs)
    }

    /// Listener post-completion exit delay.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Settings loading and validation errors
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Io(PathBuf, String),
    Parse(String),
    InvalidPort { port: u16, reason: String },
    InvalidListenerCount { count: usize, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, err) => {
                write!(f, "failed to read settings file {:?}: {}", path, err)
            }
            ConfigError::Parse(err) => write!(f, "failed to parse settings: {}", err),
            ConfigError::InvalidPort { port, reason } => {
                write!(f, "invalid port {}: {}", port, reason)
            }
            ConfigError::InvalidListenerCount { count, reason } => {
                write!(f, "invalid listener count {}: {}", count, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
