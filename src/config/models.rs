// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Port used when the configuration names neither a port nor a socket.
pub const DEFAULT_PORT: u16 = 8080;

/// Host used for TCP listens when none is configured (unspecified IPv6, dual stack).
pub const DEFAULT_HOST: &str = "::";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Filesystem socket path. Takes precedence over `host`/`port`.
    #[serde(default)]
    pub socket: Option<PathBuf>,
    /// Octal permission bits applied to the socket file, e.g. `"600"`.
    #[serde(default)]
    pub socket_mode: Option<String>,
    /// Positional arguments.
    #[serde(default, rename = "_")]
    pub args: Vec<String>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("socket path must not be empty")]
    EmptySocketPath,

    #[error("invalid socket mode {0:?}: expected octal permission bits such as \"600\"")]
    InvalidSocketMode(String),

    #[error("metrics path {0:?} must start with '/'")]
    InvalidMetricsPath(String),
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.host.as_deref(), Some(host) if host.trim().is_empty()) {
            return Err(ConfigError::EmptyHost);
        }

        if matches!(&self.socket, Some(path) if path.as_os_str().is_empty()) {
            return Err(ConfigError::EmptySocketPath);
        }

        self.socket_mode_bits()?;

        if !self.metrics.path.starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(self.metrics.path.clone()));
        }

        Ok(())
    }

    /// Parsed `socket_mode`, if one is configured.
    pub fn socket_mode_bits(&self) -> Result<Option<u32>, ConfigError> {
        let Some(raw) = self.socket_mode.as_deref() else {
            return Ok(None);
        };

        let digits = raw.trim().trim_start_matches("0o");
        match u32::from_str_radix(digits, 8) {
            Ok(mode) if !digits.is_empty() && mode <= 0o777 => Ok(Some(mode)),
            _ => Err(ConfigError::InvalidSocketMode(raw.to_string())),
        }
    }
}
