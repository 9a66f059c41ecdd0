// src/config/mod.rs
mod models;

pub use models::*;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Prefix for environment variables that override file settings.
pub const ENV_PREFIX: &str = "WEBTERM";

/// Load configuration from a file (YAML or JSON), apply environment
/// overrides and validate the result.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: AppConfig = match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&contents).context("Failed to parse YAML config")?
        }
        _ => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
    };

    let config = with_env_overrides(config)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    host: Option<String>,
    port: Option<u16>,
    socket: Option<PathBuf>,
    socket_mode: Option<String>,
}

/// Layer `WEBTERM_HOST`, `WEBTERM_PORT`, `WEBTERM_SOCKET` and
/// `WEBTERM_SOCKET_MODE` over `config`.
pub fn with_env_overrides(config: AppConfig) -> Result<AppConfig> {
    apply_overrides(config, ::config::Environment::with_prefix(ENV_PREFIX))
}

fn apply_overrides(mut config: AppConfig, env: ::config::Environment) -> Result<AppConfig> {
    let overrides: EnvOverrides = ::config::Config::builder()
        .add_source(env)
        .build()
        .context("Failed to read environment overrides")?
        .try_deserialize()
        .context("Failed to parse environment overrides")?;

    if overrides.host.is_some() {
        config.host = overrides.host;
    }
    if overrides.port.is_some() {
        config.port = overrides.port;
    }
    if overrides.socket.is_some() {
        config.socket = overrides.socket;
    }
    if overrides.socket_mode.is_some() {
        config.socket_mode = overrides.socket_mode;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> ::config::Environment {
        let mut source = ::config::Map::new();
        for (key, value) in pairs {
            source.insert(key.to_string(), value.to_string());
        }
        ::config::Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        let config = AppConfig {
            host: Some("localhost".into()),
            port: Some(8080),
            ..Default::default()
        };

        let config = apply_overrides(
            config,
            env_from(&[("WEBTERM_PORT", "9090"), ("WEBTERM_SOCKET", "/run/webterm.sock")]),
        )
        .unwrap();

        assert_eq!(config.host.as_deref(), Some("localhost"));
        assert_eq!(config.port, Some(9090));
        assert_eq!(config.socket, Some(PathBuf::from("/run/webterm.sock")));
    }

    #[test]
    fn test_env_overrides_absent_keep_config() {
        let config = AppConfig {
            port: Some(1234),
            ..Default::default()
        };
        let merged = apply_overrides(config.clone(), env_from(&[])).unwrap();
        assert_eq!(merged, config);
    }

    #[tokio::test]
    async fn test_load_config_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("webterm.json");
        tokio::fs::write(&json, r#"{"port": 7000, "_": []}"#).await.unwrap();
        let config = load_config(&json).await.unwrap();
        assert_eq!(config.port, Some(7000));

        let yaml = dir.path().join("webterm.yaml");
        tokio::fs::write(&yaml, "host: 127.0.0.1\nport: 7001\n").await.unwrap();
        let config = load_config(&yaml).await.unwrap();
        assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_load_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webterm.yml");
        tokio::fs::write(&path, "socket-mode: \"abc\"\n").await.unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert!(err.to_string().contains("invalid socket mode"));
    }
}
