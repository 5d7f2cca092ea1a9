//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// Network listen configuration.
    pub listen: ListenConfig,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Push notification provider configuration.
    pub push: Option<PushConfig>,
    /// Identity resolution configuration.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "chat.fxchat.io").
    pub name: String,
    /// Prometheus metrics port. 0 (or absent defaults handled by main)
    /// disables the endpoint; used by tests.
    pub metrics_port: Option<u16>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address the WebSocket gateway binds to (e.g., "0.0.0.0:8090").
    pub ws_address: SocketAddr,
    /// Address the REST API binds to (e.g., "0.0.0.0:8080").
    pub api_address: SocketAddr,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (":memory:" for tests).
    pub path: String,
}

/// Push notification provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Provider HTTP endpoint for batched push sends.
    #[serde(default = "default_push_endpoint")]
    pub endpoint: String,
}

fn default_push_endpoint() -> String {
    "https://exp.host/--/api/v2/push/send".to_string()
}

/// How caller identity is established.
///
/// Authentication itself is an external capability; the server only needs
/// a verified user id per request/session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Trust the `x-authenticated-user` header injected by an upstream
    /// auth proxy, and require it to match any declared identity.
    #[default]
    Proxy,
    /// Trust the identity declared in the request itself. Development and
    /// test deployments only.
    Trusted,
}

/// Identity resolution configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let raw = r#"
            [server]
            name = "chat.test"
            metrics_port = 0

            [listen]
            ws_address = "127.0.0.1:8090"
            api_address = "127.0.0.1:8080"

            [database]
            path = ":memory:"

            [auth]
            mode = "trusted"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.name, "chat.test");
        assert_eq!(config.auth.mode, AuthMode::Trusted);
        assert!(config.push.is_none());
    }

    #[test]
    fn push_endpoint_defaults() {
        let raw = r#"
            [server]
            name = "chat.test"

            [listen]
            ws_address = "127.0.0.1:8090"
            api_address = "127.0.0.1:8080"

            [push]
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.push.unwrap().endpoint.contains("exp.host"));
        assert_eq!(config.auth.mode, AuthMode::Proxy);
    }
}
