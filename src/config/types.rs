//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::AcceptedIdentity;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Bounds DNS resolution and each connect attempt; the relay itself never times out
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Path that accepts WebSocket upgrades
    pub ws_path: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// The single accepted identity (UUID)
    pub uuid: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            connect_timeout: Some(Duration::from_secs(10)),
            shutdown_timeout: Duration::from_secs(10),
            ws_path: "/".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// The accepted identity, if one is configured and is a valid UUID
    pub fn accepted_identity(&self) -> Option<AcceptedIdentity> {
        self.auth.uuid.as_deref().and_then(AcceptedIdentity::parse)
    }
}
