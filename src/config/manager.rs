//! Configuration Manager

use super::Config;
use crate::Result;
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the accepted identity
pub const ENV_UUID: &str = "UUID";
pub const ENV_BIND_ADDR: &str = "VLESS_BIND_ADDR";
pub const ENV_PORT: &str = "PORT";
pub const ENV_CONNECT_TIMEOUT: &str = "VLESS_CONNECT_TIMEOUT";
pub const ENV_LOG_LEVEL: &str = "VLESS_LOG_LEVEL";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file.
    ///
    /// The file is layered over the environment, which is layered over the
    /// defaults: keys the file leaves out keep their environment value.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let file: toml::Value = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            let mut merged = toml::Value::try_from(Self::env_config()?)
                .context("Failed to serialize environment configuration")?;
            merge_toml(&mut merged, file);

            let config: Config = merged
                .try_into()
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using environment", path.display());
            Self::load_from_env()
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let config = Self::env_config()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied, not yet validated
    fn env_config() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(uuid) = std::env::var(ENV_UUID) {
            config.auth.uuid = Some(uuid);
        }

        if let Ok(bind_addr) = std::env::var(ENV_BIND_ADDR) {
            config.server.bind_addr = bind_addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid {}: {}", ENV_BIND_ADDR, bind_addr))?;
        }

        if let Ok(port) = std::env::var(ENV_PORT) {
            let port = port.parse::<u16>()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
            config.server.bind_addr.set_port(port);
        }

        if let Ok(timeout) = std::env::var(ENV_CONNECT_TIMEOUT) {
            config.server.connect_timeout = Some(humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid {}: {}", ENV_CONNECT_TIMEOUT, timeout))?);
        }

        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            config.logging.level = log_level;
        }

        Ok(config)
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, everything else replaces
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// A missing or malformed UUID is not an error here: the server starts
    /// and refuses every connection instead.
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if let Some(timeout) = self.server.connect_timeout {
            if timeout.is_zero() {
                bail!("connect_timeout must be greater than 0");
            }
        }

        if self.server.shutdown_timeout.is_zero() {
            bail!("shutdown_timeout must be greater than 0");
        }

        if !self.server.ws_path.starts_with('/') {
            bail!("ws_path must start with '/'");
        }

        if self.server.ws_path == crate::server::METRICS_PATH {
            bail!("ws_path cannot be {}", crate::server::METRICS_PATH);
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", VALID_LOG_LEVELS.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<&str>,
        port: Option<u16>,
        uuid: Option<&str>,
        connect_timeout: Option<u64>,
        log_level: Option<&str>,
    ) {
        if let Some(bind_str) = bind {
            if let Ok(addr) = bind_str.parse::<SocketAddr>() {
                self.server.bind_addr = addr;
                tracing::info!("CLI override: bind address set to {}", addr);
            } else {
                tracing::warn!("Invalid bind address provided: {}", bind_str);
            }
        }

        if let Some(port) = port {
            self.server.bind_addr.set_port(port);
            tracing::info!("CLI override: port set to {}", port);
        }

        if let Some(uuid) = uuid {
            self.auth.uuid = Some(uuid.to_string());
            tracing::info!("CLI override: accepted identity set");
        }

        if let Some(timeout_secs) = connect_timeout {
            self.server.connect_timeout = Some(Duration::from_secs(timeout_secs));
            tracing::info!("CLI override: connect timeout set to {}s", timeout_secs);
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.accepted_identity().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_addr = "127.0.0.1:9000"
connect_timeout = "3s"
ws_path = "/ws"

[auth]
uuid = "d342d11e-d424-4583-b36e-524ab1f0afa4"

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.server.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.server.ws_path, "/ws");
        assert_eq!(config.logging.level, "debug");
        assert!(config.accepted_identity().is_some());
    }

    #[test]
    fn test_invalid_uuid_is_not_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[auth]\nuuid = \"not-a-uuid\"").unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert!(config.accepted_identity().is_none());
    }

    #[test]
    fn test_file_layered_over_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nws_path = \"/tunnel\"\nshutdown_timeout = \"4s\"").unwrap();

        std::env::set_var(ENV_PORT, "9123");
        std::env::set_var(ENV_CONNECT_TIMEOUT, "7s");
        let loaded = ConfigManager::load_from_file(file.path());
        std::env::remove_var(ENV_PORT);
        std::env::remove_var(ENV_CONNECT_TIMEOUT);

        let config = loaded.unwrap();
        assert_eq!(config.server.bind_addr.port(), 9123);
        assert_eq!(config.server.connect_timeout, Some(Duration::from_secs(7)));
        assert_eq!(config.server.ws_path, "/tunnel");
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(4));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_merge_toml_file_wins() {
        let mut base: toml::Value = toml::from_str("[server]\nws_path = \"/\"\nconnect_timeout = \"7s\"").unwrap();
        let overlay: toml::Value = toml::from_str("[server]\nconnect_timeout = \"2s\"").unwrap();
        merge_toml(&mut base, overlay);

        let server = base.get("server").unwrap();
        assert_eq!(server.get("connect_timeout").unwrap().as_str(), Some("2s"));
        assert_eq!(server.get("ws_path").unwrap().as_str(), Some("/"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.ws_path = "ws".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.ws_path = "/metrics".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.connect_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.merge_with_cli_args(
            Some("127.0.0.1:1234"),
            Some(4321),
            Some("d342d11e-d424-4583-b36e-524ab1f0afa4"),
            Some(7),
            Some("warn"),
        );

        assert_eq!(config.server.bind_addr, "127.0.0.1:4321".parse().unwrap());
        assert_eq!(config.server.connect_timeout, Some(Duration::from_secs(7)));
        assert_eq!(config.logging.level, "warn");
        assert!(config.accepted_identity().is_some());
    }
}
