//! vlessproxy - VLESS over WebSocket relay

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vlessproxy::{config::ConfigManager, metrics::Metrics, ShutdownCoordinator, VlessServer};

/// CLI arguments for vlessproxy
#[derive(Parser, Debug)]
#[command(name = "vlessproxy")]
#[command(about = "VLESS over WebSocket relay")]
#[command(version)]
#[command(long_about = "
VLESS over WebSocket relay

Accepts WebSocket connections, authenticates the VLESS request header in the
first binary frame against a single UUID and relays the socket to the TCP
target named in the header.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  UUID                   - Accepted client UUID
  VLESS_BIND_ADDR        - Bind address (e.g., 0.0.0.0:8000)
  PORT                   - Port to bind to
  VLESS_CONNECT_TIMEOUT  - Upstream connect timeout (e.g., 10s)
  VLESS_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Bind address (overrides config file)
    #[arg(short, long, help = "Bind address (e.g., 0.0.0.0:8000)")]
    pub bind: Option<String>,

    /// Port to bind to (overrides config file)
    #[arg(short, long, help = "Port to bind to")]
    pub port: Option<u16>,

    /// Accepted UUID (overrides config file and environment)
    #[arg(long, help = "Accepted client UUID")]
    pub uuid: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Upstream connect timeout in seconds
    #[arg(long, help = "Upstream connect timeout in seconds")]
    pub connect_timeout: Option<u64>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    let log_level = if args.verbose { Some("debug") } else { args.log_level.as_deref() };
    config.merge_with_cli_args(
        args.bind.as_deref(),
        args.port,
        args.uuid.as_deref(),
        args.connect_timeout,
        log_level,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    init_tracing(&config.logging.level);

    info!("Starting vlessproxy v{}", env!("CARGO_PKG_VERSION"));

    let identity_valid = config.accepted_identity().is_some();
    if !identity_valid {
        warn!("Not set valid UUID, every request will receive 401");
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Bind address: {}", config.server.bind_addr);
        info!("  WebSocket path: {}", config.server.ws_path);
        info!("  Connect timeout: {:?}", config.server.connect_timeout);
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        info!("  Accepted UUID: {}", if identity_valid { "valid" } else { "missing or invalid" });
        return Ok(());
    }

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);
    let metrics = Arc::new(Metrics::new().context("Failed to create metrics registry")?);

    let server = VlessServer::new(&config, metrics);
    let shutdown_signal = shutdown_coordinator.signal();
    let mut server_handle = tokio::spawn(async move { server.start(shutdown_signal).await });

    info!("Press Ctrl+C or send SIGTERM/SIGINT to shutdown gracefully");

    tokio::select! {
        result = shutdown_coordinator.listen_for_signals() => {
            if let Err(e) = result {
                error!("Error setting up signal handlers: {}", e);
                shutdown_coordinator.trigger();
            }
        }
        result = &mut server_handle => {
            // Server stopped without a shutdown signal, e.g. the bind failed
            return result.context("Server task panicked")?;
        }
    }

    info!("Initiating graceful shutdown...");
    if let Err(e) = shutdown_coordinator.wait_for_task(server_handle).await {
        error!("Server task failed: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();
}
