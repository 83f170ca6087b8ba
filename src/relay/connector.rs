//! Upstream Connector

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::RelayError;

/// Opens the upstream TCP connection for a session
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, RelayError>;
}

/// Connects directly over TCP, trying each resolved address once
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    connect_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each connect attempt (and DNS resolution) by `connect_timeout`
    pub fn with_timeout(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }

    /// Create a connector from configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::with_timeout(config.server.connect_timeout)
    }

    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        debug!("Resolving domain: {}:{}", host, port);
        let addrs: Vec<SocketAddr> = self.bounded(lookup_host((host, port))).await??.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("DNS resolution returned no addresses for {}", host),
            ));
        }
        debug!("Resolved {} to {} addresses", host, addrs.len());
        Ok(addrs)
    }

    async fn bounded<F: std::future::Future>(&self, fut: F) -> io::Result<F::Output> {
        match self.connect_timeout {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "timed out")),
            None => Ok(fut.await),
        }
    }

    async fn try_connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_error = None;
        for addr in self.resolve(host, port).await? {
            match self.bounded(TcpStream::connect(addr)).await.and_then(|r| r) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")))
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<TcpStream, RelayError> {
        self.try_connect(host, port)
            .await
            .map_err(|source| RelayError::UpstreamConnectFailed {
                host: host.to_string(),
                port,
                source,
            })
    }
}
