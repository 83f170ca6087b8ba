//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM/SIGINT, tells the HTTP server to stop accepting, and
//! bounds how long the server task may take to finish.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx, timeout }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// A future that resolves once shutdown has been triggered
    pub fn signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.subscribe();
        async move {
            // A closed channel also means shutdown
            let _ = shutdown_rx.recv().await;
        }
    }

    /// Broadcast shutdown to all subscribers
    pub fn trigger(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal: {}", e);
        }
    }

    /// Start listening for shutdown signals (SIGTERM, SIGINT)
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Wait for a task to finish, aborting it once the shutdown timeout expires
    pub async fn wait_for_task(&self, mut handle: JoinHandle<Result<()>>) -> Result<()> {
        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_cancelled() => {
                debug!("Task was cancelled");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Task failed: {}", e);
                Err(anyhow::anyhow!("Task failed: {}", e))
            }
            Err(_) => {
                warn!("Shutdown timeout of {:?} reached, aborting task", self.timeout);
                handle.abort();
                Ok(())
            }
        }
    }
}
