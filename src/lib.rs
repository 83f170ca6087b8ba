//! vlessproxy Library
//!
//! VLESS over WebSocket relay. The first binary frame of each WebSocket
//! carries a VLESS request header; once it is authenticated and decoded, the
//! socket is relayed byte for byte to the TCP target it names.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod shutdown;

pub use auth::AcceptedIdentity;
pub use config::Config;
pub use error::RelayError;
pub use relay::RelaySession;
pub use server::VlessServer;
pub use shutdown::ShutdownCoordinator;

/// Common error type for process-level code
pub type Result<T> = anyhow::Result<T>;
