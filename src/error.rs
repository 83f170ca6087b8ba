//! Relay Error Types

use std::io;

/// Errors that terminate a single relay session.
///
/// None of these are ever reported back to the client; the session is closed
/// and the error only reaches the log and the metrics registry.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("header too short")]
    HeaderTooShort,
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("unsupported command: {0}")]
    UnsupportedCommand(u8),
    #[error("unsupported address type: {0}")]
    UnsupportedAddressType(u8),
    #[error("empty address")]
    EmptyAddress,
    /// Rejected at decode time rather than decoded lossily and left for DNS to
    /// fail. The client sees the same silent close either way.
    #[error("domain is not valid utf-8")]
    InvalidDomain,
    #[error("failed to connect to {host}:{port}: {source}")]
    UpstreamConnectFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("relay io: {0}")]
    RelayIo(#[from] io::Error),
    #[error("transport: {0}")]
    Transport(String),
}

impl RelayError {
    /// Short label used for log fields and the metrics `kind` label.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::HeaderTooShort => "header_too_short",
            RelayError::AuthenticationFailed => "auth_failed",
            RelayError::UnsupportedCommand(_) => "unsupported_command",
            RelayError::UnsupportedAddressType(_) => "unsupported_address_type",
            RelayError::EmptyAddress => "empty_address",
            RelayError::InvalidDomain => "invalid_domain",
            RelayError::UpstreamConnectFailed { .. } => "upstream_connect_failed",
            RelayError::RelayIo(_) => "relay_io",
            RelayError::Transport(_) => "transport",
        }
    }

    /// Wrap a transport-level error (WebSocket or test double).
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        RelayError::Transport(err.to_string())
    }
}
