//! Data Relay Module
//!
//! Per-connection relay between the client transport and the upstream target.

pub mod connector;
pub mod frame;
pub mod session;

pub use connector::{Connector, TcpConnector};
pub use frame::Frame;
pub use session::{RelaySession, Session, SessionState, SessionStats, RELAY_BUFFER_SIZE};
