//! Authentication Module
//!
//! Single-identity authentication of request headers.

pub mod identity;

pub use identity::AcceptedIdentity;
