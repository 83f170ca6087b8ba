//! VLESS Protocol Implementation
//!
//! Decoding of the request header carried in the first binary frame.

pub mod address;
pub mod constants;
pub mod header;
pub mod types;

pub use address::decode_address;
pub use constants::*;
pub use header::parse_header;
pub use types::*;
