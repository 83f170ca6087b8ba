//! VLESS Protocol Types

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use crate::protocol::constants::*;

/// Request command carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Tcp,
    Udp,
    Mux,
}

impl Command {
    /// Get the wire code for this command
    pub fn command_code(&self) -> u8 {
        match self {
            Command::Tcp => VLESS_CMD_TCP,
            Command::Udp => VLESS_CMD_UDP,
            Command::Mux => VLESS_CMD_MUX,
        }
    }

    /// Create from wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            VLESS_CMD_TCP => Some(Command::Tcp),
            VLESS_CMD_UDP => Some(Command::Udp),
            VLESS_CMD_MUX => Some(Command::Mux),
            _ => None,
        }
    }
}

/// Target address decoded from the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

impl TargetAddr {
    /// Get the address type code for this address
    pub fn address_type(&self) -> u8 {
        match self {
            TargetAddr::Ipv4(_) => VLESS_ADDR_IPV4,
            TargetAddr::Domain(_) => VLESS_ADDR_DOMAIN,
            TargetAddr::Ipv6(_) => VLESS_ADDR_IPV6,
        }
    }
}

/// Canonical host string: dotted quad, domain as sent, or eight
/// zero-padded lowercase hex groups without compression.
impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip) => write!(f, "{}", ip),
            TargetAddr::Domain(domain) => f.write_str(domain),
            TargetAddr::Ipv6(ip) => {
                for (i, segment) in ip.segments().iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{:04x}", segment)?;
                }
                Ok(())
            }
        }
    }
}

/// Fully decoded request header from the first binary frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub version: u8,
    pub identity: [u8; VLESS_IDENTITY_LEN],
    pub command: Command,
    pub target: TargetAddr,
    pub port: u16,
    /// Index into the first frame where client payload begins
    pub payload_offset: usize,
}

impl ParsedHeader {
    /// Host string used for connecting and for diagnostics
    pub fn host(&self) -> String {
        self.target.to_string()
    }

    /// The two-byte prefix sent before the first relayed upstream byte
    pub fn response_prefix(&self) -> [u8; 2] {
        [self.version, VLESS_RESPONSE_ADDONS]
    }
}
