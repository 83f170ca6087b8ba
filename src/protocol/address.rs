//! Target Address Decoding

use std::net::{Ipv4Addr, Ipv6Addr};

use super::TargetAddr;
use crate::error::RelayError;
use crate::protocol::constants::*;

/// Decode the address value that follows an address type tag.
///
/// `buf` starts at the first byte of the address value. Returns the decoded
/// address and the number of bytes it occupied, including the domain length
/// byte for domain addresses.
pub fn decode_address(address_type: u8, buf: &[u8]) -> Result<(TargetAddr, usize), RelayError> {
    match address_type {
        VLESS_ADDR_IPV4 => {
            let octets: [u8; 4] = take(buf, 0, 4)?
                .try_into()
                .map_err(|_| RelayError::HeaderTooShort)?;
            Ok((TargetAddr::Ipv4(Ipv4Addr::from(octets)), 4))
        }
        VLESS_ADDR_DOMAIN => {
            let domain_len = *buf.first().ok_or(RelayError::HeaderTooShort)? as usize;
            if domain_len == 0 {
                return Err(RelayError::EmptyAddress);
            }

            let domain_bytes = take(buf, 1, domain_len)?;
            let domain = std::str::from_utf8(domain_bytes)
                .map_err(|_| RelayError::InvalidDomain)?;

            Ok((TargetAddr::Domain(domain.to_string()), 1 + domain_len))
        }
        VLESS_ADDR_IPV6 => {
            let octets: [u8; 16] = take(buf, 0, 16)?
                .try_into()
                .map_err(|_| RelayError::HeaderTooShort)?;
            Ok((TargetAddr::Ipv6(Ipv6Addr::from(octets)), 16))
        }
        other => Err(RelayError::UnsupportedAddressType(other)),
    }
}

fn take(buf: &[u8], start: usize, len: usize) -> Result<&[u8], RelayError> {
    buf.get(start..start + len).ok_or(RelayError::HeaderTooShort)
}
