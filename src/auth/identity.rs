//! Accepted Identity

use std::fmt;
use uuid::{Uuid, Variant};

use crate::error::RelayError;
use crate::protocol::constants::VLESS_IDENTITY_LEN;

const HYPHENATED_LEN: usize = 36;

/// The single identity this process accepts.
///
/// Stored as 32 lowercase hex digits, separators removed. Only constructed
/// from a syntactically valid UUID.
#[derive(Clone, PartialEq, Eq)]
pub struct AcceptedIdentity {
    hex: String,
}

impl AcceptedIdentity {
    /// Parse the configured value.
    ///
    /// Only the hyphenated 8-4-4-4-12 form of an RFC 4122 UUID (version 1 to 5)
    /// is accepted. Braced, urn, hyphenless, padded and nil values are `None`.
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != HYPHENATED_LEN {
            return None;
        }
        let uuid = Uuid::parse_str(value).ok()?;
        if !uuid.hyphenated().to_string().eq_ignore_ascii_case(value) {
            return None;
        }
        if !(1..=5).contains(&uuid.get_version_num()) || uuid.get_variant() != Variant::RFC4122 {
            return None;
        }

        Some(Self {
            hex: uuid.simple().to_string(),
        })
    }

    /// Check the raw identity bytes of a request header.
    pub fn authenticate(&self, identity: &[u8; VLESS_IDENTITY_LEN]) -> Result<(), RelayError> {
        let presented = Uuid::from_bytes(*identity).simple().to_string();
        if secure_compare(&presented, &self.hex) {
            Ok(())
        } else {
            Err(RelayError::AuthenticationFailed)
        }
    }
}

// Never print the identity; it is a bearer secret.
impl fmt::Debug for AcceptedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptedIdentity").finish_non_exhaustive()
    }
}

/// Case-insensitive comparison that does not short-circuit on content
fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a.to_ascii_lowercase() ^ byte_b.to_ascii_lowercase();
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "d342d11e-d424-4583-b36e-524ab1f0afa4";
    const ID_BYTES: [u8; 16] = [
        0xd3, 0x42, 0xd1, 0x1e, 0xd4, 0x24, 0x45, 0x83, 0xb3, 0x6e, 0x52, 0x4a, 0xb1, 0xf0, 0xaf,
        0xa4,
    ];

    #[test]
    fn test_matching_identity() {
        let identity = AcceptedIdentity::parse(ID).unwrap();
        assert!(identity.authenticate(&ID_BYTES).is_ok());
    }

    #[test]
    fn test_uppercase_configured_identity() {
        let identity = AcceptedIdentity::parse(&ID.to_uppercase()).unwrap();
        assert!(identity.authenticate(&ID_BYTES).is_ok());
    }

    #[test]
    fn test_mismatched_identity() {
        let identity = AcceptedIdentity::parse(ID).unwrap();
        let mut other = ID_BYTES;
        other[15] ^= 0x01;
        assert!(matches!(
            identity.authenticate(&other),
            Err(RelayError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_invalid_configured_values() {
        assert!(AcceptedIdentity::parse("").is_none());
        assert!(AcceptedIdentity::parse("not-a-uuid").is_none());
        assert!(AcceptedIdentity::parse("d342d11e-d424-4583-b36e-524ab1f0afa").is_none());
        assert!(AcceptedIdentity::parse("{d342d11e-d424-4583-b36e-524ab1f0afa4}").is_none());
        assert!(AcceptedIdentity::parse("urn:uuid:d342d11e-d424-4583-b36e-524ab1f0afa4").is_none());
        assert!(AcceptedIdentity::parse(" d342d11e-d424-4583-b36e-524ab1f0afa4 ").is_none());
        assert!(AcceptedIdentity::parse("d342d11ed4244583b36e524ab1f0afa4").is_none());
        assert!(AcceptedIdentity::parse("00000000-0000-0000-0000-000000000000").is_none());
    }

    #[test]
    fn test_version_and_variant_checked() {
        // version 0
        assert!(AcceptedIdentity::parse("d342d11e-d424-0583-b36e-524ab1f0afa4").is_none());
        // version 6
        assert!(AcceptedIdentity::parse("d342d11e-d424-6583-b36e-524ab1f0afa4").is_none());
        // Microsoft variant
        assert!(AcceptedIdentity::parse("d342d11e-d424-4583-c36e-524ab1f0afa4").is_none());
        // version 1, variant 8
        assert!(AcceptedIdentity::parse("d342d11e-d424-1583-836e-524ab1f0afa4").is_some());
    }

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare("abcdef", "ABCDEF"));
        assert!(!secure_compare("abcdef", "abcdee"));
        assert!(!secure_compare("abcdef", "abcde"));
    }

    #[test]
    fn test_debug_hides_identity() {
        let identity = AcceptedIdentity::parse(ID).unwrap();
        assert!(!format!("{:?}", identity).contains("d342"));
    }
}
