//! VLESS Protocol Constants

// Commands
pub const VLESS_CMD_TCP: u8 = 0x01;
pub const VLESS_CMD_UDP: u8 = 0x02;
pub const VLESS_CMD_MUX: u8 = 0x03;

// Address Types
pub const VLESS_ADDR_IPV4: u8 = 0x01;
pub const VLESS_ADDR_DOMAIN: u8 = 0x02;
pub const VLESS_ADDR_IPV6: u8 = 0x03;

// Header layout
pub const VLESS_IDENTITY_LEN: usize = 16;
pub const VLESS_IDENTITY_OFFSET: usize = 1;
pub const VLESS_ADDON_LEN_OFFSET: usize = VLESS_IDENTITY_OFFSET + VLESS_IDENTITY_LEN;

/// Smallest frame that can carry a complete header with a 1-byte address payload.
pub const VLESS_MIN_HEADER_LEN: usize = 24;

// Second byte of the response prefix (addons length, always empty)
pub const VLESS_RESPONSE_ADDONS: u8 = 0x00;
