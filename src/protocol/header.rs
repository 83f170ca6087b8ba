//! VLESS Request Header Parser
//!
//! ```text
//! +-----+----------+-----+--------+-----+------+------+---------+---------+
//! | VER | IDENTITY |  M  | ADDONS | CMD | PORT | ATYP |  ADDR   | PAYLOAD |
//! +-----+----------+-----+--------+-----+------+------+---------+---------+
//! |  1  |    16    |  1  |   M    |  1  |  2   |  1   | var len |  rest   |
//! +-----+----------+-----+--------+-----+------+------+---------+---------+
//! ```

use super::address::decode_address;
use super::{Command, ParsedHeader};
use crate::auth::AcceptedIdentity;
use crate::error::RelayError;
use crate::protocol::constants::*;

/// Parse the request header at the start of the first binary frame.
///
/// The identity is checked before anything past it is decoded. Every field
/// offset after the addons depends on `M`, so the cursor only ever advances
/// by what has actually been read.
pub fn parse_header(frame: &[u8], identity: &AcceptedIdentity) -> Result<ParsedHeader, RelayError> {
    if frame.len() < VLESS_MIN_HEADER_LEN {
        return Err(RelayError::HeaderTooShort);
    }

    let version = frame[0];

    let mut presented = [0u8; VLESS_IDENTITY_LEN];
    presented.copy_from_slice(&frame[VLESS_IDENTITY_OFFSET..VLESS_ADDON_LEN_OFFSET]);
    identity.authenticate(&presented)?;

    let addon_len = frame[VLESS_ADDON_LEN_OFFSET] as usize;
    let mut cursor = VLESS_ADDON_LEN_OFFSET + 1 + addon_len;

    let command_code = read_u8(frame, cursor)?;
    cursor += 1;
    let command = match Command::from_code(command_code) {
        Some(Command::Tcp) => Command::Tcp,
        _ => return Err(RelayError::UnsupportedCommand(command_code)),
    };

    let port_bytes = frame
        .get(cursor..cursor + 2)
        .ok_or(RelayError::HeaderTooShort)?;
    let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
    cursor += 2;

    let address_type = read_u8(frame, cursor)?;
    cursor += 1;

    let (target, consumed) = decode_address(address_type, &frame[cursor..])?;
    cursor += consumed;

    Ok(ParsedHeader {
        version,
        identity: presented,
        command,
        target,
        port,
        payload_offset: cursor,
    })
}

fn read_u8(frame: &[u8], offset: usize) -> Result<u8, RelayError> {
    frame.get(offset).copied().ok_or(RelayError::HeaderTooShort)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TargetAddr;

    const ID: &str = "d342d11e-d424-4583-b36e-524ab1f0afa4";

    fn identity() -> AcceptedIdentity {
        AcceptedIdentity::parse(ID).unwrap()
    }

    fn id_bytes() -> [u8; 16] {
        *uuid::Uuid::parse_str(ID).unwrap().as_bytes()
    }

    fn frame(addons: &[u8], command: u8, port: u16, address: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x00];
        buf.extend_from_slice(&id_bytes());
        buf.push(addons.len() as u8);
        buf.extend_from_slice(addons);
        buf.push(command);
        buf.extend_from_slice(&port.to_be_bytes());
        buf.extend_from_slice(address);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_domain_header_with_payload() {
        let mut address = vec![VLESS_ADDR_DOMAIN, 9];
        address.extend_from_slice(b"localhost");
        let buf = frame(&[], VLESS_CMD_TCP, 80, &address, b"GET / \r\n");

        let header = parse_header(&buf, &identity()).unwrap();
        assert_eq!(header.version, 0);
        assert_eq!(header.command, Command::Tcp);
        assert_eq!(header.port, 80);
        assert_eq!(header.target, TargetAddr::Domain("localhost".to_string()));
        assert_eq!(&buf[header.payload_offset..], b"GET / \r\n");
        assert_eq!(header.response_prefix(), [0x00, 0x00]);
    }

    #[test]
    fn test_addons_shift_every_offset() {
        let address = [VLESS_ADDR_IPV4, 10, 0, 0, 7];
        let buf = frame(&[0xaa; 5], VLESS_CMD_TCP, 8443, &address, b"xyz");

        let header = parse_header(&buf, &identity()).unwrap();
        assert_eq!(header.host(), "10.0.0.7");
        assert_eq!(header.port, 8443);
        assert_eq!(header.payload_offset, 18 + 5 + 1 + 2 + 1 + 4);
        assert_eq!(&buf[header.payload_offset..], b"xyz");
    }

    #[test]
    fn test_header_without_payload() {
        let mut address = vec![VLESS_ADDR_IPV6];
        address.extend_from_slice(&[0u8; 16]);
        let buf = frame(&[], VLESS_CMD_TCP, 443, &address, &[]);

        let header = parse_header(&buf, &identity()).unwrap();
        assert_eq!(header.payload_offset, buf.len());
    }

    #[test]
    fn test_short_frame() {
        let buf = frame(&[], VLESS_CMD_TCP, 80, &[VLESS_ADDR_DOMAIN, 1], &[]);
        assert_eq!(buf.len(), 23);
        assert!(matches!(
            parse_header(&buf, &identity()),
            Err(RelayError::HeaderTooShort)
        ));
    }

    #[test]
    fn test_addon_length_past_end() {
        let mut buf = frame(&[], VLESS_CMD_TCP, 80, &[VLESS_ADDR_IPV4, 1, 1, 1, 1], &[]);
        buf[VLESS_ADDON_LEN_OFFSET] = 200;
        assert!(matches!(
            parse_header(&buf, &identity()),
            Err(RelayError::HeaderTooShort)
        ));
    }

    #[test]
    fn test_auth_checked_before_address() {
        // Garbage address type would be rejected if it were decoded first
        let mut buf = frame(&[], VLESS_CMD_TCP, 80, &[0x09, 1, 1, 1, 1], &[]);
        buf[1] ^= 0xff;
        assert!(matches!(
            parse_header(&buf, &identity()),
            Err(RelayError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_udp_and_mux_rejected() {
        let address = [VLESS_ADDR_IPV4, 8, 8, 8, 8];
        for command in [VLESS_CMD_UDP, VLESS_CMD_MUX, 0x00, 0x7f] {
            let buf = frame(&[], command, 53, &address, &[]);
            match parse_header(&buf, &identity()) {
                Err(RelayError::UnsupportedCommand(code)) => assert_eq!(code, command),
                other => panic!("expected UnsupportedCommand, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_unsupported_address_type() {
        let buf = frame(&[], VLESS_CMD_TCP, 80, &[0x04, 1, 2, 3, 4], &[]);
        assert!(matches!(
            parse_header(&buf, &identity()),
            Err(RelayError::UnsupportedAddressType(4))
        ));
    }
}
