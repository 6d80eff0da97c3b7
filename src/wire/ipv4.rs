//! IPv4 header construction/parsing, Router Alert option included.

use core::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};
use crate::wire::checksum;

/// IHL=5 plus one 4-byte Router Alert option word.
pub const HEADER_LEN: usize = 24;
pub const ROUTER_ALERT_OPTION: [u8; 4] = [0x94, 0x04, 0x00, 0x00];

pub const PROTO_IGMP: u8 = 2;

pub const ALL_SYSTEMS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);
pub const ALL_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 2);
pub const ALL_SNOOPERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 106);

/// True for the link-local scope (224.0.0.0/24) that §4.3/§8 require this
/// crate to never track or bridge.
pub fn is_link_local(addr: Ipv4Addr) -> bool {
    addr.octets()[0..3] == [224, 0, 0]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub protocol: u8,
    pub payload_len: usize,
}

impl Repr {
    /// Parses a header with a mandatory Router Alert option, verifying the
    /// IP checksum. Returns the repr and the payload slice.
    pub fn parse(buffer: &[u8]) -> Result<(Repr, bool, &[u8])> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let version_ihl = buffer[0];
        let ihl = (version_ihl & 0x0f) as usize * 4;
        if ihl < 20 || buffer.len() < ihl {
            return Err(Error::Malformed);
        }
        let total_len = NetworkEndian::read_u16(&buffer[2..4]) as usize;
        if buffer.len() < total_len || total_len < ihl {
            return Err(Error::Truncated);
        }
        let checksum_ok = checksum::checksum(&buffer[0..ihl]) == 0;
        let protocol = buffer[9];
        let src_addr = Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]);
        let dst_addr = Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]);

        let has_router_alert = has_router_alert_option(&buffer[20..ihl]);

        let repr = Repr {
            src_addr,
            dst_addr,
            protocol,
            payload_len: total_len - ihl,
        };
        Ok((repr, has_router_alert, &buffer[ihl..total_len]))
    }

    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    /// Emits the header (IHL=5+RA, TTL=1, TOS=0xC0, DF set) with the
    /// checksum computed over the just-written header bytes.
    pub fn emit(&self, buffer: &mut [u8]) {
        let total_len = self.buffer_len();
        buffer[0] = 0x46; // version 4, IHL = 6 32-bit words (24 bytes)
        buffer[1] = 0xc0; // TOS
        NetworkEndian::write_u16(&mut buffer[2..4], total_len as u16);
        NetworkEndian::write_u16(&mut buffer[4..6], 0); // identification
        NetworkEndian::write_u16(&mut buffer[6..8], 0x4000); // flags=DF, no fragment offset
        buffer[8] = 1; // TTL
        buffer[9] = self.protocol;
        NetworkEndian::write_u16(&mut buffer[10..12], 0); // checksum placeholder
        buffer[12..16].copy_from_slice(&self.src_addr.octets());
        buffer[16..20].copy_from_slice(&self.dst_addr.octets());
        buffer[20..24].copy_from_slice(&ROUTER_ALERT_OPTION);

        let sum = checksum::checksum(&buffer[0..HEADER_LEN]);
        NetworkEndian::write_u16(&mut buffer[10..12], sum);
    }

    /// Recomputes only the IP checksum in an already-emitted header, for the
    /// "patch mutable fields, recompute checksum at send time" codec
    /// contract in §4.2 of SPEC_FULL.md.
    pub fn recompute_checksum(buffer: &mut [u8]) {
        let ihl = ((buffer[0] & 0x0f) as usize) * 4;
        NetworkEndian::write_u16(&mut buffer[10..12], 0);
        let sum = checksum::checksum(&buffer[0..ihl]);
        NetworkEndian::write_u16(&mut buffer[10..12], sum);
    }
}

fn has_router_alert_option(options: &[u8]) -> bool {
    let mut i = 0;
    while i + 1 < options.len() {
        let kind = options[i];
        if kind == 0x00 {
            break; // end of options
        }
        if kind == 0x01 {
            i += 1; // NOP, 1 byte
            continue;
        }
        let len = options.get(i + 1).copied().unwrap_or(0) as usize;
        if len < 2 || i + len > options.len() {
            break;
        }
        if kind == 0x94 {
            return true;
        }
        i += len;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_checksums_to_zero() {
        let repr = Repr {
            src_addr: Ipv4Addr::new(10, 0, 0, 1),
            dst_addr: ALL_SYSTEMS,
            protocol: PROTO_IGMP,
            payload_len: 8,
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        repr.emit(&mut buf);
        assert_eq!(checksum::checksum(&buf[0..HEADER_LEN]), 0);
    }

    #[test]
    fn parse_detects_router_alert() {
        let repr = Repr {
            src_addr: Ipv4Addr::new(10, 0, 0, 1),
            dst_addr: ALL_SYSTEMS,
            protocol: PROTO_IGMP,
            payload_len: 0,
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        repr.emit(&mut buf);
        let (parsed, ra, _payload) = Repr::parse(&buf).unwrap();
        assert_eq!(parsed, repr);
        assert!(ra);
    }

    #[test]
    fn is_link_local_matches_224_0_0_slash_24() {
        assert!(is_link_local(Ipv4Addr::new(224, 0, 0, 251)));
        assert!(!is_link_local(Ipv4Addr::new(224, 0, 1, 1)));
        assert!(!is_link_local(Ipv4Addr::new(239, 0, 75, 0)));
    }
}
