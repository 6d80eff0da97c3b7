//! IPv6 header construction/parsing with a Hop-by-Hop Router Alert option,
//! plus the ICMPv6 checksum MLD rides on.

use core::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};
use crate::wire::checksum;

pub const HEADER_LEN: usize = 40;
/// Hop-by-Hop header: next-header(1) + hdr-ext-len(1, =0 meaning 8 bytes) +
/// Router Alert option (4 bytes: type=5,len=2,value) + PadN to 8-byte
/// boundary (2 bytes).
pub const HBH_LEN: usize = 8;

pub const NXT_HDR_HOP_BY_HOP: u8 = 0;
pub const NXT_HDR_ICMPV6: u8 = 58;

pub const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
pub const ALL_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2);
pub const ALL_MLDV2_ROUTERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x16);
pub const ALL_SNOOPERS: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x6a);

/// True for ff02::/16, the link-local multicast scope §4.3/§8 require this
/// crate to never track or bridge.
pub fn is_link_local(addr: Ipv6Addr) -> bool {
    addr.segments()[0] == 0xff02
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
    pub payload_len: usize,
}

impl Repr {
    /// Parses an IPv6 header followed by a mandatory Hop-by-Hop Router
    /// Alert extension header, returning the repr and the ICMPv6 payload.
    pub fn parse(buffer: &[u8]) -> Result<(Repr, bool, &[u8])> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let version = buffer[0] >> 4;
        if version != 6 {
            return Err(Error::Malformed);
        }
        let payload_len = NetworkEndian::read_u16(&buffer[4..6]) as usize;
        let mut next_header = buffer[6];
        let src_addr = Ipv6Addr::from(<[u8; 16]>::try_from(&buffer[8..24]).unwrap());
        let dst_addr = Ipv6Addr::from(<[u8; 16]>::try_from(&buffer[24..40]).unwrap());

        if buffer.len() < HEADER_LEN + payload_len {
            return Err(Error::Truncated);
        }
        let mut rest = &buffer[HEADER_LEN..HEADER_LEN + payload_len];
        let mut has_router_alert = false;

        if next_header == NXT_HDR_HOP_BY_HOP {
            if rest.len() < HBH_LEN {
                return Err(Error::Truncated);
            }
            next_header = rest[0];
            let hdr_ext_len = rest[1] as usize;
            let ext_len = (hdr_ext_len + 1) * 8;
            if rest.len() < ext_len {
                return Err(Error::Truncated);
            }
            has_router_alert = has_router_alert_option(&rest[2..ext_len]);
            rest = &rest[ext_len..];
        }

        if next_header != NXT_HDR_ICMPV6 {
            return Err(Error::Malformed);
        }

        let repr = Repr {
            src_addr,
            dst_addr,
            payload_len: rest.len(),
        };
        Ok((repr, has_router_alert, rest))
    }

    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + HBH_LEN + self.payload_len
    }

    /// Emits the header (hop limit 1, traffic class 0) with a Hop-by-Hop
    /// Router Alert extension and the ICMPv6 payload's checksum field
    /// computed via the pseudo-header.
    pub fn emit(&self, buffer: &mut [u8]) {
        let icmp_len = self.payload_len;
        buffer[0] = 0x60; // version 6, traffic class/flow label = 0
        buffer[1] = 0;
        buffer[2] = 0;
        buffer[3] = 0;
        NetworkEndian::write_u16(&mut buffer[4..6], (HBH_LEN + icmp_len) as u16);
        buffer[6] = NXT_HDR_HOP_BY_HOP;
        buffer[7] = 1; // hop limit
        buffer[8..24].copy_from_slice(&self.src_addr.octets());
        buffer[24..40].copy_from_slice(&self.dst_addr.octets());

        let hbh = &mut buffer[HEADER_LEN..HEADER_LEN + HBH_LEN];
        hbh[0] = NXT_HDR_ICMPV6;
        hbh[1] = 0; // hdr ext len = 0 -> 8 bytes total
        hbh[2] = 0x05; // Router Alert option type
        hbh[3] = 0x02; // option length
        hbh[4] = 0x00; // value: MLD
        hbh[5] = 0x00;
        hbh[6] = 0x01; // PadN option type
        hbh[7] = 0x00; // PadN length 0

        let icmp_start = HEADER_LEN + HBH_LEN;
        let src = self.src_addr.octets();
        let dst = self.dst_addr.octets();
        // checksum field within the ICMPv6 payload is at bytes [2..4]; the
        // caller is expected to have zeroed it before calling emit.
        let sum = checksum::icmpv6_checksum(&src, &dst, &buffer[icmp_start..icmp_start + icmp_len]);
        NetworkEndian::write_u16(&mut buffer[icmp_start + 2..icmp_start + 4], sum);
    }

    /// Recomputes only the ICMPv6 checksum of an already-emitted packet, for
    /// the "patch mutable fields, recompute checksum at send time" codec
    /// contract (§4.2 of SPEC_FULL.md).
    pub fn recompute_checksum(buffer: &mut [u8]) {
        let src: [u8; 16] = buffer[8..24].try_into().unwrap();
        let dst: [u8; 16] = buffer[24..40].try_into().unwrap();
        let icmp_start = HEADER_LEN + HBH_LEN;
        let icmp_len = buffer.len() - icmp_start;
        NetworkEndian::write_u16(&mut buffer[icmp_start + 2..icmp_start + 4], 0);
        let sum = checksum::icmpv6_checksum(&src, &dst, &buffer[icmp_start..icmp_start + icmp_len]);
        NetworkEndian::write_u16(&mut buffer[icmp_start + 2..icmp_start + 4], sum);
    }
}

fn has_router_alert_option(mut options: &[u8]) -> bool {
    while options.len() >= 2 {
        let kind = options[0];
        if kind == 0x00 {
            // Pad1
            options = &options[1..];
            continue;
        }
        let len = options[1] as usize;
        if 2 + len > options.len() {
            break;
        }
        if kind == 0x05 {
            return true;
        }
        options = &options[2 + len..];
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icmp_payload(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[test]
    fn emit_checksums_to_zero() {
        let payload = icmp_payload(24);
        let repr = Repr {
            src_addr: "fe80::1".parse().unwrap(),
            dst_addr: ALL_NODES,
            payload_len: payload.len(),
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        buf[HEADER_LEN + HBH_LEN..].copy_from_slice(&payload);
        repr.emit(&mut buf);

        let icmp_start = HEADER_LEN + HBH_LEN;
        let src: [u8; 16] = buf[8..24].try_into().unwrap();
        let dst: [u8; 16] = buf[24..40].try_into().unwrap();
        let sum = checksum::icmpv6_checksum(&src, &dst, &buf[icmp_start..]);
        assert_eq!(sum, 0);
    }

    #[test]
    fn parse_round_trip_detects_router_alert() {
        let repr = Repr {
            src_addr: "fe80::1".parse().unwrap(),
            dst_addr: ALL_NODES,
            payload_len: 8,
        };
        let mut buf = vec![0u8; repr.buffer_len()];
        repr.emit(&mut buf);
        let (parsed, ra, payload) = Repr::parse(&buf).unwrap();
        assert_eq!(parsed, repr);
        assert!(ra);
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn is_link_local_matches_ff02_slash_16() {
        assert!(is_link_local("ff02::1".parse().unwrap()));
        assert!(!is_link_local("ff0e::1".parse().unwrap()));
        assert!(!is_link_local("ff1e::1".parse().unwrap()));
    }
}
