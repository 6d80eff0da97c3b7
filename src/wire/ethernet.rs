//! Minimal Ethernet II framing: just enough to wrap IPv4/IPv6 multicast
//! control traffic, plus the multicast MAC derivation rules from §4.2 of
//! SPEC_FULL.md.

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};

pub const HEADER_LEN: usize = 14;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthernetAddress(pub [u8; 6]);

impl EthernetAddress {
    pub const BROADCAST: EthernetAddress = EthernetAddress([0xff; 6]);

    /// Derives the IPv4 multicast MAC for `group`: `01:00:5e` followed by
    /// the low 23 bits of the group address.
    pub fn multicast_ipv4(group: core::net::Ipv4Addr) -> EthernetAddress {
        let o = group.octets();
        EthernetAddress([0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3]])
    }

    /// Derives the IPv6 multicast MAC for `group`: `33:33` followed by the
    /// low 32 bits of the group address.
    pub fn multicast_ipv6(group: core::net::Ipv6Addr) -> EthernetAddress {
        let o = group.octets();
        EthernetAddress([0x33, 0x33, o[12], o[13], o[14], o[15]])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repr {
    pub src_addr: EthernetAddress,
    pub dst_addr: EthernetAddress,
    pub ethertype: u16,
}

impl Repr {
    pub fn parse(buffer: &[u8]) -> Result<(Repr, &[u8])> {
        if buffer.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        let repr = Repr {
            dst_addr: EthernetAddress(buffer[0..6].try_into().unwrap()),
            src_addr: EthernetAddress(buffer[6..12].try_into().unwrap()),
            ethertype: NetworkEndian::read_u16(&buffer[12..14]),
        };
        Ok((repr, &buffer[HEADER_LEN..]))
    }

    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub fn emit(&self, buffer: &mut [u8]) {
        buffer[0..6].copy_from_slice(&self.dst_addr.0);
        buffer[6..12].copy_from_slice(&self.src_addr.0);
        NetworkEndian::write_u16(&mut buffer[12..14], self.ethertype);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multicast_mac_ipv4() {
        let group = "239.0.75.0".parse().unwrap();
        assert_eq!(
            EthernetAddress::multicast_ipv4(group).0,
            [0x01, 0x00, 0x5e, 0x00, 0x4b, 0x00]
        );
    }

    #[test]
    fn multicast_mac_ipv4_masks_high_bit() {
        let group = "225.130.75.9".parse().unwrap();
        // low 23 bits: clear bit 7 of the second octet.
        assert_eq!(
            EthernetAddress::multicast_ipv4(group).0,
            [0x01, 0x00, 0x5e, 0x02, 0x4b, 0x09]
        );
    }

    #[test]
    fn multicast_mac_ipv6() {
        let group = "ff02::1:ff00:1234".parse().unwrap();
        assert_eq!(
            EthernetAddress::multicast_ipv6(group).0,
            [0x33, 0x33, 0x00, 0x00, 0x12, 0x34]
        );
    }

    #[test]
    fn parse_round_trip() {
        let repr = Repr {
            src_addr: EthernetAddress([1, 2, 3, 4, 5, 6]),
            dst_addr: EthernetAddress([0x01, 0x00, 0x5e, 0, 0, 1]),
            ethertype: ETHERTYPE_IPV4,
        };
        let mut buf = [0u8; HEADER_LEN];
        repr.emit(&mut buf);
        let (parsed, rest) = Repr::parse(&buf).unwrap();
        assert_eq!(parsed, repr);
        assert!(rest.is_empty());
    }
}
