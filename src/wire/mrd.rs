//! Multicast Router Discovery (RFC 4286) wire codec, shared between the IGMP
//! and MLD subsystems.

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};
use crate::wire::checksum;

pub const IGMP_TYPE_ADVERTISEMENT: u8 = 0x30;
pub const IGMP_TYPE_SOLICITATION: u8 = 0x31;
#[allow(dead_code)]
pub const IGMP_TYPE_TERMINATION: u8 = 0x32;

pub const ICMPV6_TYPE_ADVERTISEMENT: u8 = 151;
pub const ICMPV6_TYPE_SOLICITATION: u8 = 152;
#[allow(dead_code)]
pub const ICMPV6_TYPE_TERMINATION: u8 = 153;

pub const ADVERTISEMENT_LEN: usize = 8;
pub const SOLICITATION_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    Advertisement { interval: u16, qrv: u8, qqic: u8 },
    Solicitation,
}

impl Repr {
    pub fn parse(buffer: &[u8], advertisement_type: u8, solicitation_type: u8) -> Result<Repr> {
        if buffer.len() < 4 {
            return Err(Error::Truncated);
        }
        let msg_type = buffer[0];
        if msg_type == advertisement_type {
            if buffer.len() < ADVERTISEMENT_LEN {
                return Err(Error::Truncated);
            }
            let qqic = buffer[4];
            let qrv = buffer[5];
            let interval = NetworkEndian::read_u16(&buffer[6..8]);
            Ok(Repr::Advertisement { interval, qrv, qqic })
        } else if msg_type == solicitation_type {
            Ok(Repr::Solicitation)
        } else {
            Err(Error::Malformed)
        }
    }

    /// Emits the message with the checksum field (bytes 2-3) left zero. IGMP
    /// callers (self-contained checksum, no pseudo-header) must compute and
    /// write it themselves afterwards with `wire::checksum::checksum`; ICMPv6
    /// callers defer to `wire::ipv6::Repr::emit`, matching `mld::emit_query`.
    pub fn emit(&self, buffer: &mut [u8], advertisement_type: u8, solicitation_type: u8) {
        match *self {
            Repr::Advertisement { interval, qrv, qqic } => {
                buffer[0] = advertisement_type;
                buffer[1] = 0;
                NetworkEndian::write_u16(&mut buffer[2..4], 0);
                buffer[4] = qqic;
                buffer[5] = qrv;
                NetworkEndian::write_u16(&mut buffer[6..8], interval);
            }
            Repr::Solicitation => {
                buffer[0] = solicitation_type;
                buffer[1] = 0;
                NetworkEndian::write_u16(&mut buffer[2..4], 0);
            }
        }
    }

    /// Computes and writes the self-contained IGMP checksum over an
    /// already-emitted advertisement/solicitation. IGMP callers only; ICMPv6
    /// callers get their checksum from `ipv6::Repr::emit`'s pseudo-header
    /// computation instead.
    pub fn fill_igmp_checksum(buffer: &mut [u8]) {
        NetworkEndian::write_u16(&mut buffer[2..4], 0);
        let sum = checksum::checksum(buffer);
        NetworkEndian::write_u16(&mut buffer[2..4], sum);
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::Advertisement { .. } => ADVERTISEMENT_LEN,
            Repr::Solicitation => SOLICITATION_LEN,
        }
    }
}
