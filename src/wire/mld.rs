//! MLD v1/v2 wire codec (RFC 2710 / RFC 3810; RFC 9777 folds in errata but
//! does not change the wire format). Structurally the IPv6 twin of
//! `wire::igmp` (§2 point 9 of SPEC_FULL.md), re-parameterized for 16-byte
//! addresses and millisecond response-interval units.

use core::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};
use crate::wire::checksum;
pub use crate::wire::igmp::RecordType;

pub const TYPE_QUERY: u8 = 130;
pub const TYPE_V1_REPORT: u8 = 131;
pub const TYPE_V1_DONE: u8 = 132;
pub const TYPE_V2_REPORT: u8 = 143;

pub const V1_MESSAGE_LEN: usize = 24;
pub const V2_QUERY_MIN_LEN: usize = 28;
pub const V2_REPORT_MIN_LEN: usize = 8;
pub const V2_RECORD_MIN_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRecord {
    pub record_type: RecordType,
    pub group_addr: Ipv6Addr,
    pub num_sources: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr<'a> {
    Query {
        version: Version,
        max_resp_code: u16,
        group_addr: Ipv6Addr,
        s_flag: bool,
        qrv: u8,
        qqic: u8,
    },
    ReportV1 {
        group_addr: Ipv6Addr,
    },
    Done {
        group_addr: Ipv6Addr,
    },
    ReportV2 {
        records: RecordIter<'a>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordIter<'a> {
    data: &'a [u8],
    remaining: u16,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<GroupRecord>;

    fn next(&mut self) -> Option<Result<GroupRecord>> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        if self.data.len() < V2_RECORD_MIN_LEN {
            self.remaining = 0;
            return Some(Err(Error::Truncated));
        }
        let raw_type = self.data[0];
        let aux_data_len = self.data[1] as usize;
        let num_sources = NetworkEndian::read_u16(&self.data[2..4]);
        let group_addr = Ipv6Addr::from(<[u8; 16]>::try_from(&self.data[4..20]).unwrap());
        let record_len = V2_RECORD_MIN_LEN + num_sources as usize * 16 + aux_data_len * 4;
        if self.data.len() < record_len {
            self.remaining = 0;
            return Some(Err(Error::Truncated));
        }
        let record_type = match parse_record_type(raw_type) {
            Some(t) => t,
            None => {
                self.remaining = 0;
                return Some(Err(Error::Malformed));
            }
        };

        self.data = &self.data[record_len..];
        Some(Ok(GroupRecord {
            record_type,
            group_addr,
            num_sources,
        }))
    }
}

fn parse_record_type(v: u8) -> Option<RecordType> {
    Some(match v {
        1 => RecordType::ModeIsInclude,
        2 => RecordType::ModeIsExclude,
        3 => RecordType::ChangeToInclude,
        4 => RecordType::ChangeToExclude,
        5 => RecordType::AllowNewSources,
        6 => RecordType::BlockOldSources,
        _ => return None,
    })
}

impl<'a> Repr<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Repr<'a>> {
        if buffer.len() < 4 {
            return Err(Error::Truncated);
        }
        let mld_type = buffer[0];
        match mld_type {
            TYPE_QUERY => Self::parse_query(buffer),
            TYPE_V1_REPORT => Ok(Repr::ReportV1 {
                group_addr: addr_at(buffer, 8)?,
            }),
            TYPE_V1_DONE => Ok(Repr::Done {
                group_addr: addr_at(buffer, 8)?,
            }),
            TYPE_V2_REPORT => Self::parse_v2_report(buffer),
            _ => Err(Error::Malformed),
        }
    }

    fn parse_query(buffer: &'a [u8]) -> Result<Repr<'a>> {
        if buffer.len() < V1_MESSAGE_LEN {
            return Err(Error::Truncated);
        }
        let max_resp_code = NetworkEndian::read_u16(&buffer[4..6]);
        let group_addr = addr_at(buffer, 8)?;
        if buffer.len() < V2_QUERY_MIN_LEN {
            return Ok(Repr::Query {
                version: Version::V1,
                max_resp_code,
                group_addr,
                s_flag: false,
                qrv: 0,
                qqic: 0,
            });
        }
        let resv_s_qrv = buffer[24];
        let s_flag = resv_s_qrv & 0x08 != 0;
        let qrv = resv_s_qrv & 0x07;
        let qqic = buffer[25];
        Ok(Repr::Query {
            version: Version::V2,
            max_resp_code,
            group_addr,
            s_flag,
            qrv,
            qqic,
        })
    }

    fn parse_v2_report(buffer: &'a [u8]) -> Result<Repr<'a>> {
        if buffer.len() < V2_REPORT_MIN_LEN {
            return Err(Error::Truncated);
        }
        let num_records = NetworkEndian::read_u16(&buffer[6..8]);
        Ok(Repr::ReportV2 {
            records: RecordIter {
                data: &buffer[V2_REPORT_MIN_LEN..],
                remaining: num_records,
            },
        })
    }
}

fn addr_at(buffer: &[u8], offset: usize) -> Result<Ipv6Addr> {
    if buffer.len() < offset + 16 {
        return Err(Error::Truncated);
    }
    Ok(Ipv6Addr::from(
        <[u8; 16]>::try_from(&buffer[offset..offset + 16]).unwrap(),
    ))
}

/// Emits an MLDv1/v2-compatible general or group-specific query. The ICMPv6
/// checksum must be filled in afterwards by `wire::ipv6::Repr::emit` /
/// `recompute_checksum`, which is why the checksum field here is left zero.
pub fn emit_query(
    buffer: &mut [u8],
    version: Version,
    max_resp_code: u16,
    group_addr: Ipv6Addr,
    s_flag: bool,
    qrv: u8,
    qqic: u8,
) {
    buffer[0] = TYPE_QUERY;
    buffer[1] = 0;
    NetworkEndian::write_u16(&mut buffer[2..4], 0); // checksum, filled by IPv6 layer
    NetworkEndian::write_u16(&mut buffer[4..6], max_resp_code);
    NetworkEndian::write_u16(&mut buffer[6..8], 0);
    buffer[8..24].copy_from_slice(&group_addr.octets());
    if version == Version::V2 {
        buffer[24] = (if s_flag { 0x08 } else { 0 }) | (qrv & 0x07);
        buffer[25] = qqic;
        NetworkEndian::write_u16(&mut buffer[26..28], 0);
    }
}

pub fn query_len(version: Version) -> usize {
    match version {
        Version::V1 => V1_MESSAGE_LEN,
        Version::V2 => V2_QUERY_MIN_LEN,
    }
}

pub fn emit_report(buffer: &mut [u8], group_addr: Ipv6Addr) {
    buffer[0] = TYPE_V1_REPORT;
    buffer[1] = 0;
    NetworkEndian::write_u16(&mut buffer[2..4], 0);
    NetworkEndian::write_u16(&mut buffer[4..6], 0);
    NetworkEndian::write_u16(&mut buffer[6..8], 0);
    buffer[8..24].copy_from_slice(&group_addr.octets());
}

pub fn emit_done(buffer: &mut [u8], group_addr: Ipv6Addr) {
    buffer[0] = TYPE_V1_DONE;
    buffer[1] = 0;
    NetworkEndian::write_u16(&mut buffer[2..4], 0);
    NetworkEndian::write_u16(&mut buffer[4..6], 0);
    NetworkEndian::write_u16(&mut buffer[6..8], 0);
    buffer[8..24].copy_from_slice(&group_addr.octets());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn icmpv6_checksum_ok(src: Ipv6Addr, dst: Ipv6Addr, buf: &mut [u8]) {
        let src = src.octets();
        let dst = dst.octets();
        NetworkEndian::write_u16(&mut buf[2..4], 0);
        let sum = checksum::icmpv6_checksum(&src, &dst, buf);
        NetworkEndian::write_u16(&mut buf[2..4], sum);
        assert_eq!(checksum::icmpv6_checksum(&src, &dst, buf), 0);
    }

    #[test]
    fn v1_query_round_trip() {
        let mut buf = [0u8; V1_MESSAGE_LEN];
        let group = Ipv6Addr::UNSPECIFIED;
        emit_query(&mut buf, Version::V1, 1000, group, false, 0, 0);
        icmpv6_checksum_ok("fe80::1".parse().unwrap(), "ff02::1".parse().unwrap(), &mut buf);
        match Repr::parse(&buf).unwrap() {
            Repr::Query {
                version,
                max_resp_code,
                group_addr,
                ..
            } => {
                assert_eq!(version, Version::V1);
                assert_eq!(max_resp_code, 1000);
                assert_eq!(group_addr, group);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn v2_query_round_trip_with_s_flag() {
        let mut buf = [0u8; V2_QUERY_MIN_LEN];
        let group = "ff1e::1".parse().unwrap();
        emit_query(&mut buf, Version::V2, 5000, group, true, 2, 40);
        match Repr::parse(&buf).unwrap() {
            Repr::Query {
                version,
                group_addr,
                s_flag,
                qrv,
                qqic,
                ..
            } => {
                assert_eq!(version, Version::V2);
                assert_eq!(group_addr, group);
                assert!(s_flag);
                assert_eq!(qrv, 2);
                assert_eq!(qqic, 40);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn report_and_done_round_trip() {
        let group: Ipv6Addr = "ff1e::1".parse().unwrap();
        let mut buf = [0u8; V1_MESSAGE_LEN];
        emit_report(&mut buf, group);
        assert_eq!(Repr::parse(&buf).unwrap(), Repr::ReportV1 { group_addr: group });

        emit_done(&mut buf, group);
        assert_eq!(Repr::parse(&buf).unwrap(), Repr::Done { group_addr: group });
    }

    #[test]
    fn v2_report_truncated_third_of_three_records() {
        let g1: Ipv6Addr = "ff1e::1".parse().unwrap();
        let g2: Ipv6Addr = "ff1e::2".parse().unwrap();
        // Buffer holds two complete records and half of a third.
        let mut buf = vec![0u8; V2_REPORT_MIN_LEN + 2 * V2_RECORD_MIN_LEN + V2_RECORD_MIN_LEN / 2];
        buf[0] = TYPE_V2_REPORT;
        NetworkEndian::write_u16(&mut buf[6..8], 3);

        let rec = |buf: &mut [u8], off: usize, typ: u8, addr: Ipv6Addr| {
            buf[off] = typ;
            buf[off + 1] = 0;
            NetworkEndian::write_u16(&mut buf[off + 2..off + 4], 0);
            buf[off + 4..off + 20].copy_from_slice(&addr.octets());
        };
        rec(&mut buf, 8, 2, g1);
        rec(&mut buf, 8 + V2_RECORD_MIN_LEN, 2, g2);

        match Repr::parse(&buf).unwrap() {
            Repr::ReportV2 { records } => {
                let results: Vec<_> = records.collect();
                assert_eq!(results.len(), 3);
                assert!(results[0].is_ok());
                assert!(results[1].is_ok());
                assert!(results[2].is_err());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
