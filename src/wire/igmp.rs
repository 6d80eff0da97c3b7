//! IGMP v1/v2/v3 wire codec (RFC 2236 / RFC 3376; RFC 9776 folds in minor
//! errata but does not change the wire format).
//!
//! Follows the teacher's existing `IgmpRepr` split
//! (`examples/JOHNKRAM-smoltcp/src/iface/interface/igmp.rs`): a tagged enum
//! produced by a `parse` free function, matched explicitly by callers
//! instead of dispatched through a trait object (Design Notes, §9).

use core::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{Error, Result};
use crate::wire::checksum;

pub const TYPE_MEMBERSHIP_QUERY: u8 = 0x11;
pub const TYPE_V1_MEMBERSHIP_REPORT: u8 = 0x12;
pub const TYPE_V2_MEMBERSHIP_REPORT: u8 = 0x16;
pub const TYPE_V2_LEAVE_GROUP: u8 = 0x17;
pub const TYPE_V3_MEMBERSHIP_REPORT: u8 = 0x22;

pub const V2_QUERY_LEN: usize = 8;
pub const V3_QUERY_MIN_LEN: usize = 12;
pub const V3_REPORT_MIN_LEN: usize = 8;
pub const V3_RECORD_MIN_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
    V3,
}

/// IGMPv3/v2 group record type, carried in Membership Reports (RFC 3376
/// §4.2.12). Only the group-level effect matters to this crate (§1
/// non-goals: no source-specific filtering), but the type and source count
/// must still be parsed to skip the record correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    ModeIsInclude,
    ModeIsExclude,
    ChangeToInclude,
    ChangeToExclude,
    AllowNewSources,
    BlockOldSources,
}

impl RecordType {
    fn from_u8(v: u8) -> Option<RecordType> {
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

    /// Whether this record type represents a join at the group level (§4.5
    /// of SPEC_FULL.md treats source lists as opaque; only emptiness of the
    /// CHANGE_TO_INCLUDE/BLOCK_OLD_SOURCES source list distinguishes a leave
    /// from a no-op).
    pub fn is_join(&self, num_sources: u16) -> bool {
        match self {
            RecordType::ModeIsInclude | RecordType::ChangeToInclude => num_sources > 0,
            RecordType::ModeIsExclude
            | RecordType::ChangeToExclude
            | RecordType::AllowNewSources => true,
            RecordType::BlockOldSources => false,
        }
    }

    /// Whether this record type represents a leave at the group level: an
    /// empty-source CHANGE_TO_INCLUDE or BLOCK_OLD_SOURCES (§4.5).
    pub fn is_leave(&self, num_sources: u16) -> bool {
        matches!(
            self,
            RecordType::ChangeToInclude | RecordType::BlockOldSources
        ) && num_sources == 0
    }
}

/// A single group record from an IGMPv3 report, with its source addresses
/// skipped over rather than retained (no (S,G) filtering, §1 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRecord {
    pub record_type: RecordType,
    pub group_addr: Ipv4Addr,
    pub num_sources: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr<'a> {
    MembershipQuery {
        version: Version,
        max_resp_code: u8,
        group_addr: Ipv4Addr,
        /// Only meaningful for `Version::V3`.
        s_flag: bool,
        qrv: u8,
        qqic: u8,
    },
    MembershipReportV1 {
        group_addr: Ipv4Addr,
    },
    MembershipReportV2 {
        group_addr: Ipv4Addr,
    },
    MembershipReportV3 {
        records: RecordIter<'a>,
    },
    LeaveGroup {
        group_addr: Ipv4Addr,
    },
}

/// Lazily walks group records out of an IGMPv3 report payload, so a
/// truncated trailing record can be detected without allocating a `Vec` up
/// front (§8 scenario 5's MLD analog; the IGMP report format is identical in
/// shape).
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

        if self.data.len() < V3_RECORD_MIN_LEN {
            self.remaining = 0;
            return Some(Err(Error::Truncated));
        }
        let raw_type = self.data[0];
        let aux_data_len = self.data[1] as usize;
        let num_sources = NetworkEndian::read_u16(&self.data[2..4]);
        let group_addr = Ipv4Addr::new(self.data[4], self.data[5], self.data[6], self.data[7]);
        let record_len = V3_RECORD_MIN_LEN + num_sources as usize * 4 + aux_data_len * 4;
        if self.data.len() < record_len {
            self.remaining = 0;
            return Some(Err(Error::Truncated));
        }
        let record_type = match RecordType::from_u8(raw_type) {
            Some(t) => t,
            None => {
                // Unknown record type aborts processing of the *current*
                // report per §4.9, but does not treat the bytes as
                // malformed framing.
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

impl<'a> Repr<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Repr<'a>> {
        if buffer.len() < 8 {
            return Err(Error::Truncated);
        }

        let igmp_type = buffer[0];
        match igmp_type {
            TYPE_MEMBERSHIP_QUERY => Self::parse_query(buffer),
            TYPE_V1_MEMBERSHIP_REPORT => Ok(Repr::MembershipReportV1 {
                group_addr: addr_at(buffer, 4)?,
            }),
            TYPE_V2_MEMBERSHIP_REPORT => Ok(Repr::MembershipReportV2 {
                group_addr: addr_at(buffer, 4)?,
            }),
            TYPE_V2_LEAVE_GROUP => Ok(Repr::LeaveGroup {
                group_addr: addr_at(buffer, 4)?,
            }),
            TYPE_V3_MEMBERSHIP_REPORT => Self::parse_v3_report(buffer),
            _ => Err(Error::Malformed),
        }
    }

    fn parse_query(buffer: &'a [u8]) -> Result<Repr<'a>> {
        let max_resp_code = buffer[1];
        let group_addr = addr_at(buffer, 4)?;
        if buffer.len() == V2_QUERY_LEN {
            let version = if max_resp_code == 0 {
                Version::V1
            } else {
                Version::V2
            };
            return Ok(Repr::MembershipQuery {
                version,
                max_resp_code,
                group_addr,
                s_flag: false,
                qrv: 0,
                qqic: 0,
            });
        }
        if buffer.len() < V3_QUERY_MIN_LEN {
            return Err(Error::Truncated);
        }
        let resv_s_qrv = buffer[8];
        let s_flag = resv_s_qrv & 0x08 != 0;
        let qrv = resv_s_qrv & 0x07;
        let qqic = buffer[9];
        Ok(Repr::MembershipQuery {
            version: Version::V3,
            max_resp_code,
            group_addr,
            s_flag,
            qrv,
            qqic,
        })
    }

    fn parse_v3_report(buffer: &'a [u8]) -> Result<Repr<'a>> {
        if buffer.len() < V3_REPORT_MIN_LEN {
            return Err(Error::Truncated);
        }
        let num_records = NetworkEndian::read_u16(&buffer[6..8]);
        Ok(Repr::MembershipReportV3 {
            records: RecordIter {
                data: &buffer[V3_REPORT_MIN_LEN..],
                remaining: num_records,
            },
        })
    }

    /// Verifies the one's-complement checksum over the full IGMP message.
    pub fn verify_checksum(buffer: &[u8]) -> bool {
        checksum::checksum(buffer) == 0
    }
}

fn addr_at(buffer: &[u8], offset: usize) -> Result<Ipv4Addr> {
    if buffer.len() < offset + 4 {
        return Err(Error::Truncated);
    }
    Ok(Ipv4Addr::new(
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ))
}

/// Emits an IGMPv2/v3-compatible general or group-specific query.
///
/// `s_flag`/`qrv`/`qqic` are only written when `version` is `V3`; emitting a
/// v1/v2-shaped query ignores them, matching the default-constant adoption
/// rule in §4.4.
pub fn emit_query(
    buffer: &mut [u8],
    version: Version,
    max_resp_code: u8,
    group_addr: Ipv4Addr,
    s_flag: bool,
    qrv: u8,
    qqic: u8,
) {
    buffer[0] = TYPE_MEMBERSHIP_QUERY;
    buffer[1] = if version == Version::V1 { 0 } else { max_resp_code };
    NetworkEndian::write_u16(&mut buffer[2..4], 0);
    buffer[4..8].copy_from_slice(&group_addr.octets());
    if version == Version::V3 {
        buffer[8] = (if s_flag { 0x08 } else { 0 }) | (qrv & 0x07);
        buffer[9] = qqic;
        NetworkEndian::write_u16(&mut buffer[10..12], 0);
    }
    let sum = checksum::checksum(&buffer[..query_len(version)]);
    NetworkEndian::write_u16(&mut buffer[2..4], sum);
}

pub fn query_len(version: Version) -> usize {
    match version {
        Version::V1 | Version::V2 => V2_QUERY_LEN,
        Version::V3 => V3_QUERY_MIN_LEN,
    }
}

pub fn emit_report(buffer: &mut [u8], version: Version, group_addr: Ipv4Addr) {
    let igmp_type = match version {
        Version::V1 => TYPE_V1_MEMBERSHIP_REPORT,
        Version::V2 | Version::V3 => TYPE_V2_MEMBERSHIP_REPORT,
    };
    buffer[0] = igmp_type;
    buffer[1] = 0;
    NetworkEndian::write_u16(&mut buffer[2..4], 0);
    buffer[4..8].copy_from_slice(&group_addr.octets());
    let sum = checksum::checksum(&buffer[..V2_QUERY_LEN]);
    NetworkEndian::write_u16(&mut buffer[2..4], sum);
}

pub fn emit_leave(buffer: &mut [u8], group_addr: Ipv4Addr) {
    buffer[0] = TYPE_V2_LEAVE_GROUP;
    buffer[1] = 0;
    NetworkEndian::write_u16(&mut buffer[2..4], 0);
    buffer[4..8].copy_from_slice(&group_addr.octets());
    let sum = checksum::checksum(&buffer[..V2_QUERY_LEN]);
    NetworkEndian::write_u16(&mut buffer[2..4], sum);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_general_query_round_trip() {
        let mut buf = [0u8; V2_QUERY_LEN];
        emit_query(&mut buf, Version::V2, 100, Ipv4Addr::UNSPECIFIED, false, 0, 0);
        assert!(Repr::verify_checksum(&buf));
        match Repr::parse(&buf).unwrap() {
            Repr::MembershipQuery {
                version,
                max_resp_code,
                group_addr,
                ..
            } => {
                assert_eq!(version, Version::V2);
                assert_eq!(max_resp_code, 100);
                assert_eq!(group_addr, Ipv4Addr::UNSPECIFIED);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn v1_query_has_zero_max_resp_code() {
        let mut buf = [0u8; V2_QUERY_LEN];
        emit_query(&mut buf, Version::V1, 0, Ipv4Addr::UNSPECIFIED, false, 0, 0);
        match Repr::parse(&buf).unwrap() {
            Repr::MembershipQuery { version, .. } => assert_eq!(version, Version::V1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn v3_query_round_trip_with_s_flag() {
        let mut buf = [0u8; V3_QUERY_MIN_LEN];
        let group = Ipv4Addr::new(239, 0, 75, 0);
        emit_query(&mut buf, Version::V3, 50, group, true, 2, 30);
        assert!(Repr::verify_checksum(&buf));
        match Repr::parse(&buf).unwrap() {
            Repr::MembershipQuery {
                version,
                group_addr,
                s_flag,
                qrv,
                qqic,
                ..
            } => {
                assert_eq!(version, Version::V3);
                assert_eq!(group_addr, group);
                assert!(s_flag);
                assert_eq!(qrv, 2);
                assert_eq!(qqic, 30);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn report_and_leave_round_trip() {
        let group = Ipv4Addr::new(239, 0, 75, 0);
        let mut buf = [0u8; V2_QUERY_LEN];
        emit_report(&mut buf, Version::V2, group);
        assert!(Repr::verify_checksum(&buf));
        assert_eq!(
            Repr::parse(&buf).unwrap(),
            Repr::MembershipReportV2 { group_addr: group }
        );

        emit_leave(&mut buf, group);
        assert!(Repr::verify_checksum(&buf));
        assert_eq!(
            Repr::parse(&buf).unwrap(),
            Repr::LeaveGroup { group_addr: group }
        );
    }

    #[test]
    fn v3_report_multiple_records_in_order() {
        let g1 = Ipv4Addr::new(239, 0, 0, 1);
        let g2 = Ipv4Addr::new(239, 0, 0, 2);
        let g3 = Ipv4Addr::new(239, 0, 0, 3);
        let mut buf = vec![0u8; V3_REPORT_MIN_LEN + 3 * V3_RECORD_MIN_LEN];
        buf[0] = TYPE_V3_MEMBERSHIP_REPORT;
        NetworkEndian::write_u16(&mut buf[6..8], 3);

        let rec = |buf: &mut [u8], off: usize, typ: u8, addr: Ipv4Addr| {
            buf[off] = typ;
            buf[off + 1] = 0;
            NetworkEndian::write_u16(&mut buf[off + 2..off + 4], 0);
            buf[off + 4..off + 8].copy_from_slice(&addr.octets());
        };
        rec(&mut buf, 8, 5 /* ALLOW_NEW_SOURCES */, g1);
        rec(&mut buf, 16, 3 /* CHANGE_TO_INCLUDE */, g2);
        rec(&mut buf, 24, 2 /* MODE_IS_EXCLUDE */, g3);

        match Repr::parse(&buf).unwrap() {
            Repr::MembershipReportV3 { records } => {
                let records: Vec<_> = records.map(|r| r.unwrap()).collect();
                assert_eq!(records.len(), 3);
                assert_eq!(records[0].group_addr, g1);
                assert!(records[0].record_type.is_join(0));
                assert_eq!(records[1].group_addr, g2);
                assert!(records[1].record_type.is_leave(0));
                assert_eq!(records[2].group_addr, g3);
                assert!(records[2].record_type.is_join(0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn v3_report_truncated_trailing_record_errors() {
        let mut buf = vec![0u8; V3_REPORT_MIN_LEN + V3_RECORD_MIN_LEN - 2];
        buf[0] = TYPE_V3_MEMBERSHIP_REPORT;
        NetworkEndian::write_u16(&mut buf[6..8], 1);
        match Repr::parse(&buf).unwrap() {
            Repr::MembershipReportV3 { records } => {
                let results: Vec<_> = records.collect();
                assert_eq!(results.len(), 1);
                assert!(results[0].is_err());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
