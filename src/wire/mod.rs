//! Byte-exact builders and parsers for every wire format this crate speaks:
//! Ethernet, IPv4/IPv6 framing, IGMP v1/v2/v3, MLD v1/v2, and the shared MRD
//! advertisement/solicitation, plus checksum and time-code helpers.
//!
//! Split one submodule per format, matching the teacher's own `wire` module
//! layout (not present in the retrieved pack, but the split itself is
//! standard smoltcp practice — one file per protocol under `src/wire/`).

pub mod checksum;
pub mod ethernet;
pub mod igmp;
pub mod ipv4;
pub mod ipv6;
pub mod mld;
pub mod mrd;
pub mod time_code;
