//! The `Protocol` trait (§2 point 9, §4.4): parameterizes the querier and
//! membership state machines over IGMP/IPv4 and MLD/IPv6 so one generic
//! implementation serves both, à la the teacher's own preference for
//! monomorphization over dynamic dispatch (Design Notes).
//!
//! Wire-level decoding differs in byte width (8-bit vs. 16-bit max-response
//! code) and units (tenths of a second vs. milliseconds), so that decoding
//! stays in each protocol's `wire` module; everything above the wire layer
//! operates purely on `crate::time::Duration`, which is why the two
//! protocols' default constants collapse to identical `Duration` values
//! below.

use crate::time::Duration;

pub trait Protocol: 'static {
    type Addr: Copy + PartialEq + PartialOrd + Ord + core::fmt::Debug;

    const NAME: &'static str;

    /// The sentinel "no querier elected yet" address (all-ones).
    const SENTINEL_ADDR: Self::Addr;

    /// Whether a v1-host-compatibility timer applies (IGMP only, §4.5).
    const HAS_V1_COMPAT: bool;

    const DEFAULT_ROBUSTNESS: u8 = 2;
    const DEFAULT_QUERY_INTERVAL: Duration = Duration::from_secs(125);
    const DEFAULT_MAX_RESPONSE: Duration = Duration::from_millis(10_000);
    const DEFAULT_LAST_MEMBER_INTERVAL: Duration = Duration::from_millis(1_000);
    const GRACE: Duration = Duration::from_millis(10);
    /// §4.4 Delay mode's self-election timeout.
    const DELAYED_ACTIVATION: Duration = Duration::from_millis(125_500);

    fn is_link_local(addr: Self::Addr) -> bool;
}

pub struct Igmp;

impl Protocol for Igmp {
    type Addr = core::net::Ipv4Addr;
    const NAME: &'static str = "igmp";
    const SENTINEL_ADDR: Self::Addr = core::net::Ipv4Addr::new(255, 255, 255, 255);
    const HAS_V1_COMPAT: bool = true;

    fn is_link_local(addr: Self::Addr) -> bool {
        crate::wire::ipv4::is_link_local(addr)
    }
}

pub struct Mld;

impl Protocol for Mld {
    type Addr = core::net::Ipv6Addr;
    const NAME: &'static str = "mld";
    const SENTINEL_ADDR: Self::Addr = core::net::Ipv6Addr::new(
        0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff,
    );
    const HAS_V1_COMPAT: bool = false;

    fn is_link_local(addr: Self::Addr) -> bool {
        crate::wire::ipv6::is_link_local(addr)
    }
}

/// A normalized, protocol-agnostic view of an observed query, produced by
/// each protocol's wire-dispatch adaptor before handing off to the generic
/// querier/membership logic (§4.4/§4.5).
#[derive(Debug, Clone, Copy)]
pub struct ObservedQuery<A> {
    pub source: A,
    pub is_general: bool,
    pub group_addr: A,
    pub response_interval: Duration,
    pub s_flag: bool,
    pub qrv: u8,
    pub qqic: Duration,
}
