//! The typed configuration surface this crate consumes (§6). Parsing a
//! config file or command line into these types is an external
//! collaborator's job (§1 Non-goals); `mcast_bridged` (the demo binary)
//! builds them from `getopts` flags.

use core::net::{Ipv4Addr, Ipv6Addr};

use crate::querier::Mode as QuerierMode;
use crate::wire::ethernet::EthernetAddress;

/// Top-level configuration for one bridge daemon instance: the querier mode
/// to run for each protocol, plus the set of groups to track even with no
/// configured outbound interface ("non-configured groups", §6).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub igmp_querier_mode: QuerierMode,
    pub mld_querier_mode: QuerierMode,
    /// Groups learned only from membership reports, never registered by a
    /// bridge instance; tracked so a querier-mode interface can still answer
    /// queries for them, but with no `OutboundHandle` to activate (§4.3's
    /// "dynamic suffix" exists exactly for this case).
    pub non_configured_igmp_groups: Vec<Ipv4Addr>,
    pub non_configured_mld_groups: Vec<Ipv6Addr>,
    /// Upper bound on the dynamic suffix of each interface's group table
    /// (§4.3, §5 "Resource bounds").
    pub dynamic_group_capacity: usize,
    /// Upper bound on outstanding timers per subsystem event loop (§4.1, §5).
    pub max_timers: usize,
}

impl Default for BridgeConfig {
    fn default() -> BridgeConfig {
        BridgeConfig {
            igmp_querier_mode: QuerierMode::Quick,
            mld_querier_mode: QuerierMode::Quick,
            non_configured_igmp_groups: Vec::new(),
            non_configured_mld_groups: Vec::new(),
            dynamic_group_capacity: 64,
            max_timers: 256,
        }
    }
}

/// One physical interface this daemon listens/speaks on: the identity an
/// `Subsystem` needs to build frames plus the `PacketIo` handle it captures
/// and injects through (§6's `InterfaceDescriptor`).
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub mac: EthernetAddress,
    pub ipv4_addr: Option<Ipv4Addr>,
    pub ipv6_link_local: Option<Ipv6Addr>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_quick_querier_mode() {
        let config = BridgeConfig::default();
        assert_eq!(config.igmp_querier_mode, QuerierMode::Quick);
        assert_eq!(config.mld_querier_mode, QuerierMode::Quick);
        assert!(config.non_configured_igmp_groups.is_empty());
    }
}
