//! Membership-tracking control plane for a user-space multicast bridging
//! daemon: IGMP/MLD querier election, per-group membership tracking, and
//! Multicast Router Discovery advertisement, each driven by a small
//! cooperative event loop and decoupled from the data-plane forwarding
//! threads it informs through lock-free flags.
//!
//! This crate owns the control-plane state machines and their wire codecs;
//! it does not own process lifecycle, config-file parsing, or the actual
//! forwarding of multicast payload traffic — those are external
//! collaborators this crate's types (`PacketIo`, `BridgeConfig`,
//! `OutboundHandle`) exist to interface with. See `src/bin/mcast_bridged.rs`
//! for a minimal binary that wires the pieces together.

pub mod capture;
pub mod config;
pub mod coupling;
pub mod error;
pub mod eventloop;
pub mod group_table;
pub mod membership;
pub mod mrd_engine;
pub mod protocol;
pub mod querier;
pub mod time;
pub mod wire;

mod interface;

pub use config::{BridgeConfig, InterfaceDescriptor};
pub use coupling::{OutboundFlags, OutboundHandle};
pub use error::{Error, Result};
pub use interface::Subsystem;
pub use protocol::{Igmp, Mld, Protocol};
pub use querier::Mode as QuerierMode;
