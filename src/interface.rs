//! Ties the generic protocol state machines to a concrete wire format and an
//! `EventLoop`/`PacketIo` pair (§2 control flow, §6 external interfaces).
//!
//! The generic `impl<P, Io> Subsystem<P, Io>` block holds everything that is
//! truly protocol-agnostic: group-table bookkeeping, timer-context encoding,
//! and delegating to `querier`/`membership`/`mrd_engine`'s pure `Action`
//! producers. Frame parsing and emission differ in header shape between
//! IGMP-over-IPv4 and MLD-over-ICMPv6-over-IPv6, so those live in two
//! separate, non-generic `impl Subsystem<Igmp, Io>` / `impl Subsystem<Mld,
//! Io>` blocks below — ordinary Rust inherent-impl specialization, not a
//! second abstraction layer.
//!
//! `Subsystem` never holds the `EventLoop` that drives it: callbacks take
//! `&mut Subsystem` only and return the timers they want (re)armed as
//! `Vec<TimerRequest<Subsystem<P, Io>>>`, which `run`'s local `EventLoop`
//! applies after each callback returns (see `eventloop`'s doc comment).

use log::{debug, trace, warn};

use crate::capture::PacketIo;
use crate::coupling::OutboundHandle;
use crate::eventloop::{EventLoop, TimerRequest};
use crate::group_table::{GroupIndex, GroupTable};
use crate::membership;
use crate::mrd_engine::{self, MrdEngine};
use crate::protocol::{ObservedQuery, Protocol};
use crate::querier::{self, Mode, QuerierState};
use crate::time::Instant;
use crate::wire::ethernet::EthernetAddress;

const GENERAL_QUERY_TIMER: usize = 0;
const OTHER_QUERIER_TIMER: usize = 1;
const DELAYED_ACTIVATION_TIMER: usize = 2;
const MRD_TIMER: usize = 3;

const BAND: usize = 1_000_000;
const MEMBERSHIP_TIMER_BASE: usize = BAND;
const GROUP_QUERY_TIMER_BASE: usize = 2 * BAND;
const V1_HOST_TIMER_BASE: usize = 3 * BAND;

fn group_context(idx: GroupIndex) -> usize {
    match idx {
        GroupIndex::Fixed(i) => i * 2,
        GroupIndex::Dynamic(i) => i * 2 + 1,
    }
}

fn context_to_group(ctx: usize) -> GroupIndex {
    if ctx % 2 == 0 {
        GroupIndex::Fixed(ctx / 2)
    } else {
        GroupIndex::Dynamic(ctx / 2)
    }
}

/// One control-plane subsystem: either the IGMP twin or the MLD twin for a
/// single interface, run on its own OS thread (§5).
pub struct Subsystem<P: Protocol, Io: PacketIo> {
    querier: QuerierState<P>,
    groups: GroupTable<P::Addr>,
    mrd: MrdEngine,
    local_addr: P::Addr,
    local_mac: EthernetAddress,
    io: Io,
}

impl<P: Protocol, Io: PacketIo> Subsystem<P, Io> {
    pub fn new(
        mode: Mode,
        local_addr: P::Addr,
        local_mac: EthernetAddress,
        io: Io,
        dynamic_capacity: usize,
    ) -> Subsystem<P, Io> {
        Subsystem {
            querier: QuerierState::new(mode, local_addr),
            groups: GroupTable::new(dynamic_capacity),
            mrd: MrdEngine::new(),
            local_addr,
            local_mac,
            io,
        }
    }

    /// §4.7 `register_group`: called at init, before the subsystem thread
    /// starts, for each dynamic outbound interface on every bridge instance
    /// it belongs to.
    pub fn register_group(&mut self, handle: OutboundHandle, group: P::Addr) -> GroupIndex {
        let idx = self.groups.register_fixed(group);
        self.groups
            .get_mut(GroupIndex::Fixed(idx))
            .subscribers
            .push(handle);
        GroupIndex::Fixed(idx)
    }

    fn is_querier(&self) -> bool {
        self.querier.phase() == querier::Phase::Active
    }

    fn apply_querier_actions(&mut self, actions: Vec<querier::Action>) -> Vec<TimerRequest<Self>> {
        let mut requests = Vec::new();
        for action in actions {
            match action {
                querier::Action::EmitGeneralQuery => self.emit_general_query(),
                querier::Action::ArmGeneralQueryTimer(delay) => {
                    requests.push(TimerRequest::Cancel {
                        callback: Self::on_timer,
                        context: GENERAL_QUERY_TIMER,
                    });
                    requests.push(TimerRequest::Arm {
                        delay,
                        callback: Self::on_timer,
                        context: GENERAL_QUERY_TIMER,
                    });
                }
                querier::Action::ArmQuerierTimeout(delay) => requests.push(TimerRequest::Arm {
                    delay,
                    callback: Self::on_timer,
                    context: DELAYED_ACTIVATION_TIMER,
                }),
                querier::Action::ArmOtherQuerierTimer(delay) => {
                    requests.push(TimerRequest::Cancel {
                        callback: Self::on_timer,
                        context: OTHER_QUERIER_TIMER,
                    });
                    requests.push(TimerRequest::Arm {
                        delay,
                        callback: Self::on_timer,
                        context: OTHER_QUERIER_TIMER,
                    });
                }
                querier::Action::CancelGeneralQueryTimer => requests.push(TimerRequest::Cancel {
                    callback: Self::on_timer,
                    context: GENERAL_QUERY_TIMER,
                }),
                querier::Action::CancelQuerierTimeout => requests.push(TimerRequest::Cancel {
                    callback: Self::on_timer,
                    context: DELAYED_ACTIVATION_TIMER,
                }),
            }
        }
        requests
    }

    fn apply_membership_actions(
        &mut self,
        idx: GroupIndex,
        actions: Vec<membership::Action>,
    ) -> Vec<TimerRequest<Self>> {
        let mut requests = Vec::new();
        for action in actions {
            match action {
                membership::Action::ActivateOutbound => {
                    for h in &self.groups.get(idx).subscribers {
                        h.set_inbound_active(true);
                    }
                }
                membership::Action::DeactivateOutbound => {
                    for h in &self.groups.get(idx).subscribers {
                        h.set_inbound_active(false);
                    }
                    self.groups.tighten();
                }
                membership::Action::ArmMembershipTimer(delay) => {
                    let context = MEMBERSHIP_TIMER_BASE + group_context(idx);
                    requests.push(TimerRequest::Cancel {
                        callback: Self::on_timer,
                        context,
                    });
                    requests.push(TimerRequest::Arm {
                        delay,
                        callback: Self::on_timer,
                        context,
                    });
                }
                membership::Action::CancelMembershipTimer => requests.push(TimerRequest::Cancel {
                    callback: Self::on_timer,
                    context: MEMBERSHIP_TIMER_BASE + group_context(idx),
                }),
                membership::Action::EmitGroupSpecificQuery { s_flag } => {
                    self.emit_group_specific_query(self.groups.get(idx).group_addr, s_flag);
                }
                membership::Action::ArmGroupQueryTimer(delay) => requests.push(TimerRequest::Arm {
                    delay,
                    callback: Self::on_timer,
                    context: GROUP_QUERY_TIMER_BASE + group_context(idx),
                }),
                membership::Action::ArmV1HostTimer(delay) => {
                    let context = V1_HOST_TIMER_BASE + group_context(idx);
                    requests.push(TimerRequest::Cancel {
                        callback: Self::on_timer,
                        context,
                    });
                    requests.push(TimerRequest::Arm {
                        delay,
                        callback: Self::on_timer,
                        context,
                    });
                }
                membership::Action::CancelV1HostTimer => requests.push(TimerRequest::Cancel {
                    callback: Self::on_timer,
                    context: V1_HOST_TIMER_BASE + group_context(idx),
                }),
            }
        }
        requests
    }

    fn apply_mrd_actions(&mut self, actions: Vec<mrd_engine::Action>) -> Vec<TimerRequest<Self>> {
        let mut requests = Vec::new();
        for action in actions {
            match action {
                mrd_engine::Action::EmitAdvertisement => self.emit_mrd_advertisement(),
                mrd_engine::Action::ArmNextAdvertisement(delay) => {
                    requests.push(TimerRequest::Cancel {
                        callback: Self::on_timer,
                        context: MRD_TIMER,
                    });
                    requests.push(TimerRequest::Arm {
                        delay,
                        callback: Self::on_timer,
                        context: MRD_TIMER,
                    });
                }
            }
        }
        requests
    }

    fn handle_join(&mut self, group: P::Addr, is_v1: bool) -> Vec<TimerRequest<Self>> {
        if P::is_link_local(group) {
            trace!("{}: ignoring join for link-local group", P::NAME);
            return Vec::new();
        }
        let Some(idx) = self.groups.find_or_insert(group) else {
            warn!("{}: group table full, dropping join", P::NAME);
            return Vec::new();
        };
        let params = self.querier.params();
        let actions = membership::on_join::<P>(self.groups.get_mut(idx), &params, is_v1);
        self.apply_membership_actions(idx, actions)
    }

    fn handle_leave(&mut self, group: P::Addr) -> Vec<TimerRequest<Self>> {
        let Some(idx) = self.groups.find(group) else {
            return Vec::new();
        };
        if !membership::can_accept_leave::<P>(self.groups.get(idx), self.is_querier()) {
            debug!("{}: ignoring leave, preconditions not met", P::NAME);
            return Vec::new();
        }
        let params = self.querier.params();
        let actions = membership::accept_leave::<P>(self.groups.get_mut(idx), &params);
        self.apply_membership_actions(idx, actions)
    }

    fn handle_observed_query(&mut self, query: ObservedQuery<P::Addr>) -> Vec<TimerRequest<Self>> {
        let querier_actions = self.querier_observe(query);
        let mut requests = self.apply_querier_actions(querier_actions);

        if !query.is_general && !query.s_flag {
            if let Some(idx) = self.groups.find(query.group_addr) {
                let params = self.querier.params();
                let actions =
                    membership::on_group_specific_query_observed::<P>(self.groups.get(idx), &params);
                requests.extend(self.apply_membership_actions(idx, actions));
            }
        }
        requests
    }

    fn querier_observe(&mut self, query: ObservedQuery<P::Addr>) -> Vec<querier::Action> {
        self.querier.observe_query(&query)
    }

    fn on_timer(state: &mut Self, _now: Instant, context: usize) -> Vec<TimerRequest<Self>> {
        match context {
            GENERAL_QUERY_TIMER => {
                let actions = state.querier.general_query_timer_fired();
                state.apply_querier_actions(actions)
            }
            OTHER_QUERIER_TIMER => {
                let actions = state.querier.other_querier_timer_fired();
                state.apply_querier_actions(actions)
            }
            DELAYED_ACTIVATION_TIMER => {
                let actions = state.querier.delayed_activation_fired();
                state.apply_querier_actions(actions)
            }
            MRD_TIMER => {
                let actions = state.mrd.timer_fired();
                state.apply_mrd_actions(actions)
            }
            ctx if (MEMBERSHIP_TIMER_BASE..MEMBERSHIP_TIMER_BASE + BAND).contains(&ctx) => {
                let idx = context_to_group(ctx - MEMBERSHIP_TIMER_BASE);
                let is_registered = state.groups.is_fixed(idx);
                let actions =
                    membership::on_membership_timeout::<P>(state.groups.get_mut(idx), is_registered);
                state.apply_membership_actions(idx, actions)
            }
            ctx if (GROUP_QUERY_TIMER_BASE..GROUP_QUERY_TIMER_BASE + BAND).contains(&ctx) => {
                let idx = context_to_group(ctx - GROUP_QUERY_TIMER_BASE);
                let params = state.querier.params();
                let actions =
                    membership::group_query_timer_fired::<P>(state.groups.get_mut(idx), &params);
                state.apply_membership_actions(idx, actions)
            }
            ctx if (V1_HOST_TIMER_BASE..V1_HOST_TIMER_BASE + BAND).contains(&ctx) => {
                let idx = context_to_group(ctx - V1_HOST_TIMER_BASE);
                membership::on_v1_host_timeout(state.groups.get_mut(idx));
                Vec::new()
            }
            _ => {
                warn!("{}: fired unknown timer context {context}", P::NAME);
                Vec::new()
            }
        }
    }
}

// --- IGMP-specific wire glue -------------------------------------------

impl<Io: PacketIo> Subsystem<crate::protocol::Igmp, Io> {
    /// Starts the subsystem (§4.4/§4.6 init) and runs forever, dispatching
    /// ingress frames and timer fires. Never returns.
    pub fn run(&mut self, max_timers: usize) -> ! {
        let mut eventloop: EventLoop<Self> = EventLoop::new(1, max_timers);
        let now = Instant::now();

        let q_actions = self.querier.start();
        let requests = self.apply_querier_actions(q_actions);
        for r in requests {
            apply_request(&mut eventloop, now, r);
        }
        let mrd_actions = self.mrd.start();
        let requests = self.apply_mrd_actions(mrd_actions);
        for r in requests {
            apply_request(&mut eventloop, now, r);
        }

        eventloop.add_socket(self.io.as_raw_fd(), Self::on_socket, 0);
        eventloop.run(self)
    }

    fn on_socket(
        state: &mut Self,
        _now: Instant,
        _fd: std::os::unix::io::RawFd,
        _context: usize,
    ) -> Vec<TimerRequest<Self>> {
        let mut buffer = vec![0u8; crate::capture::SNAPLEN];
        let n = match state.io.recv(&mut buffer) {
            Ok(n) => n,
            Err(_) => return Vec::new(),
        };
        state.handle_inbound_frame(&buffer[..n])
    }

    fn handle_inbound_frame(&mut self, frame: &[u8]) -> Vec<TimerRequest<Self>> {
        use crate::wire::{ethernet, igmp, ipv4, time_code};

        let Ok((_eth, payload)) = ethernet::Repr::parse(frame) else {
            return Vec::new();
        };
        let Ok((ip, has_ra, igmp_payload)) = ipv4::Repr::parse(payload) else {
            return Vec::new();
        };
        if ip.protocol != ipv4::PROTO_IGMP || !has_ra {
            return Vec::new();
        }
        if !igmp::Repr::verify_checksum(igmp_payload) {
            return Vec::new();
        }
        let Ok(repr) = igmp::Repr::parse(igmp_payload) else {
            return Vec::new();
        };

        match repr {
            igmp::Repr::MembershipQuery {
                version,
                max_resp_code,
                group_addr,
                s_flag,
                qrv,
                qqic,
            } => {
                let response_interval = match version {
                    igmp::Version::V1 => self.querier.params().max_response,
                    _ => crate::time::Duration::from_millis(
                        time_code::decode_8bit(max_resp_code) as u64 * 100,
                    ),
                };
                let is_general = group_addr == core::net::Ipv4Addr::UNSPECIFIED;
                let observed = ObservedQuery {
                    source: ip.src_addr,
                    is_general,
                    group_addr,
                    response_interval,
                    s_flag,
                    qrv: if qrv == 0 { self.querier.params().robustness } else { qrv },
                    qqic: crate::time::Duration::from_secs(time_code::decode_8bit(qqic) as u64),
                };
                self.handle_observed_query(observed)
            }
            igmp::Repr::MembershipReportV1 { group_addr } => self.handle_join(group_addr, true),
            igmp::Repr::MembershipReportV2 { group_addr } => self.handle_join(group_addr, false),
            igmp::Repr::LeaveGroup { group_addr } => self.handle_leave(group_addr),
            igmp::Repr::MembershipReportV3 { records } => {
                let mut requests = Vec::new();
                for record in records {
                    let Ok(record) = record else {
                        debug!("igmp: group record data overrun, dropping rest of report");
                        break;
                    };
                    if record.record_type.is_join(record.num_sources) {
                        requests.extend(self.handle_join(record.group_addr, false));
                    } else if record.record_type.is_leave(record.num_sources) {
                        requests.extend(self.handle_leave(record.group_addr));
                    }
                }
                requests
            }
        }
    }

    fn emit_general_query(&mut self) {
        self.emit_query(core::net::Ipv4Addr::UNSPECIFIED, false);
    }

    fn emit_group_specific_query(&mut self, group: core::net::Ipv4Addr, s_flag: bool) {
        self.emit_query(group, s_flag);
    }

    fn emit_query(&mut self, group: core::net::Ipv4Addr, s_flag: bool) {
        use crate::wire::{ethernet, igmp, ipv4, time_code};

        let params = self.querier.params();
        let version = igmp::Version::V3;
        let max_resp_code = time_code::encode_8bit((params.max_response.total_millis() / 100) as u16);
        let qqic = time_code::encode_8bit((params.query_interval.total_millis() / 1000) as u16);

        let igmp_len = igmp::query_len(version);
        let ip_repr = ipv4::Repr {
            src_addr: self.local_addr,
            dst_addr: if group == core::net::Ipv4Addr::UNSPECIFIED {
                ipv4::ALL_SYSTEMS
            } else {
                group
            },
            protocol: ipv4::PROTO_IGMP,
            payload_len: igmp_len,
        };
        let dst_mac = EthernetAddress::multicast_ipv4(ip_repr.dst_addr);
        let eth_repr = ethernet::Repr {
            src_addr: self.local_mac,
            dst_addr: dst_mac,
            ethertype: ethernet::ETHERTYPE_IPV4,
        };

        let mut buf = vec![0u8; eth_repr.buffer_len() + ip_repr.buffer_len()];
        eth_repr.emit(&mut buf);
        let ip_off = eth_repr.buffer_len();
        ip_repr.emit(&mut buf[ip_off..]);
        let igmp_off = ip_off + ipv4::HEADER_LEN;
        igmp::emit_query(
            &mut buf[igmp_off..],
            version,
            max_resp_code,
            group,
            s_flag,
            params.robustness,
            qqic,
        );

        if self.io.send(&buf).is_err() {
            warn!("igmp: send failed");
        }
    }

    fn emit_mrd_advertisement(&mut self) {
        use crate::wire::{ethernet, ipv4, mrd};

        let params = self.querier.params();
        let mrd_repr = mrd::Repr::Advertisement {
            interval: mrd_engine::STEADY_INTERVAL_SECS as u16,
            qrv: params.robustness,
            qqic: (params.query_interval.total_millis() / 1000) as u8,
        };
        let ip_repr = ipv4::Repr {
            src_addr: self.local_addr,
            dst_addr: ipv4::ALL_SNOOPERS,
            protocol: ipv4::PROTO_IGMP,
            payload_len: mrd_repr.buffer_len(),
        };
        let eth_repr = ethernet::Repr {
            src_addr: self.local_mac,
            dst_addr: EthernetAddress::multicast_ipv4(ip_repr.dst_addr),
            ethertype: ethernet::ETHERTYPE_IPV4,
        };
        let mut buf = vec![0u8; eth_repr.buffer_len() + ip_repr.buffer_len()];
        eth_repr.emit(&mut buf);
        let ip_off = eth_repr.buffer_len();
        ip_repr.emit(&mut buf[ip_off..]);
        let mrd_off = ip_off + ipv4::HEADER_LEN;
        mrd_repr.emit(
            &mut buf[mrd_off..],
            mrd::IGMP_TYPE_ADVERTISEMENT,
            mrd::IGMP_TYPE_SOLICITATION,
        );
        mrd::Repr::fill_igmp_checksum(&mut buf[mrd_off..]);

        if self.io.send(&buf).is_err() {
            warn!("igmp: mrd advertisement send failed");
        }
    }
}

// --- MLD-specific wire glue ---------------------------------------------

impl<Io: PacketIo> Subsystem<crate::protocol::Mld, Io> {
    /// Starts the subsystem and runs forever, dispatching ingress frames and
    /// timer fires. Never returns. Mirrors `Subsystem<Igmp, Io>::run`.
    pub fn run(&mut self, max_timers: usize) -> ! {
        let mut eventloop: EventLoop<Self> = EventLoop::new(1, max_timers);
        let now = Instant::now();

        let q_actions = self.querier.start();
        let requests = self.apply_querier_actions(q_actions);
        for r in requests {
            apply_request(&mut eventloop, now, r);
        }
        let mrd_actions = self.mrd.start();
        let requests = self.apply_mrd_actions(mrd_actions);
        for r in requests {
            apply_request(&mut eventloop, now, r);
        }

        eventloop.add_socket(self.io.as_raw_fd(), Self::on_socket, 0);
        eventloop.run(self)
    }

    fn on_socket(
        state: &mut Self,
        _now: Instant,
        _fd: std::os::unix::io::RawFd,
        _context: usize,
    ) -> Vec<TimerRequest<Self>> {
        let mut buffer = vec![0u8; crate::capture::SNAPLEN];
        let n = match state.io.recv(&mut buffer) {
            Ok(n) => n,
            Err(_) => return Vec::new(),
        };
        state.handle_inbound_frame(&buffer[..n])
    }

    fn handle_inbound_frame(&mut self, frame: &[u8]) -> Vec<TimerRequest<Self>> {
        use crate::wire::{checksum, ethernet, ipv6, mld, time_code};

        let Ok((_eth, payload)) = ethernet::Repr::parse(frame) else {
            return Vec::new();
        };
        let Ok((ip, has_ra, mld_payload)) = ipv6::Repr::parse(payload) else {
            return Vec::new();
        };
        if !has_ra {
            return Vec::new();
        }
        let src = ip.src_addr.octets();
        let dst = ip.dst_addr.octets();
        if checksum::icmpv6_checksum(&src, &dst, mld_payload) != 0 {
            return Vec::new();
        }
        let Ok(repr) = mld::Repr::parse(mld_payload) else {
            return Vec::new();
        };

        match repr {
            mld::Repr::Query {
                version,
                max_resp_code,
                group_addr,
                s_flag,
                qrv,
                qqic,
            } => {
                let response_interval = match version {
                    mld::Version::V1 => {
                        crate::time::Duration::from_millis(max_resp_code as u64)
                    }
                    mld::Version::V2 => crate::time::Duration::from_millis(
                        time_code::decode_16bit(max_resp_code) as u64,
                    ),
                };
                let is_general = group_addr == core::net::Ipv6Addr::UNSPECIFIED;
                let observed = ObservedQuery {
                    source: ip.src_addr,
                    is_general,
                    group_addr,
                    response_interval,
                    s_flag,
                    qrv: if qrv == 0 { self.querier.params().robustness } else { qrv },
                    qqic: crate::time::Duration::from_secs(time_code::decode_8bit(qqic) as u64),
                };
                self.handle_observed_query(observed)
            }
            mld::Repr::ReportV1 { group_addr } => self.handle_join(group_addr, false),
            mld::Repr::Done { group_addr } => self.handle_leave(group_addr),
            mld::Repr::ReportV2 { records } => {
                let mut requests = Vec::new();
                for record in records {
                    let Ok(record) = record else {
                        debug!("mld: group record data overrun, dropping rest of report");
                        break;
                    };
                    if record.record_type.is_join(record.num_sources) {
                        requests.extend(self.handle_join(record.group_addr, false));
                    } else if record.record_type.is_leave(record.num_sources) {
                        requests.extend(self.handle_leave(record.group_addr));
                    }
                }
                requests
            }
        }
    }

    fn emit_general_query(&mut self) {
        self.emit_query(core::net::Ipv6Addr::UNSPECIFIED, false);
    }

    fn emit_group_specific_query(&mut self, group: core::net::Ipv6Addr, s_flag: bool) {
        self.emit_query(group, s_flag);
    }

    fn emit_query(&mut self, group: core::net::Ipv6Addr, s_flag: bool) {
        use crate::wire::{ethernet, ipv6, mld, time_code};

        let params = self.querier.params();
        let version = mld::Version::V2;
        let max_resp_code = time_code::encode_16bit(params.max_response.total_millis() as u32);
        let qqic = time_code::encode_8bit((params.query_interval.total_millis() / 1000) as u16);

        let mld_len = mld::query_len(version);
        let ip_repr = ipv6::Repr {
            src_addr: self.local_addr,
            dst_addr: if group == core::net::Ipv6Addr::UNSPECIFIED {
                ipv6::ALL_NODES
            } else {
                group
            },
            payload_len: mld_len,
        };
        let dst_mac = EthernetAddress::multicast_ipv6(ip_repr.dst_addr);
        let eth_repr = ethernet::Repr {
            src_addr: self.local_mac,
            dst_addr: dst_mac,
            ethertype: ethernet::ETHERTYPE_IPV6,
        };

        let mut buf = vec![0u8; eth_repr.buffer_len() + ip_repr.buffer_len()];
        eth_repr.emit(&mut buf);
        let ip_off = eth_repr.buffer_len();
        let mld_off = ip_off + ipv6::HEADER_LEN + ipv6::HBH_LEN;
        mld::emit_query(
            &mut buf[mld_off..],
            version,
            max_resp_code,
            group,
            s_flag,
            params.robustness,
            qqic,
        );
        ip_repr.emit(&mut buf[ip_off..]);

        if self.io.send(&buf).is_err() {
            warn!("mld: send failed");
        }
    }

    fn emit_mrd_advertisement(&mut self) {
        use crate::wire::{ethernet, ipv6, mrd};

        let params = self.querier.params();
        let mrd_repr = mrd::Repr::Advertisement {
            interval: mrd_engine::STEADY_INTERVAL_SECS as u16,
            qrv: params.robustness,
            qqic: (params.query_interval.total_millis() / 1000) as u8,
        };
        let ip_repr = ipv6::Repr {
            src_addr: self.local_addr,
            dst_addr: ipv6::ALL_SNOOPERS,
            payload_len: mrd_repr.buffer_len(),
        };
        let eth_repr = ethernet::Repr {
            src_addr: self.local_mac,
            dst_addr: EthernetAddress::multicast_ipv6(ip_repr.dst_addr),
            ethertype: ethernet::ETHERTYPE_IPV6,
        };
        let mut buf = vec![0u8; eth_repr.buffer_len() + ip_repr.buffer_len()];
        eth_repr.emit(&mut buf);
        let ip_off = eth_repr.buffer_len();
        let mrd_off = ip_off + ipv6::HEADER_LEN + ipv6::HBH_LEN;
        mrd_repr.emit(
            &mut buf[mrd_off..],
            mrd::ICMPV6_TYPE_ADVERTISEMENT,
            mrd::ICMPV6_TYPE_SOLICITATION,
        );
        ip_repr.emit(&mut buf[ip_off..]);

        if self.io.send(&buf).is_err() {
            warn!("mld: mrd advertisement send failed");
        }
    }
}

#[cfg(test)]
mod mld_tests {
    use super::*;
    use crate::capture::FakePacketIo;
    use crate::protocol::Mld;
    use core::net::Ipv6Addr;

    fn subsystem(mode: Mode) -> Subsystem<Mld, FakePacketIo> {
        Subsystem::new(
            mode,
            "fe80::1".parse().unwrap(),
            EthernetAddress([2, 0, 0, 0, 0, 1]),
            FakePacketIo::new(),
            8,
        )
    }

    #[test]
    fn registered_group_survives_as_fixed_entry() {
        let mut s = subsystem(Mode::Never);
        let handle = crate::coupling::OutboundFlags::new();
        let group: Ipv6Addr = "ff1e::1".parse().unwrap();
        let idx = s.register_group(handle, group);
        assert!(matches!(idx, GroupIndex::Fixed(0)));
    }

    #[test]
    fn join_then_leave_round_trip() {
        let mut s = subsystem(Mode::Quick);
        let handle = crate::coupling::OutboundFlags::new();
        let group: Ipv6Addr = "ff1e::1".parse().unwrap();
        s.register_group(handle.clone(), group);
        let actions = s.querier.start();
        s.apply_querier_actions(actions);

        s.handle_join(group, false);
        assert!(handle.inbound_active());

        s.handle_leave(group);
        assert_eq!(
            s.groups.get(GroupIndex::Fixed(0)).group_queries_remaining,
            1
        );
    }

    #[test]
    fn link_local_join_is_ignored() {
        let mut s = subsystem(Mode::Never);
        let group: Ipv6Addr = "ff02::1".parse().unwrap();
        s.handle_join(group, false);
        assert!(s.groups.find(group).is_none());
    }
}

fn apply_request<S>(eventloop: &mut EventLoop<S>, now: Instant, req: TimerRequest<S>) {
    match req {
        TimerRequest::Arm {
            delay,
            callback,
            context,
        } => eventloop.add_timer(now, delay, callback, context),
        TimerRequest::Cancel { callback, context } => eventloop.del_timer(callback, context),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FakePacketIo;
    use crate::protocol::Igmp;
    use core::net::Ipv4Addr;

    fn subsystem(mode: Mode) -> Subsystem<Igmp, FakePacketIo> {
        Subsystem::new(
            mode,
            Ipv4Addr::new(10, 0, 0, 1),
            EthernetAddress([2, 0, 0, 0, 0, 1]),
            FakePacketIo::new(),
            8,
        )
    }

    #[test]
    fn registered_group_survives_as_fixed_entry() {
        let mut s = subsystem(Mode::Never);
        let handle = crate::coupling::OutboundFlags::new();
        let idx = s.register_group(handle, Ipv4Addr::new(239, 0, 75, 0));
        assert!(matches!(idx, GroupIndex::Fixed(0)));
    }

    #[test]
    fn join_then_leave_round_trip_activates_and_starts_burst() {
        let mut s = subsystem(Mode::Quick);
        let handle = crate::coupling::OutboundFlags::new();
        s.register_group(handle.clone(), Ipv4Addr::new(239, 0, 75, 0));
        let actions = s.querier.start();
        s.apply_querier_actions(actions);

        s.handle_join(Ipv4Addr::new(239, 0, 75, 0), false);
        assert!(handle.inbound_active());

        s.handle_leave(Ipv4Addr::new(239, 0, 75, 0));
        assert_eq!(
            s.groups.get(GroupIndex::Fixed(0)).group_queries_remaining,
            1
        );
    }

    #[test]
    fn link_local_join_is_ignored() {
        let mut s = subsystem(Mode::Never);
        s.handle_join(Ipv4Addr::new(224, 0, 0, 251), false);
        assert!(s.groups.find(Ipv4Addr::new(224, 0, 0, 251)).is_none());
    }
}
