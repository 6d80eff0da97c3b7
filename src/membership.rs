//! Per-group membership state machine (§4.5): join/leave handling, the
//! last-member query burst, IGMP's v1-host-compatibility timer, and group
//! expiry.
//!
//! Pure logic over a `GroupRecord`, driven by `interface.rs` the same way
//! `querier.rs` is: callers observe events and timer fires and get back the
//! `Action`s to actually perform (emit a packet, arm/cancel a timer,
//! flip the coupling flag).

use crate::group_table::GroupRecord;
use crate::protocol::Protocol;
use crate::querier::Parameters;
use crate::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ActivateOutbound,
    DeactivateOutbound,
    ArmMembershipTimer(Duration),
    CancelMembershipTimer,
    EmitGroupSpecificQuery { s_flag: bool },
    ArmGroupQueryTimer(Duration),
    ArmV1HostTimer(Duration),
    CancelV1HostTimer,
}

/// §4.5 join formula: "`qrv * query_interval_seconds + response_interval /
/// 10` seconds (IGMP) or the MLD millisecond analog `qrv * query_interval *
/// 1000 + response_interval + GRACE_MS` (MLD)". Once every interval is
/// normalized to a `Duration`, both collapse to the same expression; we add
/// `P::GRACE` uniformly to both protocols rather than only to MLD, per the
/// open-question resolution recorded in DESIGN.md.
fn join_interval<P: Protocol>(params: &Parameters) -> Duration {
    params.query_interval * params.robustness as u32 + params.max_response + P::GRACE
}

/// §4.4 line "arm the per-group membership timer to `qrv * response_interval
/// + GRACE_MS`", used when a group-specific query from another querier is
/// observed for an already-active group.
fn query_observed_interval<P: Protocol>(params: &Parameters) -> Duration {
    params.max_response * params.robustness as u32 + P::GRACE
}

/// §4.5 leave formula: `qrv * last_member_interval + GRACE_MS`.
fn leave_interval<P: Protocol>(params: &Parameters) -> Duration {
    params.last_member_interval * params.robustness as u32 + P::GRACE
}

/// §4.5 join for a group this interface still only knows from a report
/// (IGMPv1/v2/v3, MLDv1/v2 analog). Returns the actions to perform;
/// `was_active` lets the caller decide whether to pair this with
/// `GroupTable::find_or_insert` bookkeeping.
pub fn on_join<P: Protocol>(
    record: &mut GroupRecord<P::Addr>,
    params: &Parameters,
    is_v1_report: bool,
) -> Vec<Action> {
    let was_active = record.active;
    record.active = true;
    record.group_queries_remaining = 0;

    let mut actions = Vec::new();
    if !was_active {
        actions.push(Action::ActivateOutbound);
    } else {
        actions.push(Action::CancelMembershipTimer);
    }
    actions.push(Action::ArmMembershipTimer(join_interval::<P>(params)));

    if P::HAS_V1_COMPAT && is_v1_report {
        record.v1_host_present = true;
        actions.push(Action::ArmV1HostTimer(join_interval::<P>(params)));
    }
    actions
}

/// §4.4: a group-specific query from another querier was observed, with the
/// S flag clear, for a group that is locally active.
pub fn on_group_specific_query_observed<P: Protocol>(
    record: &GroupRecord<P::Addr>,
    params: &Parameters,
) -> Vec<Action> {
    if !record.active {
        return Vec::new();
    }
    vec![Action::ArmMembershipTimer(query_observed_interval::<P>(
        params,
    ))]
}

/// §4.5 leave: accepted only when the caller has already checked that this
/// interface is the elected querier, the group is active, no v1 host is
/// present, and no burst is already underway (`group_queries_remaining ==
/// 0`). Arms the shortened membership timer first, then starts the burst —
/// the order the open question in DESIGN.md calls out explicitly.
pub fn accept_leave<P: Protocol>(
    record: &mut GroupRecord<P::Addr>,
    params: &Parameters,
) -> Vec<Action> {
    let mut actions = vec![Action::ArmMembershipTimer(leave_interval::<P>(params))];
    record.group_queries_remaining = params.robustness;
    actions.extend(send_last_member_query(record, params));
    actions
}

/// Whether `accept_leave` would actually do anything right now.
pub fn can_accept_leave<P: Protocol>(
    record: &GroupRecord<P::Addr>,
    is_querier: bool,
) -> bool {
    is_querier
        && record.active
        && !(P::HAS_V1_COMPAT && record.v1_host_present)
        && record.group_queries_remaining == 0
}

/// Emits one group-specific query of the last-member burst. The S flag is 0
/// exactly on the first emission (`group_queries_remaining == robustness`),
/// 1 otherwise (§4 invariants); `group_queries_remaining` is decremented
/// *after* the emission, matching `send_last_member_query`'s documented
/// order (DESIGN.md open question).
fn send_last_member_query<P: Protocol>(
    record: &mut GroupRecord<P::Addr>,
    params: &Parameters,
) -> Vec<Action> {
    let s_flag = record.group_queries_remaining != params.robustness;
    let mut actions = vec![Action::EmitGroupSpecificQuery { s_flag }];
    record.group_queries_remaining -= 1;
    if record.group_queries_remaining > 0 {
        actions.push(Action::ArmGroupQueryTimer(params.last_member_interval));
    }
    actions
}

/// The burst-spacing timer fired: send the next query in the chain, if any
/// remain.
pub fn group_query_timer_fired<P: Protocol>(
    record: &mut GroupRecord<P::Addr>,
    params: &Parameters,
) -> Vec<Action> {
    if record.group_queries_remaining == 0 {
        return Vec::new();
    }
    send_last_member_query(record, params)
}

/// §4.5 group expiry: the membership timer fired. `is_registered` marks a
/// fixed/registered group (vs. a dynamic suffix entry), which determines
/// whether `DeactivateOutbound` fires — per §4.5, "if the group is a
/// fixed/registered one, invoke deactivate_outbound".
pub fn on_membership_timeout<P: Protocol>(
    record: &mut GroupRecord<P::Addr>,
    is_registered: bool,
) -> Vec<Action> {
    record.active = false;
    record.group_queries_remaining = 0;
    record.v1_host_present = false;
    if is_registered {
        vec![Action::DeactivateOutbound]
    } else {
        Vec::new()
    }
}

/// §4.5 v1-host timer expiry: clears the compatibility flag only (IGMP
/// only; never armed for MLD).
pub fn on_v1_host_timeout<A>(record: &mut GroupRecord<A>) {
    record.v1_host_present = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Igmp;
    use core::net::Ipv4Addr;

    fn params() -> Parameters {
        Parameters {
            robustness: 2,
            query_interval: Duration::from_secs(125),
            max_response: Duration::from_millis(10_000),
            last_member_interval: Duration::from_millis(1_000),
        }
    }

    fn new_record() -> GroupRecord<Ipv4Addr> {
        GroupRecord::new(Ipv4Addr::new(239, 0, 75, 0))
    }

    #[test]
    fn join_activates_outbound_once() {
        let mut record = new_record();
        let actions = on_join::<Igmp>(&mut record, &params(), false);
        assert!(actions.contains(&Action::ActivateOutbound));
        assert!(record.active);

        // A second join while still active must not re-activate.
        let actions = on_join::<Igmp>(&mut record, &params(), false);
        assert!(!actions.contains(&Action::ActivateOutbound));
    }

    #[test]
    fn leave_burst_sets_s_flag_zero_then_one() {
        let mut record = new_record();
        on_join::<Igmp>(&mut record, &params(), false);

        let p = params();
        assert!(can_accept_leave::<Igmp>(&record, true));
        let actions = accept_leave::<Igmp>(&mut record, &p);
        assert!(actions.contains(&Action::EmitGroupSpecificQuery { s_flag: false }));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ArmGroupQueryTimer(d) if *d == Duration::from_millis(1000))));

        let actions = group_query_timer_fired::<Igmp>(&mut record, &p);
        assert!(actions.contains(&Action::EmitGroupSpecificQuery { s_flag: true }));
        assert_eq!(record.group_queries_remaining, 0);

        // Burst complete: no further timer requests.
        assert_eq!(group_query_timer_fired::<Igmp>(&mut record, &p), Vec::new());
    }

    #[test]
    fn leave_ignored_when_v1_host_present() {
        let mut record = new_record();
        on_join::<Igmp>(&mut record, &params(), true);
        assert!(record.v1_host_present);
        assert!(!can_accept_leave::<Igmp>(&record, true));
    }

    #[test]
    fn timeout_deactivates_only_registered_groups() {
        let mut record = new_record();
        on_join::<Igmp>(&mut record, &params(), false);
        let actions = on_membership_timeout::<Igmp>(&mut record, true);
        assert_eq!(actions, vec![Action::DeactivateOutbound]);
        assert!(!record.active);

        let mut dynamic = new_record();
        on_join::<Igmp>(&mut dynamic, &params(), false);
        assert_eq!(on_membership_timeout::<Igmp>(&mut dynamic, false), Vec::new());
    }
}
