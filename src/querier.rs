//! The querier election state machine (§4.4): four operating modes (Never /
//! Quick / Delay / Defer), a Passive/Active phase, and adoption of
//! protocol parameters from whichever query currently wins the election.
//!
//! Like smoltcp's sockets, this is a pure state machine: it never touches a
//! socket or timer directly. Callers drive it with observed events and
//! timer fires, and read back an `Vec<Action>` describing what to emit and
//! what to (re)arm; `interface.rs` is the only place those actions turn
//! into real packets and `EventLoop` timers.

use crate::protocol::{ObservedQuery, Protocol};
use crate::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Never,
    Quick,
    Delay,
    Defer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Passive,
    Active,
}

/// What the caller must do in response to a querier-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EmitGeneralQuery,
    /// (Re)arm the named timer; `ArmGeneralQuery` is the startup-burst /
    /// steady-state general-query timer while in `Active` phase.
    ArmGeneralQueryTimer(Duration),
    ArmQuerierTimeout(Duration),
    ArmOtherQuerierTimer(Duration),
    CancelGeneralQueryTimer,
    CancelQuerierTimeout,
}

/// Per-§4.4, the protocol parameters currently in force: defaults until a
/// winning query adopts different ones.
#[derive(Debug, Clone, Copy)]
pub struct Parameters {
    pub robustness: u8,
    pub query_interval: Duration,
    pub max_response: Duration,
    pub last_member_interval: Duration,
}

impl Parameters {
    pub fn defaults<P: Protocol>() -> Parameters {
        Parameters {
            robustness: P::DEFAULT_ROBUSTNESS,
            query_interval: P::DEFAULT_QUERY_INTERVAL,
            max_response: P::DEFAULT_MAX_RESPONSE,
            last_member_interval: P::DEFAULT_LAST_MEMBER_INTERVAL,
        }
    }
}

pub struct QuerierState<P: Protocol> {
    mode: Mode,
    phase: Phase,
    querier_addr: P::Addr,
    local_addr: P::Addr,
    params: Parameters,
    /// Count of startup-burst general queries still owed, per §4.4 Quick.
    startup_remaining: u8,
}

impl<P: Protocol> QuerierState<P> {
    pub fn new(mode: Mode, local_addr: P::Addr) -> QuerierState<P> {
        QuerierState {
            mode,
            phase: Phase::Passive,
            querier_addr: P::SENTINEL_ADDR,
            local_addr,
            params: Parameters::defaults::<P>(),
            startup_remaining: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn querier_addr(&self) -> P::Addr {
        self.querier_addr
    }

    pub fn params(&self) -> Parameters {
        self.params
    }

    /// Called once at interface start (§4.4 mode initialization).
    pub fn start(&mut self) -> Vec<Action> {
        match self.mode {
            Mode::Never => Vec::new(),
            Mode::Quick => self.become_active(),
            Mode::Delay => vec![Action::ArmQuerierTimeout(P::DELAYED_ACTIVATION)],
            Mode::Defer => vec![Action::ArmQuerierTimeout(P::DELAYED_ACTIVATION)],
        }
    }

    fn become_active(&mut self) -> Vec<Action> {
        self.phase = Phase::Active;
        self.querier_addr = self.local_addr;
        self.startup_remaining = self.params.robustness;
        vec![
            Action::EmitGeneralQuery,
            Action::ArmGeneralQueryTimer(self.params.query_interval / 4),
        ]
    }

    /// Fired when the general-query timer elapses: continues the startup
    /// burst (spacing `query_interval / 4`) until `robustness` queries have
    /// been sent, then switches to the steady-state `query_interval`
    /// spacing, per §4.4.
    pub fn general_query_timer_fired(&mut self) -> Vec<Action> {
        if self.startup_remaining > 0 {
            self.startup_remaining -= 1;
        }
        let spacing = if self.startup_remaining > 0 {
            self.params.query_interval / 4
        } else {
            self.params.query_interval
        };
        vec![Action::EmitGeneralQuery, Action::ArmGeneralQueryTimer(spacing)]
    }

    /// §4.4 "On observing any query", covering both general and
    /// group-specific queries (group-specific handling for per-group timers
    /// lives in `membership.rs`; this only updates the querier election and
    /// re-arms the other-querier-present timer). Returns the actions plus
    /// whether this source should be treated as the winning querier.
    pub fn observe_query(&mut self, query: &ObservedQuery<P::Addr>) -> Vec<Action> {
        let mut actions = Vec::new();

        // Defer yields to *any* observed query while Active (§4.4: "If I am
        // Active and (R < my_address OR mode == Defer): yield ... adopt R as
        // current querier") — so a Defer-mode interface adopts the observer
        // source unconditionally on yield, not only when it numerically
        // outranks the previously recorded querier_addr.
        let defer_yield = self.mode == Mode::Defer && self.phase == Phase::Active;
        let adopt =
            defer_yield || query.source < self.querier_addr || self.querier_addr == P::SENTINEL_ADDR;
        if adopt {
            self.querier_addr = query.source;
            self.params.robustness = query.qrv.max(1);
            self.params.qqic_adopt(query.qqic);
            self.params.max_response = query.response_interval;
        }

        match self.mode {
            Mode::Defer => {
                if self.phase == Phase::Active {
                    actions.push(Action::CancelGeneralQueryTimer);
                }
                self.phase = Phase::Passive;
            }
            Mode::Never | Mode::Delay | Mode::Quick => {
                if query.source < self.local_addr && self.phase == Phase::Active {
                    actions.push(Action::CancelGeneralQueryTimer);
                    self.phase = Phase::Passive;
                }
            }
        }

        if self.phase == Phase::Passive {
            actions.push(Action::CancelQuerierTimeout);
            let other_querier_timeout = self.params.query_interval * self.params.robustness as u32
                + self.params.max_response / 2;
            actions.push(Action::ArmOtherQuerierTimer(other_querier_timeout));
        }

        actions
    }

    /// §4.4: "(Re)arm other-querier-present timer... On fire: if mode is
    /// non-Never, transition to Active via the Quick path; else reset
    /// querier address to sentinel and remain Passive."
    pub fn other_querier_timer_fired(&mut self) -> Vec<Action> {
        if self.mode != Mode::Never {
            self.become_active()
        } else {
            self.querier_addr = P::SENTINEL_ADDR;
            Vec::new()
        }
    }

    /// §4.4 Delay mode: the 125.5s self-election timeout fired with no
    /// query ever observed.
    pub fn delayed_activation_fired(&mut self) -> Vec<Action> {
        self.become_active()
    }
}

impl Parameters {
    fn qqic_adopt(&mut self, qqic: Duration) {
        if qqic > Duration::ZERO {
            self.query_interval = qqic;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Igmp;
    use core::net::Ipv4Addr;

    fn addr(n: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, n)
    }

    #[test]
    fn quick_mode_starts_active_with_startup_burst() {
        let mut q: QuerierState<Igmp> = QuerierState::new(Mode::Quick, addr(1));
        let actions = q.start();
        assert_eq!(q.phase(), Phase::Active);
        assert!(actions.contains(&Action::EmitGeneralQuery));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ArmGeneralQueryTimer(d) if *d == Duration::from_secs(125) / 4)));

        // Robustness defaults to 2: one more startup-spaced query, then
        // steady state.
        let actions = q.general_query_timer_fired();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::ArmGeneralQueryTimer(d) if *d == Duration::from_secs(125))));
    }

    #[test]
    fn never_mode_stays_passive() {
        let mut q: QuerierState<Igmp> = QuerierState::new(Mode::Never, addr(1));
        assert!(q.start().is_empty());
        assert_eq!(q.phase(), Phase::Passive);
    }

    #[test]
    fn defer_mode_yields_to_any_observed_query() {
        let mut q: QuerierState<Igmp> = QuerierState::new(Mode::Defer, addr(3));
        q.start();
        assert_eq!(q.phase(), Phase::Passive);

        let observed = ObservedQuery {
            source: addr(9),
            is_general: true,
            group_addr: Ipv4Addr::UNSPECIFIED,
            response_interval: Duration::from_millis(10_000),
            s_flag: false,
            qrv: 2,
            qqic: Duration::from_secs(125),
        };
        let actions = q.observe_query(&observed);
        assert_eq!(q.querier_addr(), addr(9));
        assert_eq!(q.phase(), Phase::Passive);
        // qrv * query_interval + response_interval / 2 = 2*125s + 10s/2 = 255s
        // (§8 scenario 2).
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::ArmOtherQuerierTimer(d) if *d == Duration::from_secs(255)
        )));
    }

    #[test]
    fn defer_mode_self_elects_after_timeout_like_delay() {
        let mut q: QuerierState<Igmp> = QuerierState::new(Mode::Defer, addr(1));
        let actions = q.start();
        assert_eq!(actions, vec![Action::ArmQuerierTimeout(crate::protocol::Igmp::DELAYED_ACTIVATION)]);
        q.delayed_activation_fired();
        assert_eq!(q.phase(), Phase::Active);
    }

    #[test]
    fn defer_mode_active_yields_and_adopts_higher_address() {
        // §8 Scenario 2: local=10.0.0.3 is Active (self-elected after Defer's
        // delayed-activation timeout), then observes a query from a
        // numerically *higher* address. Defer yields to any query while
        // Active, so it must adopt that higher address as the new querier,
        // not just cancel its own timer.
        let mut q: QuerierState<Igmp> = QuerierState::new(Mode::Defer, addr(3));
        q.start();
        q.delayed_activation_fired();
        assert_eq!(q.phase(), Phase::Active);
        assert_eq!(q.querier_addr(), addr(3));

        let observed = ObservedQuery {
            source: addr(9),
            is_general: true,
            group_addr: Ipv4Addr::UNSPECIFIED,
            response_interval: Duration::from_millis(10_000),
            s_flag: false,
            qrv: 2,
            qqic: Duration::from_secs(125),
        };
        let actions = q.observe_query(&observed);
        assert_eq!(q.phase(), Phase::Passive);
        assert_eq!(q.querier_addr(), addr(9));
        assert!(actions.contains(&Action::CancelGeneralQueryTimer));
    }

    #[test]
    fn delay_mode_self_elects_after_timeout() {
        let mut q: QuerierState<Igmp> = QuerierState::new(Mode::Delay, addr(1));
        let actions = q.start();
        assert_eq!(actions, vec![Action::ArmQuerierTimeout(crate::protocol::Igmp::DELAYED_ACTIVATION)]);
        q.delayed_activation_fired();
        assert_eq!(q.phase(), Phase::Active);
    }
}
