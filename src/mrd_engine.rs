//! Multicast Router Discovery advertisement engine (§4.6): an initial
//! jittered burst on interface start, a steady-state jittered interval
//! thereafter, and immediate response to solicitations.

use rand::Rng;

use crate::time::Duration;

/// `MCB_MRD_INITIAL_COUNT`: the first advertisement plus this many more.
pub const INITIAL_COUNT: u8 = 3;
/// `MCB_MRD_INITIAL_INTERVAL`, in milliseconds: the startup burst's spacing
/// is drawn uniformly from `[0, INITIAL_INTERVAL_MS)`.
pub const INITIAL_INTERVAL_MS: u64 = 2_000;
/// `MCB_MRD_INTERVAL` in seconds, also the `interval` field advertised on
/// the wire (§7 "interval = MCB_MRD_INTERVAL = 20").
pub const STEADY_INTERVAL_SECS: u64 = 20;
const STEADY_JITTER_MS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    EmitAdvertisement,
    ArmNextAdvertisement(Duration),
}

/// Pure scheduling logic for the advertisement engine; `rng` is injected so
/// tests can supply a deterministic source while production code uses
/// `rand::thread_rng()`.
pub struct MrdEngine {
    /// Advertisements still owed in the startup burst, including the one
    /// about to be sent; `0` once steady-state has begun.
    startup_remaining: u8,
}

impl MrdEngine {
    pub fn new() -> MrdEngine {
        MrdEngine {
            startup_remaining: INITIAL_COUNT,
        }
    }

    /// Interface start: emit immediately, no jitter (§4.6).
    pub fn start(&mut self) -> Vec<Action> {
        self.startup_remaining = self.startup_remaining.saturating_sub(1);
        vec![
            Action::EmitAdvertisement,
            Action::ArmNextAdvertisement(self.next_interval(&mut rand::thread_rng())),
        ]
    }

    /// The scheduled-advertisement timer fired: emit and reschedule.
    pub fn timer_fired(&mut self) -> Vec<Action> {
        self.startup_remaining = self.startup_remaining.saturating_sub(1);
        vec![
            Action::EmitAdvertisement,
            Action::ArmNextAdvertisement(self.next_interval(&mut rand::thread_rng())),
        ]
    }

    /// A solicitation was received: cancel whatever is scheduled, emit
    /// immediately, then resume the normal jittered schedule — the
    /// solicitation does not consume a startup-burst slot (§4.6 "resume the
    /// normal jittered schedule").
    pub fn solicitation_received(&mut self) -> Vec<Action> {
        vec![
            Action::EmitAdvertisement,
            Action::ArmNextAdvertisement(self.next_interval(&mut rand::thread_rng())),
        ]
    }

    fn next_interval(&self, rng: &mut impl Rng) -> Duration {
        if self.startup_remaining > 0 {
            Duration::from_millis(rng.gen_range(0..INITIAL_INTERVAL_MS))
        } else {
            let base_ms = STEADY_INTERVAL_SECS as i64 * 1000;
            let jittered = rng.gen_range(base_ms - STEADY_JITTER_MS..base_ms + STEADY_JITTER_MS);
            Duration::from_millis(jittered as u64)
        }
    }
}

impl Default for MrdEngine {
    fn default() -> MrdEngine {
        MrdEngine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_burst_uses_short_jitter_window() {
        let mut engine = MrdEngine::new();
        let actions = engine.start();
        assert!(actions.contains(&Action::EmitAdvertisement));
        match actions[1] {
            Action::ArmNextAdvertisement(d) => {
                assert!(d < Duration::from_millis(INITIAL_INTERVAL_MS))
            }
            _ => panic!("expected ArmNextAdvertisement"),
        }

        // One more startup-spaced advertisement remains after the first;
        // the one after that rolls over into steady state (covered by
        // `steady_state_jitter_is_centered_on_twenty_seconds` below), since
        // `INITIAL_COUNT` total advertisements have then been scheduled.
        let actions = engine.timer_fired();
        match actions[1] {
            Action::ArmNextAdvertisement(d) => {
                assert!(d < Duration::from_millis(INITIAL_INTERVAL_MS))
            }
            _ => panic!("expected ArmNextAdvertisement"),
        }
    }

    #[test]
    fn steady_state_jitter_is_centered_on_twenty_seconds() {
        let mut engine = MrdEngine::new();
        engine.start();
        for _ in 0..(INITIAL_COUNT - 1) {
            engine.timer_fired();
        }
        let actions = engine.timer_fired();
        match actions[1] {
            Action::ArmNextAdvertisement(d) => {
                assert!(d >= Duration::from_millis(19_500));
                assert!(d < Duration::from_millis(20_500));
            }
            _ => panic!("expected ArmNextAdvertisement"),
        }
    }

    #[test]
    fn solicitation_triggers_immediate_advertisement() {
        let mut engine = MrdEngine::new();
        engine.start();
        let actions = engine.solicitation_received();
        assert_eq!(actions[0], Action::EmitAdvertisement);
    }
}
