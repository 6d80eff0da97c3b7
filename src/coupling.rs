//! Control-plane/data-plane coupling (§4.7): each data-plane bridge instance
//! registers its interest in a group once at init and gets back a handle it
//! can poll from its own thread without touching any control-plane lock.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared outbound-forwarding state for one (bridge instance, group) pair.
///
/// `inbound_active` is set by the control plane when at least one downstream
/// member is known to want the group; `outbound_active` mirrors it after the
/// bridge's own activation delay (§4.9 "Delayed activation"). The bridge
/// thread only ever reads `inbound_active` and writes `outbound_active`; the
/// control-plane thread only ever writes `inbound_active`. Neither side
/// blocks on the other, per the "no cross-thread locks on the forwarding
/// path" requirement.
#[derive(Debug, Default)]
pub struct OutboundFlags {
    inbound_active: AtomicBool,
    outbound_active: AtomicBool,
}

impl OutboundFlags {
    pub fn new() -> Arc<OutboundFlags> {
        Arc::new(OutboundFlags::default())
    }

    /// Called by the control plane when membership is gained or lost.
    /// Release-ordered so that any state the control plane wrote before this
    /// call (e.g. the group table entry) is visible to the bridge thread
    /// once it observes the new flag value.
    pub fn set_inbound_active(&self, active: bool) {
        self.inbound_active.store(active, Ordering::Release);
    }

    /// Called by the bridge thread; Acquire-ordered to pair with
    /// `set_inbound_active`'s Release.
    pub fn inbound_active(&self) -> bool {
        self.inbound_active.load(Ordering::Acquire)
    }

    pub fn outbound_active(&self) -> bool {
        self.outbound_active.load(Ordering::Acquire)
    }

    /// Idempotent: a bridge thread that calls this twice in a row (e.g. on
    /// every forwarding-path iteration while membership holds) does no extra
    /// work beyond the atomic store.
    pub fn activate_outbound(&self) {
        self.outbound_active.store(true, Ordering::Release);
    }

    pub fn deactivate_outbound(&self) {
        self.outbound_active.store(false, Ordering::Release);
    }
}

/// A group registration held by one data-plane bridge instance. Obtained
/// from `register_group` at init and handed to the control plane so it can
/// flip `inbound_active` when membership changes; the bridge thread keeps
/// its own clone to poll and to report `activate_outbound`/
/// `deactivate_outbound` once its delayed-activation timer fires.
pub type OutboundHandle = Arc<OutboundFlags>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_and_outbound_flags_are_independent() {
        let flags = OutboundFlags::new();
        assert!(!flags.inbound_active());
        assert!(!flags.outbound_active());

        flags.set_inbound_active(true);
        assert!(flags.inbound_active());
        assert!(!flags.outbound_active());

        flags.activate_outbound();
        assert!(flags.outbound_active());

        flags.set_inbound_active(false);
        assert!(!flags.inbound_active());
        assert!(flags.outbound_active(), "outbound only cleared explicitly");

        flags.deactivate_outbound();
        assert!(!flags.outbound_active());
    }

    #[test]
    fn activate_outbound_is_idempotent() {
        let flags = OutboundFlags::new();
        flags.activate_outbound();
        flags.activate_outbound();
        assert!(flags.outbound_active());
    }
}
