//! A per-subsystem, single-threaded cooperative dispatcher (§4.1).
//!
//! One `EventLoop<S>` runs on its own OS thread per subsystem (IGMP
//! control, MLD control, each data-plane bridge — §5). It owns a
//! preallocated set of readable file descriptors and a deadline-ordered
//! list of one-shot timers; no intra-subsystem locking is required because
//! socket and timer callbacks never run concurrently with each other.
//!
//! Callbacks take `&mut S` only — never the `EventLoop` itself, which would
//! require `S` to hold a reference back to the loop driving it. Instead a
//! callback returns the timers it wants armed or cancelled as a
//! `Vec<TimerRequest<S>>`, which `poll_once` applies to its own timer list
//! after the callback returns. This is what lets `interface::Subsystem`
//! (the concrete `S` used in this crate) re-arm its own timers from inside
//! a timer callback without a self-referential struct.

use std::os::unix::io::RawFd;

use log::{trace, warn};

use crate::time::{Duration, Instant};

/// Callback invoked when a registered socket becomes readable.
pub type SocketCallback<S> = fn(&mut S, Instant, RawFd, usize) -> Vec<TimerRequest<S>>;
/// Callback invoked when a timer's deadline has passed.
pub type TimerCallback<S> = fn(&mut S, Instant, usize) -> Vec<TimerRequest<S>>;

/// A scheduling request returned by a socket/timer callback, applied by
/// `poll_once` once the callback that produced it has returned.
pub enum TimerRequest<S> {
    Arm {
        delay: Duration,
        callback: TimerCallback<S>,
        context: usize,
    },
    Cancel {
        callback: TimerCallback<S>,
        context: usize,
    },
}

struct SocketSlot<S> {
    fd: RawFd,
    callback: SocketCallback<S>,
    context: usize,
}

struct TimerSlot<S> {
    deadline: Instant,
    callback: TimerCallback<S>,
    context: usize,
}

/// The cooperative dispatcher described in §4.1 of SPEC_FULL.md.
///
/// `max_sockets`/`max_timers` are fixed at construction: storage is
/// preallocated to that capacity and never grows. `add_timer` past capacity
/// logs and drops the request rather than reallocating, matching "Memory
/// allocation failures at init are fatal. Post-init paths never allocate."
/// (§4.9).
pub struct EventLoop<S> {
    sockets: Vec<SocketSlot<S>>,
    timers: Vec<TimerSlot<S>>,
    max_sockets: usize,
    max_timers: usize,
}

impl<S> EventLoop<S> {
    pub fn new(max_sockets: usize, max_timers: usize) -> EventLoop<S> {
        EventLoop {
            sockets: Vec::with_capacity(max_sockets),
            timers: Vec::with_capacity(max_timers),
            max_sockets,
            max_timers,
        }
    }

    /// Registers a read-ready callback for `fd`. There is no removal API;
    /// sockets live for the lifetime of the subsystem.
    pub fn add_socket(&mut self, fd: RawFd, callback: SocketCallback<S>, context: usize) {
        if self.sockets.len() >= self.max_sockets {
            warn!("event loop: socket table full, dropping registration for fd {fd}");
            return;
        }
        self.sockets.push(SocketSlot {
            fd,
            callback,
            context,
        });
    }

    /// Schedules a one-shot timer at `now + delay`, inserted in deadline
    /// order. Two timers sharing the same `(callback, context)` pair must
    /// never be outstanding simultaneously (Design Notes, §9) — callers are
    /// responsible for calling `del_timer` before rearming.
    pub fn add_timer(
        &mut self,
        now: Instant,
        delay: Duration,
        callback: TimerCallback<S>,
        context: usize,
    ) {
        if self.timers.len() >= self.max_timers {
            warn!("event loop: timer table full, dropping timer");
            return;
        }
        let deadline = now + delay;
        let pos = self
            .timers
            .iter()
            .position(|t| t.deadline > deadline)
            .unwrap_or(self.timers.len());
        self.timers.insert(
            pos,
            TimerSlot {
                deadline,
                callback,
                context,
            },
        );
    }

    /// Removes any timer whose `(callback, context)` pair matches. A no-op
    /// if no such timer is outstanding.
    pub fn del_timer(&mut self, callback: TimerCallback<S>, context: usize) {
        self.timers
            .retain(|t| !(t.callback == callback && t.context == context));
    }

    pub fn has_timer(&self, callback: TimerCallback<S>, context: usize) -> bool {
        self.timers
            .iter()
            .any(|t| t.callback == callback && t.context == context)
    }

    fn apply_requests(&mut self, now: Instant, requests: Vec<TimerRequest<S>>) {
        for req in requests {
            match req {
                TimerRequest::Arm {
                    delay,
                    callback,
                    context,
                } => self.add_timer(now, delay, callback, context),
                TimerRequest::Cancel { callback, context } => self.del_timer(callback, context),
            }
        }
    }

    /// Runs one iteration: waits for the earliest timer deadline or a
    /// readable socket (whichever comes first), dispatches one callback per
    /// ready fd, then drains every expired timer head. Never called
    /// directly in production — `run` loops this forever — but exposed so
    /// tests can drive individual ticks deterministically.
    pub fn poll_once(&mut self, state: &mut S, now: Instant) {
        let mut pollfds: Vec<libc::pollfd> = self
            .sockets
            .iter()
            .map(|s| libc::pollfd {
                fd: s.fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();

        let timeout_ms = match self.timers.first() {
            Some(t) => (t.deadline - now).total_millis().max(1) as i32,
            None => -1,
        };

        if !pollfds.is_empty() || timeout_ms >= 0 {
            // SAFETY: `pollfds` is a valid, exclusively-owned buffer sized to
            // `pollfds.len()`; `poll(2)` treats a zero-length array as an
            // immediate-timeout sleep, which is exactly the "no sockets yet"
            // case here.
            let ready = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if ready > 0 {
                for pfd in &pollfds {
                    if pfd.revents & libc::POLLIN != 0 {
                        if let Some(slot) = self.sockets.iter().find(|s| s.fd == pfd.fd) {
                            trace!("event loop: dispatching socket callback for fd {}", pfd.fd);
                            let (callback, context) = (slot.callback, slot.context);
                            let requests = callback(state, now, pfd.fd, context);
                            self.apply_requests(now, requests);
                        }
                    }
                }
            }
        }

        let drain_now = Instant::now();
        while let Some(head) = self.timers.first() {
            if head.deadline > drain_now {
                break;
            }
            let TimerSlot {
                callback, context, ..
            } = self.timers.remove(0);
            trace!("event loop: dispatching expired timer");
            let requests = callback(state, drain_now, context);
            self.apply_requests(drain_now, requests);
        }
    }

    /// Runs forever, per §4.1: compute the sleep budget from the head
    /// timer (floor 1ms, unbounded if empty), wait, dispatch one callback
    /// per ready fd, then drain every expired timer head.
    pub fn run(&mut self, state: &mut S) -> ! {
        loop {
            let now = Instant::now();
            self.poll_once(state, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        fired: Vec<usize>,
    }

    fn bump(state: &mut Counter, _now: Instant, context: usize) -> Vec<TimerRequest<Counter>> {
        state.fired.push(context);
        Vec::new()
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut lp: EventLoop<Counter> = EventLoop::new(4, 4);
        let t0 = Instant::from_secs(0);
        lp.add_timer(t0, Duration::from_millis(50), bump, 2);
        lp.add_timer(t0, Duration::from_millis(10), bump, 1);
        lp.add_timer(t0, Duration::from_millis(30), bump, 3);

        let mut state = Counter { fired: Vec::new() };
        // Manually drain without sockets/poll by invoking the timer-drain
        // logic at a fixed "now" far past every deadline.
        let now = t0 + Duration::from_millis(100);
        while let Some(head) = lp.timers.first() {
            if head.deadline > now {
                break;
            }
            let slot = lp.timers.remove(0);
            (slot.callback)(&mut state, now, slot.context);
        }
        assert_eq!(state.fired, vec![1, 3, 2]);
    }

    #[test]
    fn del_timer_removes_matching_pair() {
        let mut lp: EventLoop<Counter> = EventLoop::new(4, 4);
        let t0 = Instant::from_secs(0);
        lp.add_timer(t0, Duration::from_millis(10), bump, 7);
        assert!(lp.has_timer(bump, 7));
        lp.del_timer(bump, 7);
        assert!(!lp.has_timer(bump, 7));
    }

    #[test]
    fn add_timer_past_capacity_is_dropped() {
        let mut lp: EventLoop<Counter> = EventLoop::new(4, 1);
        let t0 = Instant::from_secs(0);
        lp.add_timer(t0, Duration::from_millis(10), bump, 1);
        lp.add_timer(t0, Duration::from_millis(20), bump, 2);
        assert!(lp.has_timer(bump, 1));
        assert!(!lp.has_timer(bump, 2));
    }

    #[test]
    fn poll_once_applies_timer_requests_returned_by_callback() {
        fn rearm(state: &mut Counter, _now: Instant, context: usize) -> Vec<TimerRequest<Counter>> {
            state.fired.push(context);
            vec![TimerRequest::Arm {
                delay: Duration::from_millis(5),
                callback: rearm,
                context: context + 1,
            }]
        }
        let mut lp: EventLoop<Counter> = EventLoop::new(0, 4);
        let t0 = Instant::from_secs(0);
        lp.add_timer(t0, Duration::from_millis(1), rearm, 0);

        let mut state = Counter { fired: Vec::new() };
        lp.poll_once(&mut state, t0 + Duration::from_millis(2));
        assert_eq!(state.fired, vec![0]);
        assert!(lp.has_timer(rearm, 1));
    }
}
