//! Crate-wide error type.
//!
//! Shaped after the teacher's `MulticastError`
//! (`iface/interface/igmp.rs`): a plain enum, hand-written `Display`, and a
//! `std::error::Error` impl. No `thiserror`/`anyhow` — the teacher uses
//! neither.

use core::fmt;

/// Errors surfaced across the control-plane API boundary.
///
/// Per the failure-semantics design (§7/§4.9 of `SPEC_FULL.md`), only fatal
/// init-time conditions are represented here; transient send failures,
/// malformed ingress, and capacity exhaustion are logged and swallowed at
/// their call site rather than propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A socket, timer, or group-table slot request exceeded capacity fixed
    /// at construction time.
    CapacityExhausted,
    /// Packet capture/injection handle creation failed (missing privilege,
    /// unknown interface, etc).
    HandleCreation,
    /// A byte buffer was too short to hold the attempted parse or emit.
    Truncated,
    /// A malformed field (bad checksum, bad length, unknown sub-type) was
    /// encountered.
    Malformed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::CapacityExhausted => write!(f, "capacity exhausted"),
            Error::HandleCreation => write!(f, "handle creation failed"),
            Error::Truncated => write!(f, "buffer too short"),
            Error::Malformed => write!(f, "malformed packet"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
