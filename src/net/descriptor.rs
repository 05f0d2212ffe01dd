//! Minimal identity wrapper for a socket-backed descriptor (§3, §4.2).
//!
//! The original library tagged every socket with its raw OS file
//! descriptor for logging and for the coroutine scheduler's own
//! bookkeeping. Tokio owns the raw fd internally and does not expose a
//! stable integer across all platforms in the same way, so this crate
//! assigns its own process-wide sequential id at construction time
//! instead - stable, loggable, and never reused while the process runs.
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

/// A stable, loggable identity for one socket-backed connection or
/// listener, independent of the underlying OS handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(u64);

impl Descriptor {
    #[inline]
    pub(crate) fn next() -> Self {
        Self(NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fd#{}", self.0)
    }
}
