//! Monotonic clock — free functions, no locking required.
//!
//! Mirrors the teaching stack's `lib::clock` module (itself a thin wrapper
//! over a hardware counter): callers ask for uptime, not wall-clock time, so
//! ARP aging and the timer service are immune to clock-step adjustments.

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

fn start() -> Instant {
    *START.get_or_init(Instant::now)
}

/// Monotonic time since the stack's clock was first touched, in nanoseconds.
#[inline]
pub fn monotonic_ns() -> u64 {
    start().elapsed().as_nanos() as u64
}

/// Monotonic uptime in whole seconds — the unit spec.md's ARP `TIMEOUT` (30s)
/// and the 1-second timer tick are expressed in.
#[inline]
pub fn uptime_secs() -> u64 {
    start().elapsed().as_secs()
}
