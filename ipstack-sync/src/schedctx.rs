//! [`SchedCtx`] — the cancellable, multi-waiter, mutex-associated wait set
//! spec.md §4.3/§9 describes.
//!
//! Grounded in the teaching stack's `lib::waitqueue::WaitQueue` (a
//! fixed-capacity queue of blocked kernel tasks protected by an `IrqMutex`,
//! woken via `block_current_task`/`unblock_task`). In a userspace process
//! the scheduler *is* the OS, so the waiter list collapses to a
//! `std::sync::Condvar` paired with whatever `Mutex` the caller already
//! holds — the shape (sleep/wake_all/interrupt/destroy, a live waiter count,
//! a sticky interrupted flag) is identical.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, MutexGuard};
use std::time::{Duration, Instant};

use ipstack_types::NetError;

/// A condition context: a condvar, a live waiter count, and an `interrupted`
/// sticky flag.
///
/// # Contract (spec.md §4.3)
///
/// - [`sleep`](SchedCtx::sleep) atomically releases the caller's mutex guard
///   and blocks; it always returns with the mutex re-acquired, and fails
///   (`Err`) when the context was interrupted or a deadline elapsed.
/// - [`wakeup`](SchedCtx::wakeup) wakes all current waiters.
/// - [`interrupt`](SchedCtx::interrupt) sets the sticky flag and wakes all
///   waiters; every sleeper — current and subsequent — fails immediately
///   until the waiter count drains to zero, at which point the flag clears
///   itself automatically.
/// - [`destroy`](SchedCtx::destroy) succeeds iff there are no live waiters.
pub struct SchedCtx {
    cond: Condvar,
    waiters: AtomicUsize,
    interrupted: AtomicBool,
}

impl SchedCtx {
    pub const fn new() -> Self {
        Self {
            cond: Condvar::new(),
            waiters: AtomicUsize::new(0),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Number of threads currently blocked in [`sleep`](Self::sleep).
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }

    /// Atomically release `guard`, block until woken (or a deadline / an
    /// interrupt fires), then re-acquire it. Always returns the
    /// re-acquired guard; `Ok(())` means a normal wakeup occurred, `Err`
    /// carries the reason sleep did not complete normally.
    pub fn sleep<'a, T>(
        &self,
        guard: MutexGuard<'a, T>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, T>, Result<(), NetError>) {
        if self.interrupted.load(Ordering::Acquire) {
            return (guard, Err(NetError::Interrupted));
        }

        self.waiters.fetch_add(1, Ordering::AcqRel);

        let (guard, wait_err) = match deadline {
            None => match self.cond.wait(guard) {
                Ok(g) => (g, None),
                Err(poisoned) => (poisoned.into_inner(), None),
            },
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    (guard, Some(NetError::TimedOut))
                } else {
                    let timeout = deadline - now;
                    match self.cond.wait_timeout(guard, timeout) {
                        Ok((g, wr)) if wr.timed_out() => (g, Some(NetError::TimedOut)),
                        Ok((g, _)) => (g, None),
                        Err(poisoned) => {
                            let (g, wr) = poisoned.into_inner();
                            (g, if wr.timed_out() { Some(NetError::TimedOut) } else { None })
                        }
                    }
                }
            }
        };

        let remaining = self.waiters.fetch_sub(1, Ordering::AcqRel) - 1;
        if self.interrupted.load(Ordering::Acquire) {
            if remaining == 0 {
                self.interrupted.store(false, Ordering::Release);
            }
            return (guard, Err(NetError::Interrupted));
        }

        match wait_err {
            Some(e) => (guard, Err(e)),
            None => (guard, Ok(())),
        }
    }

    /// Wake every current waiter for a normal state-change notification.
    pub fn wakeup(&self) {
        self.cond.notify_all();
    }

    /// Cancel every current and subsequent sleeper until the waiter count
    /// drains to zero, at which point the flag clears itself.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.cond.notify_all();
    }

    /// Succeeds iff there are no live waiters. On failure the caller must
    /// [`interrupt`](Self::interrupt) and retry once waiters have drained —
    /// never tear down a context a sleeper still references.
    pub fn destroy(&self) -> bool {
        self.waiter_count() == 0
    }
}

impl Default for SchedCtx {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience: a fixed timeout expressed as a deadline from "now".
pub fn deadline_in(d: Duration) -> Instant {
    Instant::now() + d
}
