//! [`Mutex`] — a thin wrapper around `std::sync::Mutex`.
//!
//! Grounded in the teaching stack's `IrqMutex`: there, the wrapper existed to
//! disable interrupts/preemption around the critical section and to support
//! poison recovery after a panic-time force-unlock. In a userspace process
//! there is no IRQ state to save, but the poison-recovery shape is worth
//! keeping — a panicking protocol-stack thread must not permanently wedge
//! the ARP cache or a PCB table for every other thread, so `lock()` recovers
//! from poison instead of propagating it.

use std::sync::{self, LockResult, MutexGuard};

/// A mutex that never propagates poisoning to callers.
///
/// If a thread panics while holding the lock, the protected data may be
/// left in an inconsistent state; this mirrors the kernel's "poisoned"
/// `IrqMutex` concept but, since there is no panic-recovery longjmp in this
/// process, we simply recover the guard and let the caller's own invariants
/// (re-validated on every access) catch anything left half-written.
pub struct Mutex<T> {
    inner: sync::Mutex<T>,
}

impl<T> Mutex<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            inner: sync::Mutex::new(data),
        }
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        recover(self.inner.lock())
    }

    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.inner.try_lock() {
            Ok(guard) => Some(guard),
            Err(sync::TryLockError::Poisoned(p)) => Some(p.into_inner()),
            Err(sync::TryLockError::WouldBlock) => None,
        }
    }
}

fn recover<T>(result: LockResult<MutexGuard<'_, T>>) -> MutexGuard<'_, T> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

