//! Timer service: a list of `(interval, last, handler)` triples, advanced by
//! an external one-second wall-clock tick.
//!
//! Spec.md 4.5 describes something much simpler than the teaching stack's
//! 256-slot timer wheel (`drivers::net::timer::NetTimerWheel`, built for
//! sub-second TCP retransmit/delayed-ACK granularity this system doesn't
//! implement): a flat list scanned once per tick. The flat-list shape is
//! grounded directly in spec.md's own wording rather than the wheel, since
//! only one consumer (ARP aging) exists and a handful of linear entries
//! scanned once a second costs nothing.

use std::sync::Arc;

use ipstack_sync::{klog_debug, uptime_secs, Mutex};

struct TimerEntry {
    interval_secs: u64,
    last_secs: u64,
    handler: Arc<dyn Fn() + Send + Sync + 'static>,
    name: &'static str,
}

/// Registers periodic callbacks and fires those whose interval has elapsed
/// on each call to [`tick`](Self::tick).
///
/// All timer callbacks run on the thread that calls `tick` — per spec.md,
/// "the interrupt thread" (here, whichever thread drives the one-second
/// wall-clock loop, typically the IRQ controller's thread via a registered
/// timer IRQ).
pub struct TimerService {
    entries: Mutex<Vec<TimerEntry>>,
}

impl TimerService {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register `handler` to run every `interval_secs` seconds, counting
    /// from registration time.
    pub fn timer_register<F>(&self, interval_secs: u64, name: &'static str, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.entries.lock().push(TimerEntry {
            interval_secs,
            last_secs: uptime_secs(),
            handler: Arc::new(handler),
            name,
        });
    }

    /// Advance the service: for every registered timer, if the elapsed time
    /// since it last fired strictly exceeds its interval, invoke its handler
    /// and reset its `last` stamp to now.
    ///
    /// Handlers are invoked with the table unlocked — registering a new
    /// timer or calling `tick` re-entrantly from a handler cannot deadlock,
    /// mirroring the teaching wheel's "collect under lock, dispatch outside
    /// it" discipline.
    pub fn tick(&self) {
        let now = uptime_secs();
        let due: Vec<usize> = {
            let mut entries = self.entries.lock();
            let mut due = Vec::new();
            for (i, entry) in entries.iter_mut().enumerate() {
                if entry.interval_secs < now.saturating_sub(entry.last_secs) {
                    entry.last_secs = now;
                    due.push(i);
                }
            }
            due
        };

        for i in due {
            let Some((name, handler)) = self
                .entries
                .lock()
                .get(i)
                .map(|e| (e.name, Arc::clone(&e.handler)))
            else {
                continue;
            };
            klog_debug!("ipstack-core: timer '{name}' fired");
            handler();
        }
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}
