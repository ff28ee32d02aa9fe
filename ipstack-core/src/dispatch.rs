//! Protocol demultiplex and softirq worker.
//!
//! Grounded in the teaching stack's `drivers::net` input path (ethertype
//! demux feeding per-protocol queues, drained by a single NAPI-style worker)
//! generalized from an interrupt-context poll loop into a dedicated worker
//! thread woken by [`IrqController`](crate::irq::IrqController).

use std::collections::VecDeque;
use std::sync::Arc;

use ipstack_sync::{klog_debug, Mutex};
use ipstack_types::DevIndex;

/// One entry on a protocol's input queue: the raw bytes received plus which
/// device they arrived on.
pub struct QueueEntry {
    pub dev: DevIndex,
    pub bytes: Vec<u8>,
}

/// A protocol's registered handler and its FIFO input queue.
struct Protocol {
    ethertype: u16,
    queue: VecDeque<QueueEntry>,
    handler: Arc<dyn Fn(&QueueEntry) + Send + Sync + 'static>,
}

/// Demultiplexes link-layer frames by 16-bit ethertype and drains each
/// protocol's queue on the softirq worker thread.
///
/// Ordering: entries within one protocol's queue are FIFO; ordering between
/// different protocols' queues during one drain pass is unspecified, same
/// as spec.md 4.4.
pub struct Dispatcher {
    protocols: Mutex<Vec<Protocol>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            protocols: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for `ethertype`. Handlers run on the softirq
    /// worker thread, never on the caller's thread.
    pub fn protocol_register<F>(&self, ethertype: u16, handler: F)
    where
        F: Fn(&QueueEntry) + Send + Sync + 'static,
    {
        self.protocols.lock().push(Protocol {
            ethertype,
            queue: VecDeque::new(),
            handler: Arc::new(handler),
        });
    }

    /// Link input path: find the matching protocol, copy `bytes` into a
    /// queue entry, and push it. Unknown ethertypes are dropped silently.
    /// Returns `true` if a protocol accepted the frame (the caller can use
    /// this to decide whether to raise the softirq).
    pub fn input_handler(&self, ethertype: u16, bytes: &[u8], dev: DevIndex) -> bool {
        let mut protocols = self.protocols.lock();
        match protocols.iter_mut().find(|p| p.ethertype == ethertype) {
            Some(proto) => {
                proto.queue.push_back(QueueEntry {
                    dev,
                    bytes: bytes.to_vec(),
                });
                true
            }
            None => {
                klog_debug!("ipstack-core: dropping unknown ethertype 0x{ethertype:04x}");
                false
            }
        }
    }

    /// Drain every protocol's queue, invoking its handler once per entry.
    /// Called from the softirq worker thread in response to the input IRQ.
    pub fn drain(&self) {
        // Collect work under the lock, then call handlers with it released —
        // handlers may themselves need the dispatcher (e.g. ARP replying
        // through `input_handler` of a different ethertype would deadlock
        // otherwise).
        let mut protocols = self.protocols.lock();
        let mut work: Vec<(usize, VecDeque<QueueEntry>)> = Vec::new();
        for (i, proto) in protocols.iter_mut().enumerate() {
            if !proto.queue.is_empty() {
                work.push((i, std::mem::take(&mut proto.queue)));
            }
        }
        drop(protocols);

        for (i, entries) in work {
            let handler = Arc::clone(&self.protocols.lock()[i].handler);
            for entry in entries {
                handler(&entry);
            }
        }
    }

    /// Spawn the softirq worker: a thread that runs [`drain`](Self::drain)
    /// each time the input IRQ fires. Intended to be wired as the handler
    /// passed to [`IrqController::request_irq`](crate::irq::IrqController::request_irq).
    pub fn drain_on_irq(self: &Arc<Self>) -> impl Fn() + Send + 'static {
        let this = Arc::clone(self);
        move || this.drain()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
