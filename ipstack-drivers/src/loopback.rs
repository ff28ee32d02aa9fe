//! The loopback device (`lo`): queues transmitted frames and replays them
//! into the stack's input path on a dedicated worker thread.
//!
//! Grounded in the original `driver/loopback.c`: a mutex-guarded FIFO queue
//! (capacity [`QUEUE_LIMIT`]), `transmit` pushing and raising "its own
//! IRQ", and an ISR that drains the queue calling `net_input_handler` per
//! entry. The C driver's IRQ is a real signal line shared with the kernel's
//! interrupt thread; here the same "transmit now, deliver later, on a
//! thread that isn't the caller's" shape is built from a `Condvar` a
//! worker thread waits on — the device's own interrupt line, reduced to
//! what it actually does (wake a waiting consumer).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar};
use std::thread::JoinHandle;
use std::time::Duration;

use ipstack_core::{DeviceFlags, NetDevice};
use ipstack_sync::{klog_debug, Mutex};
use ipstack_types::{MacAddr, NetError};

use crate::sink::{LinkInput, Sink};

/// Maximum size of an IP datagram (loopback has no link header either).
const LOOPBACK_MTU: u16 = u16::MAX;
/// Matches the original driver's fixed queue depth.
const QUEUE_LIMIT: usize = 16;

struct QueueEntry {
    ethertype: u16,
    bytes: Vec<u8>,
}

/// State shared between the device handle and its worker thread — kept
/// apart from `LoopbackDevice` itself so the thread can hold an `Arc<Inner>`
/// without needing a `'static` borrow of the device.
struct Inner {
    sink: Sink,
    queue: Mutex<VecDeque<QueueEntry>>,
    cond: Condvar,
    running: AtomicBool,
}

pub struct LoopbackDevice {
    name: String,
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackDevice {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: Arc::new(Inner {
                sink: Sink::new(),
                queue: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Bind the stack's link-input callback, obtained from
    /// `Stack::register_device`'s returned index.
    pub fn bind(&self, sink: LinkInput) {
        self.inner.sink.bind(sink);
    }
}

impl NetDevice for LoopbackDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> MacAddr {
        MacAddr::ZERO
    }

    fn mtu(&self) -> u16 {
        LOOPBACK_MTU
    }

    fn flags(&self) -> DeviceFlags {
        // Loopback has no link header and is never ARP-gated.
        DeviceFlags::empty()
    }

    /// Spawn the worker thread that plays back queued frames — the
    /// userspace-thread equivalent of registering `loopback_isr` on its own
    /// IRQ line.
    fn open(&self) -> Result<(), NetError> {
        self.inner.running.store(true, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name(format!("ipstack-{}", self.name))
            .spawn(move || loop_back_worker(inner))
            .expect("spawn loopback worker");
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn close(&self) -> Result<(), NetError> {
        self.inner.running.store(false, Ordering::Release);
        self.inner.cond.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn transmit(&self, ethertype: u16, bytes: &[u8], _dst: MacAddr) -> Result<(), NetError> {
        let mut queue = self.inner.queue.lock();
        if queue.len() >= QUEUE_LIMIT {
            return Err(NetError::NoBufferSpace);
        }
        queue.push_back(QueueEntry {
            ethertype,
            bytes: bytes.to_vec(),
        });
        drop(queue);
        self.inner.cond.notify_all();
        Ok(())
    }
}

/// Drain `inner.queue` into `inner.sink`, blocking on the condvar between
/// batches, until `close()` clears `running`.
fn loop_back_worker(inner: Arc<Inner>) {
    let mut queue = inner.queue.lock();
    while inner.running.load(Ordering::Acquire) {
        match queue.pop_front() {
            Some(entry) => {
                drop(queue);
                klog_debug!(
                    "ipstack-drivers: loopback replay type=0x{:04x} len={}",
                    entry.ethertype,
                    entry.bytes.len()
                );
                inner.sink.deliver(entry.ethertype, &entry.bytes);
                queue = inner.queue.lock();
            }
            None => {
                let (guard, _) = inner
                    .cond
                    .wait_timeout(queue, Duration::from_millis(200))
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                queue = guard;
            }
        }
    }
}
