//! A transmit-only sink device with no link header and no addresses.
//!
//! Grounded directly in the original `driver/dummy.c`: `dev->hlen = 0`,
//! `dev->alen = 0`, MTU is the largest an IP datagram can be, and
//! `transmit` only logs and drops — there is no wire. The one addition
//! here is that dropped frames are captured rather than merely hex-dumped,
//! so `ipstack-tests` can assert on exactly what the stack tried to send
//! (spec.md §8's ARP-request and ICMP-echo-reply scenarios both observe
//! "emits a frame matching ..." through this capture, not a real NIC).

use std::sync::Arc;

use ipstack_core::{DeviceFlags, NetDevice};
use ipstack_sync::{klog_debug, Mutex};
use ipstack_types::{MacAddr, NetError};

use crate::sink::{LinkInput, Sink};

/// Maximum size of an IP datagram (the dummy device never fragments).
const DUMMY_MTU: u16 = u16::MAX;

/// One frame captured by [`DummyDevice::transmit`].
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub ethertype: u16,
    pub bytes: Vec<u8>,
    pub dst: MacAddr,
}

pub struct DummyDevice {
    name: String,
    sink: Sink,
    captured: Mutex<Vec<CapturedFrame>>,
}

impl DummyDevice {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sink: Sink::new(),
            captured: Mutex::new(Vec::new()),
        })
    }

    /// Bind the stack's link-input callback, obtained from
    /// `Stack::register_device`'s returned index.
    pub fn bind(&self, sink: LinkInput) {
        self.sink.bind(sink);
    }

    /// Inject a frame as if it had arrived on the wire — the harness
    /// equivalent of the original `test/step*.c` programs feeding crafted
    /// bytes straight to `net_input_handler`.
    pub fn inject(&self, ethertype: u16, bytes: &[u8]) {
        self.sink.deliver(ethertype, bytes);
    }

    /// Drain every frame captured since the last call.
    pub fn take_captured(&self) -> Vec<CapturedFrame> {
        std::mem::take(&mut *self.captured.lock())
    }
}

impl NetDevice for DummyDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> MacAddr {
        MacAddr::ZERO
    }

    fn mtu(&self) -> u16 {
        DUMMY_MTU
    }

    fn flags(&self) -> DeviceFlags {
        // No link header, no addresses: neither ARP-gated nor a broadcast
        // medium.
        DeviceFlags::empty()
    }

    fn open(&self) -> Result<(), NetError> {
        Ok(())
    }

    fn close(&self) -> Result<(), NetError> {
        Ok(())
    }

    fn transmit(&self, ethertype: u16, bytes: &[u8], dst: MacAddr) -> Result<(), NetError> {
        klog_debug!("ipstack-drivers: dummy tx type=0x{ethertype:04x} len={}", bytes.len());
        self.captured.lock().push(CapturedFrame {
            ethertype,
            bytes: bytes.to_vec(),
            dst,
        });
        Ok(())
    }
}
