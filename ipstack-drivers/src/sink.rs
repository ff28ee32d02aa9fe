//! The "link input" callback every device hands frames to.
//!
//! A driver does not hold a [`Stack`](ipstack_proto) at construction time —
//! the stack doesn't exist until after every device is registered with it.
//! Instead each device stores a [`Sink`] it is told about exactly once,
//! right after `Stack::register_device` returns its [`DevIndex`], and
//! invokes it from its own input thread or transmit path. This is the
//! concrete shape of spec.md §6's driver contract: "For reception it
//! invokes the stack's `input_handler(type, bytes, dev)` from its ISR."

use std::sync::{Arc, OnceLock};

/// `(ethertype, payload)` handed to the stack, already stripped of any
/// driver-specific framing (e.g. the 14-byte Ethernet header).
pub type LinkInput = Arc<dyn Fn(u16, &[u8]) + Send + Sync>;

/// A write-once slot for a device's link-input callback.
#[derive(Default)]
pub struct Sink(OnceLock<LinkInput>);

impl Sink {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Bind the callback. Calling this a second time is a no-op — a device
    /// is registered with exactly one stack for its lifetime.
    pub fn bind(&self, f: LinkInput) {
        let _ = self.0.set(f);
    }

    /// Hand a frame to the bound callback, if any. Frames arriving before
    /// `bind` (impossible in `ipstack-cli`'s startup order, but reachable
    /// if a test harness injects before binding) are silently dropped.
    pub fn deliver(&self, ethertype: u16, bytes: &[u8]) {
        if let Some(f) = self.0.get() {
            f(ethertype, bytes);
        }
    }
}
