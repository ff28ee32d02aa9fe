//! Concrete [`ipstack_core::NetDevice`] implementations: a Linux TAP device
//! for real traffic, a loopback device, and a capture-only dummy device for
//! tests. Each binds a [`sink::Sink`] supplied by `Stack::register_device`
//! and calls it from its own reception path, exactly as spec.md's driver
//! contract describes.

pub mod dummy;
pub mod loopback;
pub mod sink;
pub mod tap;

pub use dummy::{CapturedFrame, DummyDevice};
pub use loopback::LoopbackDevice;
pub use sink::{LinkInput, Sink};
pub use tap::TapDevice;
