//! Device/interface registry, IRQ and scheduler plumbing, protocol
//! demultiplex, and the timer service — the mechanism layer protocols are
//! built on top of in `ipstack-proto`.
//!
//! Adapted from the teaching stack's `drivers::net` device layer and
//! `core::irq` dispatch table: same module boundary (drivers move bytes,
//! protocols interpret them), same `&self`-with-interior-mutability trait
//! shape, generalized from a `no_std` kernel's global statics into plain
//! owned values a binary assembles into one `Stack`.

pub mod device;
pub mod dispatch;
pub mod irq;
pub mod timer;

pub use device::{DeviceFlags, DeviceRegistry, Iface, NetDevice, MAX_DEVICES};
pub use dispatch::{Dispatcher, QueueEntry};
pub use irq::{IrqController, IrqFlags, IRQ_LINES};
pub use timer::TimerService;
