//! Concurrency primitives and structured logging for the `ipstack` workspace.
//!
//! Adapted from the teaching stack's `slopos_lib` crate: the same module
//! shapes (`spinlock` → [`mutex`], `waitqueue` → [`schedctx`], `clock`,
//! `klog`) carried from a `no_std` kernel into a plain `std` process. Where
//! the kernel needed IRQ-disabling ticket locks, a userspace process just
//! needs `std::sync::Mutex` — the *shape* of the API (a thin, documented
//! wrapper rather than bare `std::sync` types sprinkled through call sites)
//! is what's kept.

mod clock;
pub mod klog;
mod mutex;
mod schedctx;

pub use clock::{monotonic_ns, uptime_secs};
pub use klog::{init_logging, init_logging_with_default};
pub use mutex::Mutex;
pub use schedctx::{deadline_in, SchedCtx};

// klog_error!/klog_warn!/klog_info!/klog_debug!/klog_trace! are exported via
// `#[macro_export]` in `klog.rs` and are already visible at the crate root,
// e.g. `ipstack_sync::klog_debug!(...)`.
#[doc(hidden)]
pub use klog::__log;
