//! Structured logging macros.
//!
//! The teaching stack's `klog` module dispatched to whichever backend the
//! kernel had available at the time (early boot serial port vs. a later
//! in-memory ring buffer), because there is no `log` crate inside a `no_std`
//! kernel. A userspace process has no such problem, so these macros are a
//! thin, zero-cost layer over the `log` crate — kept as macros (rather than
//! calling `log::info!` etc. directly at every call site) only so the
//! `ipstack-` prefix and target conventions stay consistent, matching the
//! shape callers already expect from `klog_info!`/`klog_debug!`.

/// Log at error level, tagged with the emitting module's target.
#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => { $crate::__log::error!($($arg)*) };
}

/// Log at warn level.
#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => { $crate::__log::warn!($($arg)*) };
}

/// Log at info level — the default level for stack lifecycle events
/// (device up/down, route changes, TCP state transitions).
#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => { $crate::__log::info!($($arg)*) };
}

/// Log at debug level — per-packet tracing, ARP resolution attempts.
#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => { $crate::__log::debug!($($arg)*) };
}

/// Log at trace level — hex dumps and checksum intermediate values.
#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => { $crate::__log::trace!($($arg)*) };
}

/// Re-export of `log` under a private path so the exported macros can
/// reference it hygienically from any crate that depends on `ipstack-sync`
/// without that crate also needing its own direct `log` dependency.
#[doc(hidden)]
pub use log as __log;

/// Install `env_logger` as the global logger, honoring `RUST_LOG`.
///
/// Call once from each binary's `main()` (grounded in the teaching stack's
/// equivalent `klog::init()` call from `kernel_main`); library crates must
/// never call this themselves.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_micros()
        .try_init();
}

/// Install `env_logger` with `level` as the default filter, overridable by
/// `RUST_LOG`. Used when a binary only knows its desired log level after
/// parsing its own configuration (e.g. `ipstack-cli`'s `--log-level` flag),
/// rather than at the very start of `main()`.
pub fn init_logging_with_default(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_micros()
        .try_init();
}
