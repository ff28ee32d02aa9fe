//! [`NetError`] — the single internal error currency for the protocol stack.
//!
//! Carried over from the teaching stack's `drivers::net::types::NetError`,
//! extended with [`NetError::Interrupted`] for the cancellation semantics
//! spec.md's blocking APIs require (`sched_interrupt` / EINTR) — the teacher,
//! being a `no_std` kernel with syscall-boundary errno conversion, had no
//! occasion to model cancellation as a value at this layer.

/// Comprehensive network error type. Every blocking or fallible operation in
/// `ipstack-proto`/`ipstack-core` returns this instead of an `errno`; the
/// errno mapping is kept only as documentation of intent, not used directly
/// in this repository (there is no syscall boundary to cross).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NetError {
    /// Operation would block (EAGAIN / EWOULDBLOCK).
    #[error("operation would block")]
    WouldBlock,
    /// Connection refused by remote host (ECONNREFUSED).
    #[error("connection refused")]
    ConnectionRefused,
    /// Connection reset by remote host (ECONNRESET).
    #[error("connection reset by peer")]
    ConnectionReset,
    /// Operation timed out (ETIMEDOUT).
    #[error("operation timed out")]
    TimedOut,
    /// Address already in use (EADDRINUSE).
    #[error("address already in use")]
    AddressInUse,
    /// Requested address not available on this host (EADDRNOTAVAIL).
    #[error("address not available")]
    AddressNotAvailable,
    /// Socket is not connected / not in the right state (ENOTCONN).
    #[error("socket not connected")]
    NotConnected,
    /// Network is unreachable — no matching route (ENETUNREACH).
    #[error("no route to host")]
    NoRoute,
    /// Outgoing source address does not match the selected egress
    /// interface's unicast address (strong-endpoint policy violation).
    #[error("unable to output with specified source")]
    UnableToOutputWithSource,
    /// Permission denied (EPERM).
    #[error("permission denied")]
    PermissionDenied,
    /// Invalid argument (EINVAL).
    #[error("invalid argument")]
    InvalidArgument,
    /// No buffer space / table full (ENOBUFS).
    #[error("no buffer space available")]
    NoBufferSpace,
    /// Payload exceeds the path MTU and fragmentation is not implemented.
    #[error("message too long for device MTU")]
    MessageTooLong,
    /// Socket not bound — `bind()` was not called (EINVAL).
    #[error("socket not bound")]
    SocketNotBound,
    /// Operation not supported in the socket's current state (EOPNOTSUPP).
    #[error("operation not supported in current state")]
    OperationNotSupported,
    /// Blocking call was cancelled by `sched_interrupt` (EINTR).
    #[error("interrupted")]
    Interrupted,
    /// Underlying device is administratively down or the transmit path failed.
    #[error("device not ready")]
    DeviceDown,
}

impl NetError {
    /// POSIX errno this would map to at a syscall boundary. Kept for
    /// traceability to the teaching stack; unused by this repository's API.
    pub const fn to_errno(self) -> i32 {
        match self {
            Self::WouldBlock => -11,
            Self::ConnectionRefused => -111,
            Self::ConnectionReset => -104,
            Self::TimedOut => -110,
            Self::AddressInUse => -98,
            Self::AddressNotAvailable => -99,
            Self::NotConnected => -107,
            Self::NoRoute => -101,
            Self::UnableToOutputWithSource => -99,
            Self::PermissionDenied => -1,
            Self::InvalidArgument => -22,
            Self::NoBufferSpace => -105,
            Self::MessageTooLong => -90,
            Self::SocketNotBound => -22,
            Self::OperationNotSupported => -95,
            Self::Interrupted => -4,
            Self::DeviceDown => -100,
        }
    }
}

