//! ARP, IPv4, ICMP, UDP and TCP protocol implementations, plus the
//! [`Stack`] value that wires them to `ipstack-core`'s device registry,
//! dispatcher, IRQ controller, and timer service.
//!
//! Module boundary: each protocol module contributes an `impl Stack` block
//! for its slice of the public surface (`arp_input`, `ip_input`/`ip_output`,
//! `icmp_input`, `udp_*`, `tcp_*`) plus whatever private state it needs
//! (`ArpCache`, `RouteTable`, `UdpTable`, `TcpTable`). `stack.rs` owns none
//! of the protocol logic itself — only construction, registration, and the
//! cross-cutting paths (link input, run/shutdown, the global interrupt
//! event) that touch more than one protocol.

pub mod arp;
pub mod checksum;
pub mod icmp;
pub mod ip;
pub mod route;
mod stack;
pub mod tcp;
pub mod udp;

pub use arp::{build_reply, build_request, ArpCache, Resolution, CACHE_SIZE, TIMEOUT_SECS};
pub use route::{Route, RouteTable};
pub use stack::{Stack, IRQ_LINK_INPUT, IRQ_TIMER_TICK};
pub use tcp::{TcpTable, RECV_BUF_SIZE, TCP_PCB_COUNT};
pub use udp::{UdpTable, UDP_PCB_COUNT};
