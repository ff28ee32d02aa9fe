//! Wire-level newtypes and error taxonomy shared across the `ipstack` workspace.
//!
//! This crate sits at the bottom of the dependency graph: no I/O, no locking,
//! no allocation beyond what `std` gives us for free. Every other crate in
//! the workspace depends on it for address/port/error types so that byte-order
//! mixups and address/port confusion are caught at compile time instead of at
//! 3am over a packet capture.

mod addr;
mod error;
mod proto;

pub use addr::{DevIndex, Endpoint, MacAddr, Port};
pub use error::NetError;
pub use proto::{
    ARP_HEADER_LEN, ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET, ARP_OPER_REPLY, ARP_OPER_REQUEST,
    ARP_PLEN_IPV4, ARP_PTYPE_IPV4, ETH_ADDR_LEN, ETH_HEADER_LEN, EtherType, ICMP_HEADER_LEN,
    ICMP_TYPE_ECHO, ICMP_TYPE_ECHO_REPLY, IPV4_HEADER_LEN_MIN, IpProtocol, TCP_HEADER_LEN_MIN,
    UDP_HEADER_LEN,
};

/// Re-export so downstream crates can write `ipstack_types::Ipv4Addr` without
/// importing `std::net` themselves for the wire-format helpers.
pub use addr::Ipv4Addr;
