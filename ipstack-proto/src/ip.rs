//! IPv4 input, routing, and output — spec.md 4.7.
//!
//! Grounded in the teaching stack's `drivers::net::ipv4::handle_rx` for the
//! validation order (version, length, checksum, then destination-address
//! acceptance) and `mod.rs::ipv4_header_checksum` for the header layout;
//! output and the strong-endpoint policy have no teaching-stack counterpart
//! (`drivers::net::ipv4` there only ever originates loopback-local traffic)
//! and are written directly from spec.md 4.7's algorithm.

use ipstack_sync::{klog_debug, Mutex};
use ipstack_types::{DevIndex, Ipv4Addr, NetError, IPV4_HEADER_LEN_MIN};

use crate::checksum;
use crate::route::Route;
use crate::stack::Stack;

/// A parsed IPv4 header plus a view of the payload that follows it.
pub struct Parsed<'a> {
    pub version: u8,
    pub ihl: u8,
    pub total_len: u16,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: &'a [u8],
}

fn parse(data: &[u8]) -> Option<Parsed<'_>> {
    if data.len() < IPV4_HEADER_LEN_MIN {
        return None;
    }
    let version = data[0] >> 4;
    let ihl = data[0] & 0x0f;
    let hlen = ihl as usize * 4;
    if version != 4 || hlen < IPV4_HEADER_LEN_MIN || data.len() < hlen {
        return None;
    }
    let total_len = u16::from_be_bytes([data[2], data[3]]);
    if (total_len as usize) < hlen || (total_len as usize) > data.len() {
        return None;
    }
    if checksum::checksum(&data[..hlen], 0) != 0 {
        return None;
    }
    let flags_offset = u16::from_be_bytes([data[6], data[7]]);
    let more_fragments = flags_offset & 0x2000 != 0;
    let fragment_offset = flags_offset & 0x1fff;
    if more_fragments || fragment_offset != 0 {
        return None;
    }
    let protocol = data[9];
    let src = Ipv4Addr([data[12], data[13], data[14], data[15]]);
    let dst = Ipv4Addr([data[16], data[17], data[18], data[19]]);
    Some(Parsed {
        version,
        ihl,
        total_len,
        protocol,
        src,
        dst,
        payload: &data[hlen..total_len as usize],
    })
}

impl Stack {
    /// Link input path for ethertype IPv4 queue entries.
    pub fn ip_input(&self, dev: DevIndex, bytes: &[u8]) {
        let Some(parsed) = parse(bytes) else {
            klog_debug!("ipstack-proto: ip_input drop — malformed/fragmented header");
            return;
        };
        let _ = parsed.version;
        let _ = parsed.ihl;

        let Some(iface) = self.devices.get_iface(dev) else {
            klog_debug!("ipstack-proto: ip_input drop — no iface on dev {dev}");
            return;
        };

        let accepted = parsed.dst == iface.unicast
            || parsed.dst == iface.broadcast
            || parsed.dst.is_limited_broadcast();
        if !accepted {
            klog_debug!("ipstack-proto: ip_input drop — not for us ({})", parsed.dst);
            return;
        }

        self.dispatch_upper(parsed.protocol, parsed.payload, parsed.src, parsed.dst, dev);
    }

    /// Allocate the next 16-bit IPv4 identification value from the
    /// process-wide monotonic counter, seeded at 128 per spec.md 4.7.
    fn next_ip_id(&self) -> u16 {
        let mut id = self.ip_id.lock();
        let val = *id;
        *id = id.wrapping_add(1);
        val
    }

    /// `ip_output(proto, bytes, src, dst)`: route, validate the
    /// strong-endpoint policy, build the header, and hand off to
    /// device-output for link resolution and transmission.
    pub fn ip_output(
        &self,
        protocol: u8,
        payload: &[u8],
        src: Ipv4Addr,
        dst: Ipv4Addr,
    ) -> Result<(), NetError> {
        if (dst.is_limited_broadcast() || self.is_directed_broadcast(dst)) && src.is_unspecified() {
            return Err(NetError::InvalidArgument);
        }

        let route = self.routes.lookup(dst).ok_or(NetError::NoRoute)?;
        let iface = self
            .devices
            .get_iface(route.dev)
            .ok_or(NetError::NoRoute)?;

        if !src.is_unspecified() && src != iface.unicast {
            return Err(NetError::UnableToOutputWithSource);
        }

        let nexthop = if route.nexthop.is_unspecified() {
            dst
        } else {
            route.nexthop
        };

        let mtu = self.devices.mtu_of(route.dev).ok_or(NetError::NoRoute)?;
        if IPV4_HEADER_LEN_MIN + payload.len() > mtu as usize {
            return Err(NetError::MessageTooLong);
        }

        let total_len = (IPV4_HEADER_LEN_MIN + payload.len()) as u16;
        let id = self.next_ip_id();

        let mut header = [0u8; IPV4_HEADER_LEN_MIN];
        header[0] = (4 << 4) | 5;
        header[1] = 0;
        header[2..4].copy_from_slice(&total_len.to_be_bytes());
        header[4..6].copy_from_slice(&id.to_be_bytes());
        header[6..8].copy_from_slice(&0u16.to_be_bytes());
        header[8] = 255;
        header[9] = protocol;
        header[10..12].copy_from_slice(&0u16.to_be_bytes());
        header[12..16].copy_from_slice(iface.unicast.as_bytes());
        header[16..20].copy_from_slice(dst.as_bytes());
        let csum = checksum::checksum(&header, 0);
        header[10..12].copy_from_slice(&csum.to_be_bytes());

        let mut datagram = Vec::with_capacity(total_len as usize);
        datagram.extend_from_slice(&header);
        datagram.extend_from_slice(payload);

        self.ip_device_output(route, nexthop, datagram)
    }

    fn is_directed_broadcast(&self, dst: Ipv4Addr) -> bool {
        self.devices
            .ifaces()
            .into_iter()
            .any(|(_, iface)| dst == iface.broadcast)
    }

    /// Resolve the link-layer destination for `nexthop` and transmit.
    fn ip_device_output(&self, route: Route, nexthop: Ipv4Addr, datagram: Vec<u8>) -> Result<(), NetError> {
        let flags = self.devices.flags_of(route.dev).ok_or(NetError::NoRoute)?;

        let dst_mac = if !flags.contains(ipstack_core::DeviceFlags::NEEDS_ARP) {
            ipstack_types::MacAddr::ZERO
        } else if nexthop.is_limited_broadcast() || self.is_directed_broadcast(nexthop) {
            ipstack_types::MacAddr::BROADCAST
        } else {
            let our_mac = self.devices.mac_of(route.dev).ok_or(NetError::NoRoute)?;
            let iface = self.devices.get_iface(route.dev).ok_or(NetError::NoRoute)?;
            match self.arp.resolve(route.dev, our_mac, iface.unicast, nexthop) {
                (crate::arp::Resolution::Found(mac), _) => mac,
                (crate::arp::Resolution::Incomplete, Some(request)) => {
                    let _ = self.devices.output(
                        route.dev,
                        ipstack_types::ETHERTYPE_ARP,
                        &request,
                        ipstack_types::MacAddr::BROADCAST,
                    );
                    return Err(NetError::WouldBlock);
                }
                (crate::arp::Resolution::Incomplete, None) => return Err(NetError::WouldBlock),
            }
        };

        self.devices
            .output(route.dev, ipstack_types::ETHERTYPE_IPV4, &datagram, dst_mac)
    }
}

/// Shared monotonic IP identification counter, seeded at 128 per spec.md 4.7.
pub(crate) fn new_ip_id_counter() -> Mutex<u16> {
    Mutex::new(128)
}
