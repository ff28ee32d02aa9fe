//! ICMP echo/echo-reply — spec.md 4.8.
//!
//! The teaching stack has no ICMP module of its own (loopback-only traffic
//! never needed ping support), so this is written directly from spec.md's
//! wire layout, following the same validate-then-dispatch shape as
//! [`crate::ip::Stack::ip_input`] and [`crate::arp`]'s byte-laying style.

use ipstack_sync::klog_debug;
use ipstack_types::{Ipv4Addr, ICMP_HEADER_LEN, ICMP_TYPE_ECHO, ICMP_TYPE_ECHO_REPLY};

use crate::checksum;
use crate::stack::Stack;

impl Stack {
    /// Validate an ICMP message and, on ECHO, send ECHOREPLY with the
    /// `code`/`values`/payload copied verbatim.
    pub fn icmp_input(&self, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) {
        if payload.len() < ICMP_HEADER_LEN {
            klog_debug!("ipstack-proto: icmp drop — too short");
            return;
        }
        if checksum::checksum(payload, 0) != 0 {
            klog_debug!("ipstack-proto: icmp drop — bad checksum");
            return;
        }

        let kind = payload[0];
        let code = payload[1];
        let values = &payload[4..8];
        let data = &payload[8..];

        if kind != ICMP_TYPE_ECHO {
            return;
        }

        let mut reply = Vec::with_capacity(payload.len());
        reply.push(ICMP_TYPE_ECHO_REPLY);
        reply.push(code);
        reply.extend_from_slice(&0u16.to_be_bytes());
        reply.extend_from_slice(values);
        reply.extend_from_slice(data);
        let csum = checksum::checksum(&reply, 0);
        reply[2..4].copy_from_slice(&csum.to_be_bytes());

        if let Err(e) = self.ip_output(ipstack_types::IpProtocol::Icmp.as_u8(), &reply, dst, src) {
            klog_debug!("ipstack-proto: icmp echo-reply failed: {e}");
        }
    }
}
