//! Shared scaffolding for the scenario tests under `tests/`: raw datagram
//! builders that play the part of a peer host, and a short poll loop for
//! waiting on the asynchronous softirq/timer threads a running [`Stack`]
//! always has in flight.
//!
//! Mirrors the teaching stack's top-level `tests` crate in spirit (black-box
//! assertions against the driver layer, spec.md 4.14) but there is nothing
//! to adapt from it structurally — it has no network stack to drive.

use std::time::{Duration, Instant};

use ipstack_proto::checksum;
use ipstack_types::{IpProtocol, Ipv4Addr, IPV4_HEADER_LEN_MIN, TCP_HEADER_LEN_MIN};

/// TCP control bits, mirrored from `ipstack_proto::tcp`'s private `FLAG_*`
/// constants — needed here to build segments for the handshake test.
pub const TCP_FLAG_FIN: u8 = 0x01;
pub const TCP_FLAG_SYN: u8 = 0x02;
pub const TCP_FLAG_RST: u8 = 0x04;
pub const TCP_FLAG_PSH: u8 = 0x08;
pub const TCP_FLAG_ACK: u8 = 0x10;

/// Build a well-formed IPv4 datagram (header + payload), checksum filled in.
/// No options, no fragmentation — exactly what [`ipstack_proto`]'s own
/// `ip_output` would produce for a local peer.
pub fn build_ipv4(protocol: IpProtocol, src: Ipv4Addr, dst: Ipv4Addr, payload: &[u8]) -> Vec<u8> {
    let total_len = (IPV4_HEADER_LEN_MIN + payload.len()) as u16;
    let mut header = [0u8; IPV4_HEADER_LEN_MIN];
    header[0] = (4 << 4) | 5;
    header[2..4].copy_from_slice(&total_len.to_be_bytes());
    header[4..6].copy_from_slice(&0xabcdu16.to_be_bytes());
    header[8] = 64;
    header[9] = protocol.as_u8();
    header[12..16].copy_from_slice(src.as_bytes());
    header[16..20].copy_from_slice(dst.as_bytes());
    let csum = checksum::checksum(&header, 0);
    header[10..12].copy_from_slice(&csum.to_be_bytes());

    let mut datagram = Vec::with_capacity(total_len as usize);
    datagram.extend_from_slice(&header);
    datagram.extend_from_slice(payload);
    datagram
}

/// Build an ICMP ECHO (type 8) message with the given identifier/sequence
/// and payload, checksum filled in.
pub fn build_icmp_echo(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + payload.len());
    msg.push(8); // type: echo
    msg.push(0); // code
    msg.extend_from_slice(&0u16.to_be_bytes()); // checksum placeholder
    msg.extend_from_slice(&identifier.to_be_bytes());
    msg.extend_from_slice(&sequence.to_be_bytes());
    msg.extend_from_slice(payload);
    let csum = checksum::checksum(&msg, 0);
    msg[2..4].copy_from_slice(&csum.to_be_bytes());
    msg
}

/// Build a UDP datagram (header + payload) addressed `src:src_port ->
/// dst:dst_port`, pseudo-header checksum filled in.
pub fn build_udp(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let total_len = (8 + payload.len()) as u16;
    let mut datagram = Vec::with_capacity(total_len as usize);
    datagram.extend_from_slice(&src_port.to_be_bytes());
    datagram.extend_from_slice(&dst_port.to_be_bytes());
    datagram.extend_from_slice(&total_len.to_be_bytes());
    datagram.extend_from_slice(&0u16.to_be_bytes());
    datagram.extend_from_slice(payload);

    let seed = checksum::pseudo_header_seed(src, dst, IpProtocol::Udp.as_u8(), total_len);
    let csum = checksum::checksum(&datagram, seed);
    let csum = if csum == 0 { 0xffff } else { csum };
    datagram[6..8].copy_from_slice(&csum.to_be_bytes());
    datagram
}

/// Build a bare TCP segment (no options), pseudo-header checksum filled in.
#[allow(clippy::too_many_arguments)]
pub fn build_tcp(
    src: Ipv4Addr,
    src_port: u16,
    dst: Ipv4Addr,
    dst_port: u16,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: &[u8],
) -> Vec<u8> {
    let total = TCP_HEADER_LEN_MIN + payload.len();
    let mut seg = Vec::with_capacity(total);
    seg.extend_from_slice(&src_port.to_be_bytes());
    seg.extend_from_slice(&dst_port.to_be_bytes());
    seg.extend_from_slice(&seq.to_be_bytes());
    seg.extend_from_slice(&ack.to_be_bytes());
    seg.push(5 << 4);
    seg.push(flags);
    seg.extend_from_slice(&window.to_be_bytes());
    seg.extend_from_slice(&0u16.to_be_bytes());
    seg.extend_from_slice(&0u16.to_be_bytes());
    seg.extend_from_slice(payload);

    let seed = checksum::pseudo_header_seed(src, dst, IpProtocol::Tcp.as_u8(), total as u16);
    let csum = checksum::checksum(&seg, seed);
    seg[16..18].copy_from_slice(&csum.to_be_bytes());
    seg
}

/// TCP header field accessors for frames captured off a [`DummyDevice`]
/// (`ipstack_drivers::DummyDevice`) — enough to drive a handshake without
/// re-implementing [`ipstack_proto::tcp`]'s full parser.
pub struct TcpView<'a>(pub &'a [u8]);

impl<'a> TcpView<'a> {
    pub fn seq(&self) -> u32 {
        u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }
    pub fn ack(&self) -> u32 {
        u32::from_be_bytes([self.0[8], self.0[9], self.0[10], self.0[11]])
    }
    pub fn flags(&self) -> u8 {
        self.0[13]
    }
    pub fn payload(&self) -> &'a [u8] {
        let data_offset = (self.0[12] >> 4) as usize * 4;
        &self.0[data_offset..]
    }
}

/// The IP payload of a captured frame — skips the fixed 20-byte header this
/// stack always emits (no options).
pub fn ip_payload(datagram: &[u8]) -> &[u8] {
    &datagram[IPV4_HEADER_LEN_MIN..]
}

/// Poll `cond` every 10ms until it returns `Some`, or panic after `timeout`.
/// Needed because frames delivered through [`ipstack_drivers`]'s device
/// worker threads and the stack's own softirq thread are processed
/// asynchronously, never on the calling thread.
pub fn wait_until<T>(timeout: Duration, mut cond: impl FnMut() -> Option<T>) -> T {
    let start = Instant::now();
    loop {
        if let Some(v) = cond() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition did not become true within {timeout:?}");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
