//! TCP PCB table and the RFC 793 state-machine subset — spec.md 4.10.
//!
//! The teaching stack has no TCP of its own, so the segment-arrives
//! processor, the acceptability test, and the send/receive window
//! bookkeeping are written directly from spec.md's algorithm. The PCB table
//! shape (fixed array, `Mutex<Vec<PcbData>>` paired with a sibling
//! `Vec<SchedCtx>`) and the release-vs-mark-and-wake pattern on `close` are
//! carried over from [`crate::udp::UdpTable`] — the same condition-context
//! idiom applies to a byte-stream PCB as to a datagram one.
//!
//! Only LISTEN, SYN-RECEIVED and ESTABLISHED are reachable: active open is
//! refused and there is no retransmission, so every other RFC 793 state is
//! unreachable dead weight this stack doesn't model.

use ipstack_sync::{klog_debug, Mutex, SchedCtx};
use ipstack_types::{Endpoint, IpProtocol, Ipv4Addr, NetError, Port, IPV4_HEADER_LEN_MIN, TCP_HEADER_LEN_MIN};

use crate::checksum;
use crate::stack::Stack;

/// Fixed PCB table size. Spec.md leaves the exact count unspecified beyond
/// "statically sized"; matched to [`crate::udp::UDP_PCB_COUNT`] since both
/// tables share the same "small embedded system" sizing rationale.
pub const TCP_PCB_COUNT: usize = 16;

/// Receive buffer capacity in bytes (spec.md 3, "TCP PCB").
pub const RECV_BUF_SIZE: usize = 65535;

const FLAG_FIN: u8 = 0x01;
const FLAG_SYN: u8 = 0x02;
const FLAG_RST: u8 = 0x04;
const FLAG_PSH: u8 = 0x08;
const FLAG_ACK: u8 = 0x10;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TcpState {
    Free,
    /// Marked for release while a waiter still references the context;
    /// also the state an incoming segment sees once `close()` has run —
    /// treated identically to "no PCB" by the segment-arrives processor.
    Closed,
    Listen,
    SynReceived,
    Established,
}

#[derive(Clone, Copy, Default)]
struct SendVars {
    nxt: u32,
    una: u32,
    wnd: u16,
    wl1: u32,
    wl2: u32,
}

#[derive(Clone, Copy, Default)]
struct RecvVars {
    nxt: u32,
    wnd: u16,
}

struct PcbData {
    state: TcpState,
    local: Endpoint,
    foreign: Endpoint,
    snd: SendVars,
    rcv: RecvVars,
    iss: u32,
    irs: u32,
    recv_buf: Vec<u8>,
}

impl PcbData {
    fn free() -> Self {
        Self {
            state: TcpState::Free,
            local: Endpoint::UNSPECIFIED,
            foreign: Endpoint::UNSPECIFIED,
            snd: SendVars::default(),
            rcv: RecvVars::default(),
            iss: 0,
            irs: 0,
            recv_buf: Vec::new(),
        }
    }

    fn listener(local: Endpoint, foreign: Endpoint) -> Self {
        Self {
            state: TcpState::Listen,
            local,
            foreign,
            snd: SendVars::default(),
            rcv: RecvVars {
                nxt: 0,
                wnd: RECV_BUF_SIZE as u16,
            },
            iss: 0,
            irs: 0,
            recv_buf: vec![0u8; RECV_BUF_SIZE],
        }
    }
}

/// `(seg.seq, seg.ack, seg.len, wnd, flags)` derived from a parsed segment.
struct Segment<'a> {
    src_port: Port,
    dst_port: Port,
    seq: u32,
    ack: u32,
    flags: u8,
    window: u16,
    payload: &'a [u8],
}

impl<'a> Segment<'a> {
    fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < TCP_HEADER_LEN_MIN {
            return None;
        }
        let data_offset = (data[12] >> 4) as usize * 4;
        if data_offset < TCP_HEADER_LEN_MIN || data_offset > data.len() {
            return None;
        }
        Some(Self {
            src_port: Port::new(u16::from_be_bytes([data[0], data[1]])),
            dst_port: Port::new(u16::from_be_bytes([data[2], data[3]])),
            seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ack: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            flags: data[13],
            window: u16::from_be_bytes([data[14], data[15]]),
            payload: &data[data_offset..],
        })
    }

    fn seg_len(&self) -> u32 {
        self.payload.len() as u32
            + u32::from(self.flags & FLAG_SYN != 0)
            + u32::from(self.flags & FLAG_FIN != 0)
    }
}

/// `true` iff `seq` lies in the half-open window `[start, start+wnd)`,
/// compared with wraparound-safe 32-bit sequence arithmetic.
fn seq_in_window(seq: u32, start: u32, wnd: u32) -> bool {
    seq.wrapping_sub(start) < wnd
}

/// The acceptability test, spec.md 4.10.
fn acceptable(seg_seq: u32, seg_len: u32, rcv_nxt: u32, rcv_wnd: u16) -> bool {
    let wnd = rcv_wnd as u32;
    match (seg_len, wnd) {
        (0, 0) => seg_seq == rcv_nxt,
        (0, w) => seq_in_window(seg_seq, rcv_nxt, w),
        (_, 0) => false,
        (len, w) => seq_in_window(seg_seq, rcv_nxt, w) || seq_in_window(seg_seq.wrapping_add(len - 1), rcv_nxt, w),
    }
}

pub struct TcpTable {
    pcbs: Mutex<Vec<PcbData>>,
    ctxs: Vec<SchedCtx>,
}

impl TcpTable {
    pub fn new() -> Self {
        let mut pcbs = Vec::with_capacity(TCP_PCB_COUNT);
        pcbs.resize_with(TCP_PCB_COUNT, PcbData::free);
        let mut ctxs = Vec::with_capacity(TCP_PCB_COUNT);
        ctxs.resize_with(TCP_PCB_COUNT, SchedCtx::new);
        Self {
            pcbs: Mutex::new(pcbs),
            ctxs,
        }
    }

    fn alloc_listener(&self, local: Endpoint, foreign: Endpoint) -> Result<usize, NetError> {
        let mut pcbs = self.pcbs.lock();
        if pcbs
            .iter()
            .any(|p| p.state != TcpState::Free && p.local == local && p.foreign == foreign)
        {
            return Err(NetError::AddressInUse);
        }
        for (i, pcb) in pcbs.iter_mut().enumerate() {
            if pcb.state == TcpState::Free {
                *pcb = PcbData::listener(local, foreign);
                return Ok(i);
            }
        }
        Err(NetError::NoBufferSpace)
    }

    /// Most-specific PCB match: an exact `(local, foreign)` match wins;
    /// otherwise a `LISTEN` PCB whose `local` matches (wildcard foreign)
    /// matches any foreign. `CLOSED`/`FREE` PCBs never match — an incoming
    /// segment for one falls through to the "no PCB" reset path.
    fn select(&self, pcbs: &[PcbData], local: Endpoint, foreign: Endpoint) -> Option<usize> {
        let active = |s: TcpState| matches!(s, TcpState::Listen | TcpState::SynReceived | TcpState::Established);
        pcbs.iter()
            .position(|p| active(p.state) && p.local == local && p.foreign == foreign)
            .or_else(|| {
                pcbs.iter()
                    .position(|p| p.state == TcpState::Listen && p.local == local)
            })
    }

    /// Publish the global interrupt event to every non-`FREE` PCB.
    pub fn interrupt_all(&self) {
        let pcbs = self.pcbs.lock();
        for (i, pcb) in pcbs.iter().enumerate() {
            if pcb.state != TcpState::Free {
                self.ctxs[i].interrupt();
            }
        }
    }
}

impl Default for TcpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    /// Build and transmit a bare TCP segment (spec.md 4.10, "Segment
    /// construction"): no options, pseudo-header-chained checksum.
    fn tcp_emit(
        &self,
        local: Endpoint,
        foreign: Endpoint,
        seq: u32,
        ack: u32,
        flags: u8,
        window: u16,
        payload: &[u8],
    ) -> Result<(), NetError> {
        let total = TCP_HEADER_LEN_MIN + payload.len();
        let mut seg = Vec::with_capacity(total);
        seg.extend_from_slice(&local.port.to_network_bytes());
        seg.extend_from_slice(&foreign.port.to_network_bytes());
        seg.extend_from_slice(&seq.to_be_bytes());
        seg.extend_from_slice(&ack.to_be_bytes());
        seg.push(5 << 4);
        seg.push(flags);
        seg.extend_from_slice(&window.to_be_bytes());
        seg.extend_from_slice(&0u16.to_be_bytes());
        seg.extend_from_slice(&0u16.to_be_bytes());
        seg.extend_from_slice(payload);

        let seed = checksum::pseudo_header_seed(local.addr, foreign.addr, IpProtocol::Tcp.as_u8(), total as u16);
        let csum = checksum::checksum(&seg, seed);
        seg[16..18].copy_from_slice(&csum.to_be_bytes());

        self.ip_output(IpProtocol::Tcp.as_u8(), &seg, local.addr, foreign.addr)
    }

    fn tcp_mss(&self, dst: Ipv4Addr) -> Result<usize, NetError> {
        let route = self.routes.lookup(dst).ok_or(NetError::NoRoute)?;
        let mtu = self.devices.mtu_of(route.dev).ok_or(NetError::NoRoute)? as usize;
        Ok(mtu.saturating_sub(IPV4_HEADER_LEN_MIN + TCP_HEADER_LEN_MIN))
    }

    /// Link/IP dispatch target for `IpProtocol::Tcp`.
    pub fn tcp_input(&self, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) {
        let Some(seg) = Segment::parse(payload) else {
            klog_debug!("ipstack-proto: tcp drop — malformed segment");
            return;
        };
        let seed = checksum::pseudo_header_seed(src, dst, IpProtocol::Tcp.as_u8(), payload.len() as u16);
        if checksum::checksum(payload, seed) != 0 {
            klog_debug!("ipstack-proto: tcp drop — bad checksum");
            return;
        }
        self.tcp_segment_arrives(&seg, src, dst);
    }

    /// The segment-arrives processor, spec.md 4.10.
    fn tcp_segment_arrives(&self, seg: &Segment<'_>, src: Ipv4Addr, dst: Ipv4Addr) {
        let foreign = Endpoint::new(src, seg.src_port);
        let local = Endpoint::new(dst, seg.dst_port);
        let seg_len = seg.seg_len();

        let mut pcbs = self.tcp.pcbs.lock();
        let Some(i) = self.tcp.select(&pcbs, local, foreign) else {
            drop(pcbs);
            if seg.flags & FLAG_RST != 0 {
                return;
            }
            let _ = if seg.flags & FLAG_ACK == 0 {
                self.tcp_emit(local, foreign, 0, seg.seq.wrapping_add(seg_len), FLAG_RST | FLAG_ACK, 0, &[])
            } else {
                self.tcp_emit(local, foreign, seg.ack, 0, FLAG_RST, 0, &[])
            };
            return;
        };

        if pcbs[i].state == TcpState::Listen {
            if seg.flags & FLAG_RST != 0 {
                return;
            }
            if seg.flags & FLAG_ACK != 0 {
                drop(pcbs);
                let _ = self.tcp_emit(local, foreign, seg.ack, 0, FLAG_RST, 0, &[]);
                return;
            }
            if seg.flags & FLAG_SYN != 0 {
                let pcb = &mut pcbs[i];
                pcb.foreign = foreign;
                pcb.irs = seg.seq;
                pcb.rcv.nxt = seg.seq.wrapping_add(1);
                pcb.iss = rand::random();
                pcb.snd.nxt = pcb.iss.wrapping_add(1);
                pcb.snd.una = pcb.iss;
                pcb.state = TcpState::SynReceived;
                let (iss, rcv_nxt, rcv_wnd) = (pcb.iss, pcb.rcv.nxt, pcb.rcv.wnd);
                drop(pcbs);
                self.tcp.ctxs[i].wakeup();
                let _ = self.tcp_emit(local, foreign, iss, rcv_nxt, FLAG_SYN | FLAG_ACK, rcv_wnd, &[]);
            }
            return;
        }

        // SYN-RECEIVED, ESTABLISHED and beyond (spec.md's "otherwise" branch).
        let rcv_nxt = pcbs[i].rcv.nxt;
        let rcv_wnd = pcbs[i].rcv.wnd;
        if !acceptable(seg.seq, seg_len, rcv_nxt, rcv_wnd) {
            if seg.flags & FLAG_RST == 0 {
                let (snd_nxt, rcv_nxt) = (pcbs[i].snd.nxt, pcbs[i].rcv.nxt);
                drop(pcbs);
                let _ = self.tcp_emit(local, foreign, snd_nxt, rcv_nxt, FLAG_ACK, rcv_wnd, &[]);
            }
            return;
        }
        if seg.flags & FLAG_ACK == 0 {
            return;
        }

        if pcbs[i].state == TcpState::SynReceived {
            let (una, nxt) = (pcbs[i].snd.una, pcbs[i].snd.nxt);
            if una <= seg.ack && seg.ack <= nxt {
                pcbs[i].state = TcpState::Established;
                self.tcp.ctxs[i].wakeup();
                // Fall through into the ESTABLISHED ack/window-update block
                // below: the establishing ACK is itself the first ESTABLISHED
                // ack and must advance snd.una / seed the window the same way
                // any later one would.
            } else {
                drop(pcbs);
                let _ = self.tcp_emit(local, foreign, seg.ack, 0, FLAG_RST, 0, &[]);
                return;
            }
        } else if pcbs[i].state != TcpState::Established {
            return;
        }

        {
            let (una, nxt) = (pcbs[i].snd.una, pcbs[i].snd.nxt);
            if seg.ack > nxt {
                let rcv_nxt = pcbs[i].rcv.nxt;
                drop(pcbs);
                let _ = self.tcp_emit(local, foreign, nxt, rcv_nxt, FLAG_ACK, rcv_wnd, &[]);
                return;
            }
            if una < seg.ack && seg.ack <= nxt {
                pcbs[i].snd.una = seg.ack;
                let (wl1, wl2) = (pcbs[i].snd.wl1, pcbs[i].snd.wl2);
                if wl1 < seg.seq || (wl1 == seg.seq && wl2 <= seg.ack) {
                    pcbs[i].snd.wnd = seg.window;
                    pcbs[i].snd.wl1 = seg.seq;
                    pcbs[i].snd.wl2 = seg.ack;
                }
            }
            // seg.ack < una: stale ack, ignored.
        }

        if pcbs[i].state == TcpState::Established && !seg.payload.is_empty() {
            let pcb = &mut pcbs[i];
            let occupied = RECV_BUF_SIZE - pcb.rcv.wnd as usize;
            let space = pcb.rcv.wnd as usize;
            let n = seg.payload.len().min(space);
            pcb.recv_buf[occupied..occupied + n].copy_from_slice(&seg.payload[..n]);
            pcb.rcv.nxt = pcb.rcv.nxt.wrapping_add(n as u32);
            pcb.rcv.wnd -= n as u16;
            let (snd_nxt, rcv_nxt, rcv_wnd) = (pcb.snd.nxt, pcb.rcv.nxt, pcb.rcv.wnd);
            drop(pcbs);
            let _ = self.tcp_emit(local, foreign, snd_nxt, rcv_nxt, FLAG_ACK, rcv_wnd, &[]);
            self.tcp.ctxs[i].wakeup();
        }
    }

    /// `open_rfc793(local, foreign?, active)` — spec.md 4.10. Active open is
    /// refused; passive open blocks until the PCB reaches ESTABLISHED.
    pub fn tcp_open_rfc793(
        &self,
        local: Endpoint,
        foreign: Option<Endpoint>,
        active: bool,
    ) -> Result<usize, NetError> {
        if active {
            return Err(NetError::OperationNotSupported);
        }
        let id = self.tcp.alloc_listener(local, foreign.unwrap_or(Endpoint::UNSPECIFIED))?;

        let mut pcbs = self.tcp.pcbs.lock();
        loop {
            match pcbs[id].state {
                TcpState::Established => return Ok(id),
                TcpState::Listen | TcpState::SynReceived => {
                    let (guard, res) = self.tcp.ctxs[id].sleep(pcbs, None);
                    pcbs = guard;
                    if let Err(e) = res {
                        pcbs[id] = PcbData::free();
                        return Err(e);
                    }
                }
                _ => {
                    pcbs[id] = PcbData::free();
                    return Err(NetError::ConnectionReset);
                }
            }
        }
    }

    /// `close(id)`: send a bare RST (if a peer was ever known) and release.
    pub fn tcp_close(&self, id: usize) {
        let mut pcbs = self.tcp.pcbs.lock();
        let Some(pcb) = pcbs.get_mut(id) else { return };
        if pcb.state == TcpState::Free {
            return;
        }
        let (local, foreign, seq, had_peer) = (
            pcb.local,
            pcb.foreign,
            pcb.snd.nxt,
            matches!(pcb.state, TcpState::SynReceived | TcpState::Established),
        );
        if self.tcp.ctxs[id].waiter_count() > 0 {
            pcb.state = TcpState::Closed;
        } else {
            *pcb = PcbData::free();
        }
        drop(pcbs);
        self.tcp.ctxs[id].wakeup();
        if had_peer {
            let _ = self.tcp_emit(local, foreign, seq, 0, FLAG_RST, 0, &[]);
        }
    }

    /// `send(id, data)`: ESTABLISHED only. Emits `<ACK,PSH>` segments of at
    /// most `min(mss, remaining, cap)` bytes, blocking when the send window
    /// is full.
    pub fn tcp_send(&self, id: usize, data: &[u8]) -> Result<usize, NetError> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut pcbs = self.tcp.pcbs.lock();
        if pcbs.get(id).map(|p| p.state) != Some(TcpState::Established) {
            return Err(NetError::OperationNotSupported);
        }
        let mss = self.tcp_mss(pcbs[id].foreign.addr)?.max(1);

        let mut sent = 0usize;
        loop {
            let pcb = &pcbs[id];
            if pcb.state != TcpState::Established {
                return if sent == 0 { Err(NetError::ConnectionReset) } else { Ok(sent) };
            }
            if sent == data.len() {
                return Ok(sent);
            }
            let cap = (pcb.snd.wnd as u32).saturating_sub(pcb.snd.nxt.wrapping_sub(pcb.snd.una));
            if cap == 0 {
                let (guard, res) = self.tcp.ctxs[id].sleep(pcbs, None);
                pcbs = guard;
                if let Err(e) = res {
                    return if sent == 0 { Err(e) } else { Ok(sent) };
                }
                continue;
            }

            let chunk = (data.len() - sent).min(mss).min(cap as usize);
            let (local, foreign, seq, ack, wnd) = {
                let p = &pcbs[id];
                (p.local, p.foreign, p.snd.nxt, p.rcv.nxt, p.rcv.wnd)
            };
            pcbs[id].snd.nxt = pcbs[id].snd.nxt.wrapping_add(chunk as u32);
            drop(pcbs);
            self.tcp_emit(local, foreign, seq, ack, FLAG_ACK | FLAG_PSH, wnd, &data[sent..sent + chunk])?;
            sent += chunk;
            pcbs = self.tcp.pcbs.lock();
        }
    }

    /// `receive(id, buf)`: ESTABLISHED only. Copies from the front of the
    /// receive buffer, shifts the remainder down, grows `rcv.wnd`.
    pub fn tcp_receive(&self, id: usize, buf: &mut [u8]) -> Result<usize, NetError> {
        let mut pcbs = self.tcp.pcbs.lock();
        loop {
            let Some(pcb) = pcbs.get_mut(id) else {
                return Err(NetError::SocketNotBound);
            };
            if pcb.state == TcpState::Closed {
                *pcb = PcbData::free();
                return Err(NetError::ConnectionReset);
            }
            if pcb.state != TcpState::Established {
                return Err(NetError::OperationNotSupported);
            }
            let occupied = RECV_BUF_SIZE - pcb.rcv.wnd as usize;
            if occupied > 0 {
                let n = occupied.min(buf.len());
                buf[..n].copy_from_slice(&pcb.recv_buf[..n]);
                pcb.recv_buf.copy_within(n..occupied, 0);
                pcb.rcv.wnd += n as u16;
                return Ok(n);
            }
            let (guard, res) = self.tcp.ctxs[id].sleep(pcbs, None);
            pcbs = guard;
            res?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptability_table_matches_spec() {
        assert!(acceptable(100, 0, 100, 0));
        assert!(!acceptable(101, 0, 100, 0));

        assert!(acceptable(100, 0, 100, 10));
        assert!(acceptable(109, 0, 100, 10));
        assert!(!acceptable(110, 0, 100, 10));

        assert!(!acceptable(100, 5, 100, 0));

        assert!(acceptable(95, 10, 100, 10));
        assert!(!acceptable(80, 5, 100, 10));
    }

    #[test]
    fn seq_window_wraps_correctly() {
        assert!(seq_in_window(u32::MAX, u32::MAX - 1, 4));
        assert!(!seq_in_window(3, u32::MAX - 1, 4));
    }
}
