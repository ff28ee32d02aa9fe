//! UDP PCB table and socket API — spec.md 4.9.
//!
//! Grounded in the teaching stack's `drivers::net::udp::UdpDemuxTable`
//! (fixed-capacity array, wildcard-address fallback lookup) for the PCB
//! selection rule, generalized to a full PCB (not just a demux entry) that
//! also owns a receive queue and blocks via [`SchedCtx`]. The condvar for
//! PCB `i` is kept in a sibling `Vec` outside the `Mutex<Vec<PcbData>>`
//! rather than inside each PCB: `SchedCtx::sleep` needs a `MutexGuard` of
//! the exact mutex it's paired with, and a `SchedCtx` living *inside* that
//! guarded data can't be borrowed independently of the guard passed by
//! value into `sleep`. Splitting the two is the ordinary `Condvar`-paired-
//! with-a-`Mutex<T>` idiom applied to a table of sockets instead of one.

use std::collections::VecDeque;

use ipstack_sync::{Mutex, SchedCtx};
use ipstack_types::{Endpoint, Ipv4Addr, NetError, Port};

use crate::checksum;
use crate::stack::Stack;

/// Fixed PCB table size (spec.md 4.9).
pub const UDP_PCB_COUNT: usize = 16;

#[derive(Clone, Copy, PartialEq, Eq)]
enum PcbState {
    Free,
    Open,
    Closing,
}

struct PcbData {
    state: PcbState,
    local: Endpoint,
    queue: VecDeque<(Endpoint, Vec<u8>)>,
}

impl PcbData {
    const fn free() -> Self {
        Self {
            state: PcbState::Free,
            local: Endpoint::UNSPECIFIED,
            queue: VecDeque::new(),
        }
    }
}

pub struct UdpTable {
    pcbs: Mutex<Vec<PcbData>>,
    ctxs: Vec<SchedCtx>,
}

impl UdpTable {
    pub fn new() -> Self {
        let mut pcbs = Vec::with_capacity(UDP_PCB_COUNT);
        pcbs.resize_with(UDP_PCB_COUNT, PcbData::free);
        let mut ctxs = Vec::with_capacity(UDP_PCB_COUNT);
        ctxs.resize_with(UDP_PCB_COUNT, SchedCtx::new);
        Self {
            pcbs: Mutex::new(pcbs),
            ctxs,
        }
    }

    /// Allocate a `FREE` PCB and mark it `OPEN`. Returns its array index —
    /// the descriptor the application holds.
    pub fn open(&self) -> Result<usize, NetError> {
        let mut pcbs = self.pcbs.lock();
        for (i, pcb) in pcbs.iter_mut().enumerate() {
            if pcb.state == PcbState::Free {
                pcb.state = PcbState::Open;
                pcb.local = Endpoint::UNSPECIFIED;
                return Ok(i);
            }
        }
        Err(NetError::NoBufferSpace)
    }

    /// Release a PCB. If a thread is blocked in `recvfrom`, mark it
    /// `CLOSING` and wake it — the sleeper notices `CLOSING` on wakeup and
    /// finishes the release itself; otherwise free it immediately here.
    pub fn close(&self, id: usize) {
        let mut pcbs = self.pcbs.lock();
        let Some(pcb) = pcbs.get_mut(id) else { return };
        if pcb.state != PcbState::Open {
            return;
        }
        if self.ctxs[id].waiter_count() > 0 {
            pcb.state = PcbState::Closing;
            drop(pcbs);
            self.ctxs[id].wakeup();
        } else {
            *pcb = PcbData::free();
        }
    }

    /// Bind a PCB's local endpoint. Rejects a duplicate `(addr, port)`
    /// already bound by another PCB.
    pub fn bind(&self, id: usize, local: Endpoint) -> Result<(), NetError> {
        let mut pcbs = self.pcbs.lock();
        if id >= pcbs.len() || pcbs[id].state != PcbState::Open {
            return Err(NetError::SocketNotBound);
        }
        if pcbs
            .iter()
            .enumerate()
            .any(|(i, p)| i != id && p.state == PcbState::Open && p.local == local)
        {
            return Err(NetError::AddressInUse);
        }
        pcbs[id].local = local;
        Ok(())
    }

    fn local_of(&self, id: usize) -> Option<Endpoint> {
        self.pcbs.lock().get(id).map(|p| p.local)
    }

    /// Assign an ephemeral port to a PCB with `local.port == 0`, scanning
    /// the IANA ephemeral range for one not already bound.
    fn assign_ephemeral_port(&self, id: usize, addr: Ipv4Addr) -> Result<Port, NetError> {
        let mut pcbs = self.pcbs.lock();
        for candidate in Port::EPHEMERAL_START..=u16::MAX {
            let port = Port::new(candidate);
            let in_use = pcbs
                .iter()
                .enumerate()
                .any(|(i, p)| i != id && p.state == PcbState::Open && p.local.port == port);
            if !in_use {
                pcbs[id].local = Endpoint::new(addr, port);
                return Ok(port);
            }
        }
        Err(NetError::NoBufferSpace)
    }

    /// Select the PCB matching `(local.addr in {ANY, dst}, local.port ==
    /// dst.port)` for an incoming datagram, enqueue it, and wake any
    /// sleeper.
    fn deliver(&self, dst: Endpoint, foreign: Endpoint, payload: &[u8]) -> bool {
        let mut pcbs = self.pcbs.lock();
        let target = pcbs.iter().position(|p| {
            p.state == PcbState::Open
                && p.local.port == dst.port
                && (p.local.addr.is_unspecified() || p.local.addr == dst.addr)
        });
        match target {
            Some(i) => {
                pcbs[i].queue.push_back((foreign, payload.to_vec()));
                drop(pcbs);
                self.ctxs[i].wakeup();
                true
            }
            None => false,
        }
    }

    /// Block until a datagram arrives, the PCB is closed, or the context is
    /// interrupted.
    pub fn recvfrom(&self, id: usize, buf: &mut [u8]) -> Result<(usize, Endpoint), NetError> {
        let mut pcbs = self.pcbs.lock();
        loop {
            let Some(pcb) = pcbs.get_mut(id) else {
                return Err(NetError::SocketNotBound);
            };
            if let Some((foreign, bytes)) = pcb.queue.pop_front() {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                return Ok((n, foreign));
            }
            if pcb.state == PcbState::Closing {
                *pcb = PcbData::free();
                return Err(NetError::NotConnected);
            }
            if pcb.state != PcbState::Open {
                return Err(NetError::SocketNotBound);
            }
            let (guard, res) = self.ctxs[id].sleep(pcbs, None);
            pcbs = guard;
            res?;
        }
    }

    /// Publish the global interrupt event to every open PCB, unblocking
    /// every sleeper with `EINTR`.
    pub fn interrupt_all(&self) {
        let pcbs = self.pcbs.lock();
        for (i, pcb) in pcbs.iter().enumerate() {
            if pcb.state != PcbState::Free {
                self.ctxs[i].interrupt();
            }
        }
    }
}

impl Default for UdpTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    /// Link/IP dispatch target for `IpProtocol::Udp`.
    pub fn udp_input(&self, payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) {
        if payload.len() < 8 {
            ipstack_sync::klog_debug!("ipstack-proto: udp drop — too short");
            return;
        }
        let udp_len = u16::from_be_bytes([payload[4], payload[5]]) as usize;
        if udp_len != payload.len() {
            ipstack_sync::klog_debug!("ipstack-proto: udp drop — length mismatch");
            return;
        }
        let seed = checksum::pseudo_header_seed(src, dst, ipstack_types::IpProtocol::Udp.as_u8(), udp_len as u16);
        if checksum::checksum(payload, seed) != 0 {
            ipstack_sync::klog_debug!("ipstack-proto: udp drop — bad checksum");
            return;
        }

        let src_port = Port::new(u16::from_be_bytes([payload[0], payload[1]]));
        let dst_port = Port::new(u16::from_be_bytes([payload[2], payload[3]]));
        let body = &payload[8..];

        let delivered = self
            .udp
            .deliver(Endpoint::new(dst, dst_port), Endpoint::new(src, src_port), body);
        if !delivered {
            ipstack_sync::klog_debug!("ipstack-proto: udp drop — no PCB for {dst}:{dst_port}");
        }
    }

    /// `sendto(id, bytes, foreign)`.
    pub fn udp_sendto(&self, id: usize, bytes: &[u8], foreign: Endpoint) -> Result<usize, NetError> {
        let mut local = self.udp.local_of(id).ok_or(NetError::SocketNotBound)?;

        if local.addr.is_unspecified() {
            let route = self.routes.lookup(foreign.addr).ok_or(NetError::NoRoute)?;
            let iface = self.devices.get_iface(route.dev).ok_or(NetError::NoRoute)?;
            local.addr = iface.unicast;
        }
        if local.port.is_unspecified() {
            local.port = self.udp.assign_ephemeral_port(id, local.addr)?;
        } else {
            self.udp.pcbs.lock()[id].local.addr = local.addr;
        }

        let total_len = (8 + bytes.len()) as u16;
        let mut datagram = Vec::with_capacity(total_len as usize);
        datagram.extend_from_slice(&local.port.to_network_bytes());
        datagram.extend_from_slice(&foreign.port.to_network_bytes());
        datagram.extend_from_slice(&total_len.to_be_bytes());
        datagram.extend_from_slice(&0u16.to_be_bytes());
        datagram.extend_from_slice(bytes);

        let seed = checksum::pseudo_header_seed(
            local.addr,
            foreign.addr,
            ipstack_types::IpProtocol::Udp.as_u8(),
            total_len,
        );
        let csum = checksum::checksum(&datagram, seed);
        let csum = if csum == 0 { 0xffff } else { csum };
        datagram[6..8].copy_from_slice(&csum.to_be_bytes());

        self.ip_output(ipstack_types::IpProtocol::Udp.as_u8(), &datagram, local.addr, foreign.addr)?;
        Ok(bytes.len())
    }

    /// `udp_open()`: allocate a `FREE` PCB, return its descriptor.
    pub fn udp_open(&self) -> Result<usize, NetError> {
        self.udp.open()
    }

    /// `udp_close(id)`.
    pub fn udp_close(&self, id: usize) {
        self.udp.close(id);
    }

    /// `udp_bind(id, local)`.
    pub fn udp_bind(&self, id: usize, local: Endpoint) -> Result<(), NetError> {
        self.udp.bind(id, local)
    }

    /// `udp_recvfrom(id, buf)`: block until a datagram arrives, the PCB is
    /// closed, or the context is interrupted.
    pub fn udp_recvfrom(&self, id: usize, buf: &mut [u8]) -> Result<(usize, Endpoint), NetError> {
        self.udp.recvfrom(id, buf)
    }
}
