//! ARP cache and request/reply protocol (RFC 826), per spec.md 4.6.
//!
//! The byte-layout helpers (`build_request`/`build_reply`) are grounded in
//! the teaching stack's `drivers::net::arp::send_request`/`send_reply`
//! (same field order, same `ETH_ADDR_LEN`-sized slice writes); the cache
//! itself follows spec.md's richer four-state model (`FREE`/`INCOMPLETE`/
//! `RESOLVED`/`STATIC`) rather than the teaching stack's `NeighborCache`
//! (which models only `Empty`/`Incomplete`/`Resolved`/`Stale` and defers
//! pending-packet flushing) — spec.md's state machine has no "stale"
//! concept and no queued-packet flush, so `resolve` simply reports
//! `INCOMPLETE` back to the caller instead.

use ipstack_sync::{klog_debug, uptime_secs, Mutex};
use ipstack_types::{
    DevIndex, Ipv4Addr, MacAddr, NetError, ARP_HEADER_LEN, ARP_HLEN_ETHERNET, ARP_HTYPE_ETHERNET,
    ARP_OPER_REPLY, ARP_OPER_REQUEST, ARP_PLEN_IPV4, ARP_PTYPE_IPV4, ETHERTYPE_ARP,
};

use crate::stack::Stack;

/// Fixed capacity of the ARP cache (spec.md 4.6).
pub const CACHE_SIZE: usize = 32;

/// Aging timeout in seconds: non-`STATIC` entries older than this are
/// deleted on each tick.
pub const TIMEOUT_SECS: u64 = 30;

/// Result of a cache lookup initiated by [`ArpCache::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// `ha` was filled in with a known, resolved hardware address.
    Found(MacAddr),
    /// No resolved entry exists yet; a request was (re)transmitted. The
    /// caller should treat this as a soft failure and retry later.
    Incomplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Free,
    Incomplete,
    Resolved,
    Static,
}

#[derive(Clone, Copy)]
struct Entry {
    state: State,
    pa: Ipv4Addr,
    ha: MacAddr,
    dev: DevIndex,
    timestamp_secs: u64,
}

impl Entry {
    const fn free() -> Self {
        Self {
            state: State::Free,
            pa: Ipv4Addr::UNSPECIFIED,
            ha: MacAddr::ZERO,
            dev: DevIndex(0),
            timestamp_secs: 0,
        }
    }
}

/// Fixed 32-entry neighbor cache, mutated entirely under one mutex.
///
/// Per spec.md's Open Question resolution (§9): `STATIC` entries are exempt
/// from aging but **not** from allocation eviction — `cache_alloc` may still
/// reclaim the oldest `STATIC` entry if every slot is occupied and nothing
/// else is available, since the alternative (an unevictable entry wedging
/// the table forever) is worse than an administrator having to re-`insert`
/// it.
pub struct ArpCache {
    entries: Mutex<[Entry; CACHE_SIZE]>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new([Entry::free(); CACHE_SIZE]),
        }
    }

    /// Return the first `FREE` slot; if none, evict the oldest-timestamp
    /// non-`FREE` entry (including `STATIC`, per the Open Question
    /// resolution above) and return it reset to `FREE`.
    fn alloc(entries: &mut [Entry; CACHE_SIZE]) -> usize {
        if let Some(i) = entries.iter().position(|e| e.state == State::Free) {
            return i;
        }
        let oldest = entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.timestamp_secs)
            .map(|(i, _)| i)
            .expect("CACHE_SIZE > 0");
        entries[oldest] = Entry::free();
        oldest
    }

    fn select(entries: &[Entry; CACHE_SIZE], pa: Ipv4Addr) -> Option<usize> {
        entries
            .iter()
            .position(|e| e.state != State::Free && e.pa == pa)
    }

    /// Overwrite an existing entry's hardware address, mark it `RESOLVED`,
    /// and refresh its timestamp. Returns `false` if no entry for `pa`
    /// exists yet.
    pub fn update(&self, pa: Ipv4Addr, ha: MacAddr) -> bool {
        let mut entries = self.entries.lock();
        match Self::select(&entries, pa) {
            Some(i) => {
                entries[i].ha = ha;
                entries[i].state = State::Resolved;
                entries[i].timestamp_secs = uptime_secs();
                true
            }
            None => false,
        }
    }

    /// Allocate a slot and populate it as `RESOLVED`.
    pub fn insert(&self, pa: Ipv4Addr, ha: MacAddr, dev: DevIndex) {
        let mut entries = self.entries.lock();
        let i = Self::alloc(&mut entries);
        entries[i] = Entry {
            state: State::Resolved,
            pa,
            ha,
            dev,
            timestamp_secs: uptime_secs(),
        };
    }

    /// Install a permanent, aging-exempt entry (administrative static ARP).
    pub fn insert_static(&self, pa: Ipv4Addr, ha: MacAddr, dev: DevIndex) {
        let mut entries = self.entries.lock();
        let i = Self::alloc(&mut entries);
        entries[i] = Entry {
            state: State::Static,
            pa,
            ha,
            dev,
            timestamp_secs: uptime_secs(),
        };
    }

    /// Resolve `pa` to a hardware address.
    ///
    /// - miss: allocate an `INCOMPLETE` entry, release the lock, and return
    ///   `Incomplete` along with the bytes of an Ethernet-broadcast ARP
    ///   request the caller should transmit.
    /// - hit, `INCOMPLETE`: return `Incomplete` and request the caller
    ///   resend the request (the timestamp is not refreshed).
    /// - hit, `RESOLVED`/`STATIC`: return `Found(ha)`.
    pub fn resolve(
        &self,
        dev: DevIndex,
        our_mac: MacAddr,
        our_ip: Ipv4Addr,
        pa: Ipv4Addr,
    ) -> (Resolution, Option<Vec<u8>>) {
        let mut entries = self.entries.lock();
        match Self::select(&entries, pa) {
            None => {
                let i = Self::alloc(&mut entries);
                entries[i] = Entry {
                    state: State::Incomplete,
                    pa,
                    ha: MacAddr::ZERO,
                    dev,
                    timestamp_secs: uptime_secs(),
                };
                drop(entries);
                (Resolution::Incomplete, Some(build_request(our_mac, our_ip, pa)))
            }
            Some(i) if entries[i].state == State::Incomplete => {
                drop(entries);
                (Resolution::Incomplete, Some(build_request(our_mac, our_ip, pa)))
            }
            Some(i) => (Resolution::Found(entries[i].ha), None),
        }
    }

    /// Age out every non-`FREE`, non-`STATIC` entry whose timestamp is more
    /// than [`TIMEOUT_SECS`] old. Intended to be wired to the one-second
    /// timer tick.
    pub fn age(&self) {
        let now = uptime_secs();
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if entry.state != State::Free
                && entry.state != State::Static
                && now.saturating_sub(entry.timestamp_secs) > TIMEOUT_SECS
            {
                klog_debug!("ipstack-proto: arp entry for {} aged out", entry.pa);
                *entry = Entry::free();
            }
        }
    }

    /// Process an incoming ARP frame (already known to carry ethertype ARP).
    ///
    /// Returns `Some(bytes)` containing an ARP reply the caller should
    /// transmit back out `dev` when the packet was a request for our
    /// address.
    pub fn handle_input(
        &self,
        dev: DevIndex,
        our_mac: MacAddr,
        our_ip: Ipv4Addr,
        frame: &[u8],
    ) -> Result<Option<(MacAddr, Vec<u8>)>, NetError> {
        let msg = match ArpMessage::parse(frame) {
            Some(m) => m,
            None => return Ok(None),
        };

        let updated = self.update(msg.sender_pa, msg.sender_ha);

        if msg.target_pa != our_ip || our_ip.is_unspecified() {
            return Ok(None);
        }

        if !updated {
            self.insert(msg.sender_pa, msg.sender_ha, dev);
        }

        if msg.oper == ARP_OPER_REQUEST {
            let reply = build_reply(our_mac, our_ip, msg.sender_ha, msg.sender_pa);
            return Ok(Some((msg.sender_ha, reply)));
        }

        Ok(None)
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Stack {
    /// Link input path for ethertype ARP queue entries: feed the cache and
    /// transmit any reply it produces.
    pub fn arp_input(&self, dev: DevIndex, bytes: &[u8]) {
        let Some(iface) = self.devices.get_iface(dev) else {
            klog_debug!("ipstack-proto: arp_input drop — no iface on dev {dev}");
            return;
        };
        let Some(our_mac) = self.devices.mac_of(dev) else {
            return;
        };
        match self.arp.handle_input(dev, our_mac, iface.unicast, bytes) {
            Ok(Some((dst_mac, reply))) => {
                if let Err(e) = self.devices.output(dev, ETHERTYPE_ARP, &reply, dst_mac) {
                    klog_debug!("ipstack-proto: arp reply failed: {e}");
                }
            }
            Ok(None) => {}
            Err(e) => klog_debug!("ipstack-proto: arp_input error: {e}"),
        }
    }
}

/// A parsed ARP message — only Ethernet/IPv4 combinations are accepted.
struct ArpMessage {
    oper: u16,
    sender_ha: MacAddr,
    sender_pa: Ipv4Addr,
    target_pa: Ipv4Addr,
}

impl ArpMessage {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_HEADER_LEN {
            return None;
        }
        let htype = u16::from_be_bytes([data[0], data[1]]);
        let ptype = u16::from_be_bytes([data[2], data[3]]);
        let hlen = data[4];
        let plen = data[5];
        let oper = u16::from_be_bytes([data[6], data[7]]);
        if htype != ARP_HTYPE_ETHERNET
            || ptype != ARP_PTYPE_IPV4
            || hlen != ARP_HLEN_ETHERNET
            || plen != ARP_PLEN_IPV4
        {
            return None;
        }
        let sender_ha = MacAddr([data[8], data[9], data[10], data[11], data[12], data[13]]);
        let sender_pa = Ipv4Addr([data[14], data[15], data[16], data[17]]);
        let target_pa = Ipv4Addr([data[24], data[25], data[26], data[27]]);
        Some(Self {
            oper,
            sender_ha,
            sender_pa,
            target_pa,
        })
    }
}

fn build_message(oper: u16, our_mac: MacAddr, our_ip: Ipv4Addr, target_ha: MacAddr, target_pa: Ipv4Addr) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ARP_HEADER_LEN);
    buf.extend_from_slice(&ARP_HTYPE_ETHERNET.to_be_bytes());
    buf.extend_from_slice(&ARP_PTYPE_IPV4.to_be_bytes());
    buf.push(ARP_HLEN_ETHERNET);
    buf.push(ARP_PLEN_IPV4);
    buf.extend_from_slice(&oper.to_be_bytes());
    buf.extend_from_slice(our_mac.as_bytes());
    buf.extend_from_slice(our_ip.as_bytes());
    buf.extend_from_slice(target_ha.as_bytes());
    buf.extend_from_slice(target_pa.as_bytes());
    buf
}

/// Build an ARP REQUEST body (the caller wraps it in an Ethernet-broadcast
/// frame): target hardware address is zero, unknown.
pub fn build_request(our_mac: MacAddr, our_ip: Ipv4Addr, target_pa: Ipv4Addr) -> Vec<u8> {
    build_message(ARP_OPER_REQUEST, our_mac, our_ip, MacAddr::ZERO, target_pa)
}

/// Build an ARP REPLY body addressed to `target_ha`/`target_pa`.
pub fn build_reply(our_mac: MacAddr, our_ip: Ipv4Addr, target_ha: MacAddr, target_pa: Ipv4Addr) -> Vec<u8> {
    build_message(ARP_OPER_REPLY, our_mac, our_ip, target_ha, target_pa)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(n: u8) -> MacAddr {
        MacAddr([n; 6])
    }
    fn ip(n: u8) -> Ipv4Addr {
        Ipv4Addr([10, 0, 0, n])
    }

    #[test]
    fn resolve_miss_returns_incomplete_and_request() {
        let cache = ArpCache::new();
        let (res, bytes) = cache.resolve(DevIndex(0), mac(1), ip(1), ip(2));
        assert_eq!(res, Resolution::Incomplete);
        assert!(bytes.is_some());
    }

    #[test]
    fn resolve_hit_after_insert_is_found() {
        let cache = ArpCache::new();
        cache.insert(ip(2), mac(2), DevIndex(0));
        let (res, bytes) = cache.resolve(DevIndex(0), mac(1), ip(1), ip(2));
        assert_eq!(res, Resolution::Found(mac(2)));
        assert!(bytes.is_none());
    }

    #[test]
    fn static_entries_survive_aging() {
        let cache = ArpCache::new();
        cache.insert_static(ip(3), mac(3), DevIndex(0));
        cache.age();
        let (res, _) = cache.resolve(DevIndex(0), mac(1), ip(1), ip(3));
        assert_eq!(res, Resolution::Found(mac(3)));
    }

    #[test]
    fn request_for_our_address_yields_reply() {
        let cache = ArpCache::new();
        let req = build_request(mac(9), ip(9), ip(1));
        let reply = cache
            .handle_input(DevIndex(0), mac(1), ip(1), &req)
            .unwrap();
        assert!(reply.is_some());
    }
}
