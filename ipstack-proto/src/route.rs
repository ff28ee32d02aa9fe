//! IPv4 routing table with longest-prefix-match lookup, per spec.md 4.7.
//!
//! Grounded in the teaching stack's `drivers::net::route::RouteEntry`
//! (`Debug`/`Display` formatting, a `next_hop` helper) but storing a plain
//! netmask rather than a bucketed prefix length: spec.md's lookup algorithm
//! is a flat linear scan comparing netmask magnitude directly ("iterate all
//! routes; keep the candidate whose netmask, compared as a big-endian
//! magnitude, is longest"), not the teaching stack's 33-bucket array built
//! for O(32) lookup at a route count this system never approaches.

use std::fmt;

use ipstack_sync::Mutex;
use ipstack_types::{DevIndex, Ipv4Addr};

/// A single routing table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// [`Ipv4Addr::UNSPECIFIED`] means directly connected (next hop is the
    /// destination itself).
    pub nexthop: Ipv4Addr,
    pub dev: DevIndex,
}

impl Route {
    fn matches(&self, dst: Ipv4Addr) -> bool {
        (dst.to_u32_be() & self.netmask.to_u32_be()) == self.network.to_u32_be()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nexthop.is_unspecified() {
            write!(f, "{}/{} dev {} (connected)", self.network, self.netmask, self.dev)
        } else {
            write!(f, "{}/{} via {} dev {}", self.network, self.netmask, self.nexthop, self.dev)
        }
    }
}

/// Routing table: an unordered `Vec` of [`Route`]s searched in full on every
/// lookup.
pub struct RouteTable {
    routes: Mutex<Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, route: Route) {
        self.routes.lock().push(route);
    }

    /// Longest-prefix match: iterate every route, keep the candidate whose
    /// `(dst & netmask) == network` and whose netmask has the greatest
    /// magnitude (more specific prefixes win).
    pub fn lookup(&self, dst: Ipv4Addr) -> Option<Route> {
        self.routes
            .lock()
            .iter()
            .filter(|r| r.matches(dst))
            .max_by_key(|r| r.netmask.to_u32_be())
            .copied()
    }

    pub fn all(&self) -> Vec<Route> {
        self.routes.lock().clone()
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
        Ipv4Addr([a, b, c, d])
    }

    #[test]
    fn longest_prefix_wins_over_default() {
        let t = RouteTable::new();
        t.add(Route {
            network: ip(0, 0, 0, 0),
            netmask: ip(0, 0, 0, 0),
            nexthop: ip(10, 0, 0, 1),
            dev: DevIndex(0),
        });
        t.add(Route {
            network: ip(192, 168, 1, 0),
            netmask: ip(255, 255, 255, 0),
            nexthop: Ipv4Addr::UNSPECIFIED,
            dev: DevIndex(1),
        });
        let route = t.lookup(ip(192, 168, 1, 42)).unwrap();
        assert_eq!(route.dev, DevIndex(1));
    }

    #[test]
    fn no_match_returns_none() {
        let t = RouteTable::new();
        t.add(Route {
            network: ip(192, 168, 1, 0),
            netmask: ip(255, 255, 255, 0),
            nexthop: Ipv4Addr::UNSPECIFIED,
            dev: DevIndex(0),
        });
        assert!(t.lookup(ip(10, 0, 0, 1)).is_none());
    }
}
