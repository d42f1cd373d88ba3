//! Routing table contract.
//!
//! The routing table is produced by the shortest-path computation, which is
//! not part of this crate. Only the shape the split table consumes is modelled
//! here: an insertion-ordered list of routes, each naming the egress
//! interface and gateway of the current shortest path and whether the route is
//! administratively up.
//!
//! Routes are keyed exactly by network and mask, so overlapping prefixes such
//! as `10.0.0.0/16` and `10.0.0.0/24` are distinct routes.

use std::net::Ipv4Addr;

use crate::error::Result;
use crate::table::{PrefixEntry, PrefixTable};
use crate::types::{Interface, Prefix};

/// A route toward a destination prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Destination prefix.
    pub prefix: Prefix,
    /// Egress interface of the shortest path.
    pub interface: Interface,
    /// Next-hop gateway on that interface.
    pub gateway: Ipv4Addr,
    /// Whether the route is administratively up.
    pub is_active: bool,
}

impl Route {
    /// Create an active route.
    pub fn new(prefix: Prefix, interface: Interface, gateway: Ipv4Addr) -> Self {
        Self {
            prefix,
            interface,
            gateway,
            is_active: true,
        }
    }

    /// Create an active route from an interface name as reported by the system.
    pub fn from_names(prefix: &str, interface: &str, gateway: Ipv4Addr) -> Result<Self> {
        Ok(Self::new(prefix.parse()?, interface.parse()?, gateway))
    }

    /// Mark the route as administratively down.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

impl PrefixEntry for Route {
    fn prefix(&self) -> &Prefix {
        &self.prefix
    }
}

/// Snapshot of the routing table.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: PrefixTable<Route>,
}

impl RoutingTable {
    /// Create an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a route, replacing the route with the same network and mask if any.
    pub fn insert(&mut self, route: Route) {
        match self.routes.get_key_mut(&route.prefix) {
            Some(existing) => *existing = route,
            None => self.routes.push_back(route),
        }
    }

    /// Remove the route stored under `(addr, mask)`.
    pub fn remove(&mut self, addr: Ipv4Addr, mask: Ipv4Addr) -> Option<Route> {
        self.routes.remove_key(&Prefix::new(addr, mask))
    }

    /// Route stored under `(addr, mask)`.
    pub fn get(&self, addr: Ipv4Addr, mask: Ipv4Addr) -> Option<&Route> {
        let key = Prefix::new(addr, mask);
        self.routes.iter().find(|r| r.prefix.same_key(&key))
    }

    /// Bring a route up or down. Returns whether the route exists.
    pub fn set_active(&mut self, addr: Ipv4Addr, mask: Ipv4Addr, active: bool) -> bool {
        match self.routes.get_key_mut(&Prefix::new(addr, mask)) {
            Some(route) => {
                route.is_active = active;
                true
            }
            None => false,
        }
    }

    /// Routes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Routes that are administratively up, in insertion order.
    pub fn active(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().filter(|r| r.is_active)
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether there are no routes.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl FromIterator<Route> for RoutingTable {
    fn from_iter<I: IntoIterator<Item = Route>>(iter: I) -> Self {
        let mut table = Self::new();
        for route in iter {
            table.insert(route);
        }
        table
    }
}
