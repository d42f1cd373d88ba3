//! Per-destination traffic split weights ("alpha").
//!
//! For every destination the split table holds one weight per egress
//! interface: the fraction of traffic toward that destination sent out the
//! interface. Weights follow the routing table. A destination seen for the
//! first time is fully committed to its shortest-path interface; afterwards
//! every recompute decays the other interfaces' weights by
//! [`SplitConfig::decayed`] and hands what they shed to the current shortest
//! path, so weights always lie in `[0, 1]` and sum to 1.

mod law;

pub use law::SplitConfig;

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::rate::RateTable;
use crate::routing::{Route, RoutingTable};
use crate::table::{PrefixEntry, PrefixTable};
use crate::types::{Interface, Prefix, INTERFACE_COUNT};
use crate::NOT_FOUND;

/// Split state for one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitEntry {
    /// Destination prefix.
    pub prefix: Prefix,
    /// Weight per interface, indexed by [`Interface::index`].
    pub weights: [f64; INTERFACE_COUNT],
    /// Last known next-hop gateway per interface; unspecified when never used.
    pub next_hops: [Ipv4Addr; INTERFACE_COUNT],
}

impl SplitEntry {
    /// Entry fully committed to one interface.
    pub fn seeded(prefix: Prefix, interface: Interface, gateway: Ipv4Addr) -> Self {
        let mut weights = [0.0; INTERFACE_COUNT];
        let mut next_hops = [Ipv4Addr::UNSPECIFIED; INTERFACE_COUNT];
        weights[interface.index()] = 1.0;
        next_hops[interface.index()] = gateway;
        Self {
            prefix,
            weights,
            next_hops,
        }
    }

    /// Weight of an interface.
    pub fn weight(&self, interface: Interface) -> f64 {
        self.weights[interface.index()]
    }

    /// Next hop recorded for an interface.
    pub fn next_hop(&self, interface: Interface) -> Ipv4Addr {
        self.next_hops[interface.index()]
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Decay every interface but the route's and give the remainder to the route's.
    fn adapt(&mut self, route: &Route, rate: f64, law: &SplitConfig) {
        let target = route.interface.index();

        let mut others = 0.0;
        for (i, w) in self.weights.iter_mut().enumerate() {
            if i != target {
                *w = law.decayed(*w, rate);
                others += *w;
            }
        }

        // Weights written through `upsert` need not sum to 1; if what is left
        // on the other interfaces still exceeds 1, rescale it.
        if others > 1.0 {
            for (i, w) in self.weights.iter_mut().enumerate() {
                if i != target {
                    *w /= others;
                }
            }
            self.weights[target] = 0.0;
        } else {
            self.weights[target] = law::clamp01(1.0 - others);
        }

        self.next_hops[target] = route.gateway;
    }

    /// Pick an interface for a uniform draw `r` in `[0, 1)`.
    fn pick(&self, r: f64) -> Option<Interface> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }

        let mut cumulative = 0.0;
        let mut last = None;
        for iface in Interface::ALL {
            let w = self.weight(iface);
            if w <= 0.0 {
                continue;
            }
            cumulative += w / total;
            last = Some(iface);
            if r < cumulative {
                return last;
            }
        }
        last
    }
}

impl PrefixEntry for SplitEntry {
    fn prefix(&self) -> &Prefix {
        &self.prefix
    }
}

/// Counts from one recompute pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecomputeStats {
    /// Destinations seen for the first time and seeded.
    pub seeded: usize,
    /// Existing destinations whose weights were adapted.
    pub adapted: usize,
    /// Routes skipped because they are administratively down.
    pub inactive: usize,
}

/// Table of per-destination split entries.
///
/// Methods do no locking; share the table through a
/// [`TableLock`](crate::table::TableLock).
#[derive(Debug, Clone, Default)]
pub struct SplitTable {
    entries: PrefixTable<SplitEntry>,
}

impl SplitTable {
    /// Create an empty split table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry selected by `(destination, mask)`.
    pub fn lookup(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<&SplitEntry> {
        self.entries.get(destination, mask)
    }

    /// Weights of a destination, if known.
    pub fn weights(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<[f64; INTERFACE_COUNT]> {
        self.lookup(destination, mask).map(|e| e.weights)
    }

    /// Weight of one interface toward a destination, or [`NOT_FOUND`].
    pub fn weight_of(&self, destination: Ipv4Addr, mask: Ipv4Addr, interface: Interface) -> f64 {
        self.lookup(destination, mask)
            .map_or(NOT_FOUND, |e| e.weight(interface))
    }

    /// Insert an entry or replace every field of the existing one.
    ///
    /// Every weight must be a number in `[0, 1]`. Without `next_hops` the
    /// entry's next hops are reset to unspecified.
    pub fn upsert(
        &mut self,
        prefix: Prefix,
        weights: [f64; INTERFACE_COUNT],
        next_hops: Option<[Ipv4Addr; INTERFACE_COUNT]>,
    ) -> Result<()> {
        for iface in Interface::ALL {
            let weight = weights[iface.index()];
            if !(0.0..=1.0).contains(&weight) {
                return Err(Error::InvalidWeight {
                    interface: iface.name().to_string(),
                    weight,
                });
            }
        }

        let entry = SplitEntry {
            prefix,
            weights,
            next_hops: next_hops.unwrap_or([Ipv4Addr::UNSPECIFIED; INTERFACE_COUNT]),
        };
        match self.entries.get_mut(prefix.addr, prefix.mask) {
            Some(existing) => *existing = entry,
            None => self.entries.push_back(entry),
        }
        Ok(())
    }

    /// Remove a destination. Returns whether it was present.
    pub fn remove(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        self.entries.remove(destination, mask).is_some()
    }

    /// Resynchronize against a routing snapshot, adapting weights to measured rates.
    ///
    /// Routes that are down are skipped and their entries left as they are.
    /// Entries with no route are kept; only [`reset`](Self::reset) removes them.
    pub fn recompute(
        &mut self,
        routes: &RoutingTable,
        rates: &RateTable,
        law: &SplitConfig,
    ) -> RecomputeStats {
        let mut stats = RecomputeStats::default();

        for route in routes.iter() {
            if !route.is_active {
                stats.inactive += 1;
                continue;
            }

            let Prefix { addr, mask } = route.prefix;
            match self.entries.get_mut(addr, mask) {
                None => {
                    tracing::debug!(
                        prefix = %route.prefix,
                        interface = %route.interface,
                        "Seeding split entry"
                    );
                    self.entries
                        .push_back(SplitEntry::seeded(route.prefix, route.interface, route.gateway));
                    stats.seeded += 1;
                }
                Some(entry) => {
                    let rate = rates.rate_of(entry.prefix.addr, entry.prefix.mask);
                    entry.adapt(route, rate, law);
                    tracing::trace!(
                        prefix = %entry.prefix,
                        interface = %route.interface,
                        rate,
                        weights = ?entry.weights,
                        "Adapted split weights"
                    );
                    stats.adapted += 1;
                }
            }
        }

        stats
    }

    /// Choose an egress interface for a destination given a uniform draw in `[0, 1)`.
    ///
    /// `None` when the destination is unknown or has no positive weight.
    pub fn select(&self, destination: Ipv4Addr, mask: Ipv4Addr, draw: f64) -> Option<Interface> {
        self.lookup(destination, mask).and_then(|e| e.pick(draw))
    }

    /// Drop every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SplitEntry> {
        self.entries.iter()
    }
}

const RULE: &str = "=============================================================================================================================================";

impl fmt::Display for SplitTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---ATABLE---")?;
        write!(f, "Index Destination     Mask           ")?;
        for i in 0..INTERFACE_COUNT {
            write!(f, " Next Hop IP[{i}]  alpha[{i}] ")?;
        }
        writeln!(f)?;
        writeln!(f, "{RULE}")?;

        if self.entries.is_empty() {
            writeln!(f, "THERE IS NO ENTRY IN ATABLE")?;
        }

        for (index, e) in self.entries.iter().enumerate() {
            write!(
                f,
                "{:5} {:<15} {:<15}",
                index,
                e.prefix.addr.to_string(),
                e.prefix.mask.to_string()
            )?;
            for (hop, weight) in e.next_hops.iter().zip(e.weights) {
                write!(f, " {:<15} {:1.7}", hop.to_string(), weight)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "{RULE}")
    }
}
