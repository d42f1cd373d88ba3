//! Split manager: the context handle shared by the forwarding path, the
//! routing subsystem and operational tooling.
//!
//! The manager owns the rate and split tables, each behind its own lock, and
//! a handle to the routing table. Every method acquires what it needs,
//! performs a batch of table operations, and releases on return. Whenever
//! more than one lock is held they are taken in the order
//! routing → split → rate; the rate sampler only ever takes the rate lock.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::Result;
use crate::rate::{RateEntry, RateSampler, RateTable};
use crate::routing::RoutingTable;
use crate::split::{RecomputeStats, SplitTable};
use crate::table::TableLock;
use crate::types::{Interface, Prefix, INTERFACE_COUNT};

/// Shared routing table handle.
pub type SharedRoutingTable = Arc<TableLock<RoutingTable>>;

/// Adaptive traffic split manager.
pub struct SplitManager {
    config: Config,
    routes: SharedRoutingTable,
    splits: Arc<TableLock<SplitTable>>,
    rates: Arc<TableLock<RateTable>>,
}

impl SplitManager {
    /// Create a manager with empty tables over an existing routing table.
    pub fn new(config: Config, routes: SharedRoutingTable) -> Result<Self> {
        config.validate()?;

        let timeout = config.locks.acquire_timeout;
        Ok(Self {
            splits: Arc::new(TableLock::with_timeout("atable", SplitTable::new(), timeout)),
            rates: Arc::new(TableLock::with_timeout("rstable", RateTable::new(), timeout)),
            config,
            routes,
        })
    }

    /// Create a manager that also owns a fresh routing table.
    pub fn standalone(config: Config) -> Result<Self> {
        let routes = Arc::new(TableLock::with_timeout(
            "rtable",
            RoutingTable::new(),
            config.locks.acquire_timeout,
        ));
        Self::new(config, routes)
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Routing table handle.
    pub fn routes(&self) -> &SharedRoutingTable {
        &self.routes
    }

    /// Split table lock, for batched access.
    pub fn splits(&self) -> &TableLock<SplitTable> {
        &self.splits
    }

    /// Rate table lock, for batched access.
    pub fn rates(&self) -> &TableLock<RateTable> {
        &self.rates
    }

    // Forwarding path

    /// Split weight of a named interface toward a destination, or `-1` when
    /// the destination is unknown. Unknown interface names are an error.
    pub fn get_alpha(&self, destination: Ipv4Addr, mask: Ipv4Addr, interface: &str) -> Result<f64> {
        let interface: Interface = interface.parse()?;
        self.alpha(destination, mask, interface)
    }

    /// Split weight of an interface toward a destination, or `-1`.
    pub fn alpha(&self, destination: Ipv4Addr, mask: Ipv4Addr, interface: Interface) -> Result<f64> {
        Ok(self.splits.read()?.weight_of(destination, mask, interface))
    }

    /// Measured rate toward a destination in KB/s, or `-1` when unknown.
    pub fn get_rate(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Result<f64> {
        Ok(self.rates.read()?.rate_of(destination, mask))
    }

    /// Count a forwarded packet toward its destination.
    pub fn record_flow(&self, destination: Ipv4Addr, mask: Ipv4Addr, length: u64) -> Result<()> {
        self.rates.write()?.record_flow(destination, mask, length);
        Ok(())
    }

    /// Draw an egress interface for a destination in proportion to its weights.
    ///
    /// `None` means the destination has no split state and the packet should
    /// take the default, unsplit route.
    pub fn select_interface(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Result<Option<Interface>> {
        let draw: f64 = rand::random();
        Ok(self.splits.read()?.select(destination, mask, draw))
    }

    // Routing subsystem

    /// Resynchronize split weights with the routing table and measured rates.
    ///
    /// Call once after every routing table recomputation.
    pub fn recompute(&self) -> Result<RecomputeStats> {
        let routes = self.routes.read()?;
        let mut splits = self.splits.write()?;
        let rates = self.rates.read()?;

        let stats = splits.recompute(&routes, &rates, &self.config.split);
        tracing::debug!(
            routes = routes.len(),
            seeded = stats.seeded,
            adapted = stats.adapted,
            inactive = stats.inactive,
            "Recomputed split table"
        );
        Ok(stats)
    }

    /// Apply a change to the routing table, then recompute.
    pub fn update_routes<F>(&self, change: F) -> Result<RecomputeStats>
    where
        F: FnOnce(&mut RoutingTable),
    {
        {
            let mut routes = self.routes.write()?;
            change(&mut routes);
        }
        self.recompute()
    }

    /// Replace the whole topology: install `routes`, clear both tables and
    /// seed the split table from scratch.
    pub fn rebuild(&self, routes: RoutingTable) -> Result<RecomputeStats> {
        let mut current = self.routes.write()?;
        let mut splits = self.splits.write()?;
        let mut rates = self.rates.write()?;

        *current = routes;
        splits.reset();
        rates.reset();

        let stats = splits.recompute(&current, &rates, &self.config.split);
        tracing::info!(
            routes = current.len(),
            seeded = stats.seeded,
            "Rebuilt split state for new topology"
        );
        Ok(stats)
    }

    // Management surface

    /// Insert or replace a destination's split entry.
    pub fn upsert_split(
        &self,
        prefix: Prefix,
        weights: [f64; INTERFACE_COUNT],
        next_hops: Option<[Ipv4Addr; INTERFACE_COUNT]>,
    ) -> Result<()> {
        self.splits.write()?.upsert(prefix, weights, next_hops)
    }

    /// Remove a destination's split entry. Returns whether it existed.
    pub fn delete_split(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Result<bool> {
        Ok(self.splits.write()?.remove(destination, mask))
    }

    /// Insert or replace a destination's rate entry.
    pub fn upsert_rate(&self, entry: RateEntry) -> Result<()> {
        self.rates.write()?.upsert(entry);
        Ok(())
    }

    /// Remove a destination's rate entry. Returns whether it existed.
    pub fn delete_rate(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Result<bool> {
        Ok(self.rates.write()?.remove(destination, mask))
    }

    /// Zero a destination's byte counters. Returns whether it existed.
    pub fn reset_rate_counters(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Result<bool> {
        Ok(self.rates.write()?.reset_counters(destination, mask))
    }

    /// Clear both tables, leaving the routing table alone.
    pub fn reset(&self) -> Result<()> {
        let mut splits = self.splits.write()?;
        let mut rates = self.rates.write()?;
        splits.reset();
        rates.reset();
        tracing::info!("Cleared split and rate tables");
        Ok(())
    }

    /// Human-readable dump of the rate table.
    pub fn dump_rates(&self) -> Result<String> {
        Ok(self.rates.read()?.to_string())
    }

    /// Human-readable dump of the split table.
    pub fn dump_splits(&self) -> Result<String> {
        Ok(self.splits.read()?.to_string())
    }

    // Background work

    /// Rate sampler bound to this manager's rate table.
    pub fn sampler(&self) -> Result<RateSampler> {
        RateSampler::from_config(Arc::clone(&self.rates), &self.config.sampler)
    }

    /// Start the rate sampler on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; threads that are not
    /// runtime workers use [`spawn_sampler_on`](Self::spawn_sampler_on).
    pub fn spawn_sampler(&self) -> Result<JoinHandle<()>> {
        Ok(self.sampler()?.spawn())
    }

    /// Start the rate sampler on `runtime`.
    pub fn spawn_sampler_on(&self, runtime: &Handle) -> Result<JoinHandle<()>> {
        Ok(self.sampler()?.spawn_on(runtime))
    }
}

// Intentionally abbreviated Debug output - table contents are available through the dumps
#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for SplitManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitManager")
            .field("split", &self.config.split)
            .field("sampler", &self.config.sampler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::routing::Route;
    use crate::types::Timestamp;
    use std::time::Duration;

    const MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);
    const DEST: Ipv4Addr = Ipv4Addr::new(10, 1, 0, 0);

    fn manager() -> SplitManager {
        SplitManager::standalone(Config::default()).unwrap()
    }

    fn route(iface: &str) -> Route {
        Route::from_names("10.1.0.0/24", iface, Ipv4Addr::new(192, 168, 0, 1)).unwrap()
    }

    #[test]
    fn test_sentinels_before_any_state() {
        let m = manager();
        assert_eq!(m.get_alpha(DEST, MASK, "eth0").unwrap(), -1.0);
        assert_eq!(m.get_rate(DEST, MASK).unwrap(), -1.0);
        assert_eq!(m.select_interface(DEST, MASK).unwrap(), None);
    }

    #[test]
    fn test_unknown_interface_name_rejected() {
        let m = manager();
        m.update_routes(|r| r.insert(route("eth3"))).unwrap();
        assert!(matches!(
            m.get_alpha(DEST, MASK, "eth4"),
            Err(Error::UnknownInterface(_))
        ));
        assert_eq!(m.get_alpha(DEST, MASK, "eth3").unwrap(), 1.0);
    }

    #[test]
    fn test_update_routes_triggers_recompute() {
        let m = manager();
        let stats = m.update_routes(|r| r.insert(route("eth1"))).unwrap();
        assert_eq!(stats.seeded, 1);
        assert_eq!(m.select_interface(DEST, MASK).unwrap(), Some(Interface::Eth1));

        let stats = m.update_routes(|r| r.insert(route("eth2"))).unwrap();
        assert_eq!(stats.adapted, 1);
        // No traffic measured: the old path is dropped at the rate floor.
        assert_eq!(m.alpha(DEST, MASK, Interface::Eth1).unwrap(), 0.0);
        assert_eq!(m.alpha(DEST, MASK, Interface::Eth2).unwrap(), 1.0);
    }

    #[test]
    fn test_rebuild_clears_both_tables() {
        let m = manager();
        m.update_routes(|r| r.insert(route("eth0"))).unwrap();
        m.record_flow(DEST, MASK, 1500).unwrap();
        m.upsert_split(
            Prefix::new(Ipv4Addr::new(10, 9, 0, 0), MASK),
            [0.5, 0.5, 0.0, 0.0],
            None,
        )
        .unwrap();

        let stats = m.rebuild([route("eth3")].into_iter().collect()).unwrap();
        assert_eq!(stats.seeded, 1);
        assert_eq!(m.get_rate(DEST, MASK).unwrap(), -1.0);
        assert_eq!(m.get_alpha(Ipv4Addr::new(10, 9, 0, 0), MASK, "eth0").unwrap(), -1.0);
        assert_eq!(m.alpha(DEST, MASK, Interface::Eth3).unwrap(), 1.0);
    }

    #[test]
    fn test_management_surface() {
        let m = manager();
        let prefix = Prefix::new(DEST, MASK);

        m.upsert_rate(RateEntry {
            rate: 42.0,
            ..RateEntry::new(prefix, 100, Timestamp::now())
        })
        .unwrap();
        assert_eq!(m.get_rate(DEST, MASK).unwrap(), 42.0);
        assert!(m.reset_rate_counters(DEST, MASK).unwrap());
        assert!(m.delete_rate(DEST, MASK).unwrap());
        assert!(!m.delete_rate(DEST, MASK).unwrap());

        m.upsert_split(prefix, [0.0, 0.0, 0.0, 1.0], None).unwrap();
        assert!(m.delete_split(DEST, MASK).unwrap());
        assert!(!m.delete_split(DEST, MASK).unwrap());

        assert!(m.dump_rates().unwrap().contains("THERE IS NO ENTRY IN RSTABLE"));
        assert!(m.dump_splits().unwrap().contains("THERE IS NO ENTRY IN ATABLE"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.split.scale = -1.0;
        assert!(SplitManager::standalone(config).is_err());
    }

    #[test]
    fn test_sampler_started_from_plain_thread() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut config = Config::default();
        config.sampler.interval = Duration::from_millis(10);
        let m = SplitManager::standalone(config).unwrap();
        m.record_flow(DEST, MASK, 4096).unwrap();

        let handle = m.spawn_sampler_on(runtime.handle()).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        handle.abort();

        let rates = m.rates().read().unwrap();
        assert_eq!(rates.lookup(DEST, MASK).unwrap().last_flow, 4096);
    }
}
