//! Per-destination traffic rate estimation.
//!
//! The forwarding path adds each packet's length to a cumulative per-destination
//! byte counter. A periodic sampler turns the counter delta since the previous
//! sample into a rate in KB/s. Counting and sampling touch disjoint fields: the
//! forwarding path only ever writes `flow`, the sampler is the only writer of
//! `rate`, `last_flow` and `last_sample`.

mod sampler;

pub use sampler::{RateSampler, SamplerConfig};

use std::fmt;
use std::net::Ipv4Addr;

use crate::table::{PrefixEntry, PrefixTable};
use crate::types::{Prefix, Timestamp};
use crate::NOT_FOUND;

/// Bytes per kilobyte used for rate units.
const BYTES_PER_KB: f64 = 1024.0;

/// Rate state for one destination.
#[derive(Debug, Clone, PartialEq)]
pub struct RateEntry {
    /// Destination prefix.
    pub prefix: Prefix,
    /// Rate measured by the last sample, in KB/s.
    pub rate: f64,
    /// Cumulative bytes observed toward the destination.
    pub flow: u64,
    /// Value of `flow` at the last sample.
    pub last_flow: u64,
    /// Time of the last sample (or of creation).
    pub last_sample: Timestamp,
}

impl RateEntry {
    /// A fresh entry that has seen `flow` bytes and no sample yet.
    pub fn new(prefix: Prefix, flow: u64, now: Timestamp) -> Self {
        Self {
            prefix,
            rate: 0.0,
            flow,
            last_flow: 0,
            last_sample: now,
        }
    }

    /// Bytes counted since the last sample.
    pub fn pending(&self) -> u64 {
        self.flow.saturating_sub(self.last_flow)
    }

    /// Fold the bytes counted since the last sample into `rate`.
    ///
    /// Returns `false`, leaving the entry untouched, when no time has elapsed
    /// (or the clock went backwards); the pending bytes then count toward the
    /// next sample.
    fn sample(&mut self, now: Timestamp) -> bool {
        let elapsed = now.seconds_since(self.last_sample);
        if elapsed <= 0.0 {
            return false;
        }

        self.rate = self.pending() as f64 / elapsed / BYTES_PER_KB;
        self.last_flow = self.flow;
        self.last_sample = now;
        true
    }
}

impl PrefixEntry for RateEntry {
    fn prefix(&self) -> &Prefix {
        &self.prefix
    }
}

/// Outcome of one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleReport {
    /// Entries whose rate was updated.
    pub sampled: usize,
    /// Entries skipped because no time had elapsed since their last sample.
    pub skipped: usize,
}

/// Table of per-destination rate entries.
///
/// Methods do no locking; share the table through a
/// [`TableLock`](crate::table::TableLock).
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    entries: PrefixTable<RateEntry>,
}

impl RateTable {
    /// Create an empty rate table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry selected by `(destination, mask)`.
    pub fn lookup(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<&RateEntry> {
        self.entries.get(destination, mask)
    }

    /// Count `length` bytes toward a destination, creating its entry on first sight.
    ///
    /// Returns `true` when a new entry was created.
    pub fn record_flow(&mut self, destination: Ipv4Addr, mask: Ipv4Addr, length: u64) -> bool {
        self.record_flow_at(destination, mask, length, Timestamp::now())
    }

    /// [`record_flow`](Self::record_flow) with an explicit creation time.
    pub fn record_flow_at(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        length: u64,
        now: Timestamp,
    ) -> bool {
        if let Some(entry) = self.entries.get_mut(destination, mask) {
            entry.flow = entry.flow.saturating_add(length);
            return false;
        }

        let prefix = Prefix::new(destination, mask);
        tracing::trace!(%prefix, length, "New rate table entry");
        self.entries.push_back(RateEntry::new(prefix, length, now));
        true
    }

    /// Recompute every entry's rate from the bytes counted since its last sample.
    pub fn sample_rate(&mut self) -> SampleReport {
        self.sample_rate_at(Timestamp::now())
    }

    /// [`sample_rate`](Self::sample_rate) at an explicit time.
    pub fn sample_rate_at(&mut self, now: Timestamp) -> SampleReport {
        let mut report = SampleReport::default();

        for entry in &mut self.entries {
            if entry.sample(now) {
                report.sampled += 1;
            } else {
                tracing::warn!(
                    prefix = %entry.prefix,
                    last_sample = %entry.last_sample,
                    now = %now,
                    "No time elapsed since last sample, skipping"
                );
                report.skipped += 1;
            }
        }

        report
    }

    /// Rate of a destination, if known.
    pub fn rate(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<f64> {
        self.lookup(destination, mask).map(|e| e.rate)
    }

    /// Rate of a destination, or [`NOT_FOUND`] when unknown.
    pub fn rate_of(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> f64 {
        self.rate(destination, mask).unwrap_or(NOT_FOUND)
    }

    /// Insert an entry, or replace every field of the existing one.
    pub fn upsert(&mut self, entry: RateEntry) {
        let Prefix { addr, mask } = entry.prefix;
        match self.entries.get_mut(addr, mask) {
            Some(existing) => *existing = entry,
            None => self.entries.push_back(entry),
        }
    }

    /// Remove a destination. Returns whether it was present.
    pub fn remove(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        self.entries.remove(destination, mask).is_some()
    }

    /// Zero a destination's byte counters, keeping its rate and sample time.
    pub fn reset_counters(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        match self.entries.get_mut(destination, mask) {
            Some(entry) => {
                entry.flow = 0;
                entry.last_flow = 0;
                true
            }
            None => false,
        }
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
    pub fn iter(&self) -> impl Iterator<Item = &RateEntry> {
        self.entries.iter()
    }
}

const RULE: &str =
    "=================================================================================";

impl fmt::Display for RateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "---RSTABLE---")?;
        writeln!(
            f,
            "Index Destination     Mask            rate      flow       last_flow  last_update"
        )?;
        writeln!(f, "{RULE}")?;

        if self.entries.is_empty() {
            writeln!(f, "THERE IS NO ENTRY IN RSTABLE")?;
        }

        for (index, e) in self.entries.iter().enumerate() {
            writeln!(
                f,
                "{:5} {:<15} {:<15} {:8.2} {:10} {:10} {}",
                index,
                e.prefix.addr.to_string(),
                e.prefix.mask.to_string(),
                e.rate,
                e.flow,
                e.last_flow,
                e.last_sample.secs
            )?;
        }

        writeln!(f, "{RULE}")
    }
}
