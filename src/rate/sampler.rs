//! Background task that keeps rate entries fresh.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{RateTable, SampleReport};
use crate::error::{Error, Result};
use crate::table::TableLock;

/// Rate sampler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Time between sampling passes.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

fn default_interval() -> Duration {
    Duration::from_millis(900)
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

impl SamplerConfig {
    /// Check that the sampling period is usable.
    pub fn validate(&self) -> Result<()> {
        check_interval(self.interval)
    }
}

fn check_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::InvalidConfig(
            "sampler.interval must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Periodically recomputes every rate entry.
///
/// Each tick takes the rate table's write lock alone, samples, and releases
/// it. The sampler never touches any other table.
#[derive(Debug, Clone)]
pub struct RateSampler {
    rates: Arc<TableLock<RateTable>>,
    interval: Duration,
}

impl RateSampler {
    /// Create a sampler for a shared rate table. The interval must be non-zero.
    pub fn new(rates: Arc<TableLock<RateTable>>, interval: Duration) -> Result<Self> {
        check_interval(interval)?;
        Ok(Self { rates, interval })
    }

    /// Create a sampler from configuration.
    pub fn from_config(rates: Arc<TableLock<RateTable>>, config: &SamplerConfig) -> Result<Self> {
        Self::new(rates, config.interval)
    }

    /// Sampling period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one sampling pass now.
    pub fn sample_once(&self) -> Result<SampleReport> {
        let mut rates = self.rates.write()?;
        Ok(rates.sample_rate())
    }

    /// Start sampling in a background task on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; use
    /// [`spawn_on`](Self::spawn_on) from plain threads.
    pub fn spawn(self) -> JoinHandle<()> {
        self.spawn_on(&Handle::current())
    }

    /// Start sampling in a background task on `runtime`.
    ///
    /// The task runs until the runtime shuts down or the handle is aborted.
    /// The first pass happens one full period after the start.
    pub fn spawn_on(self, runtime: &Handle) -> JoinHandle<()> {
        tracing::info!(interval = ?self.interval, "Starting rate sampler");

        runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.sample_once() {
                    Ok(report) => {
                        tracing::trace!(
                            sampled = report.sampled,
                            skipped = report.skipped,
                            "Sampled rate table"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Rate sampling pass failed");
                    }
                }
            }
        })
    }
}
