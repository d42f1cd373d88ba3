//! # Splitpath
//!
//! Adaptive multipath traffic splitting for an overlay router.
//!
//! Splitpath keeps, for every destination prefix, a measured traffic rate and
//! a set of per-interface split weights. The forwarding path counts bytes and
//! asks for weights; a background sampler turns byte counts into rates; the
//! routing subsystem triggers a recompute that shifts weight toward the
//! current shortest path at a speed set by the measured rate.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Forwarding path            Routing subsystem           │
//! │   record_flow / get_alpha / select      recompute / rebuild     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         SplitManager                            │
//! │  ┌───────────────┐   ┌───────────────┐   ┌───────────────┐      │
//! │  │ RoutingTable  │ → │  SplitTable   │ → │   RateTable   │      │
//! │  │   (rtable)    │   │   (atable)    │   │   (rstable)   │      │
//! │  └───────────────┘   └───────────────┘   └───────┬───────┘      │
//! ├──────────────────────────────────────────────────┼──────────────┤
//! │                                       RateSampler (tokio task)  │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! Arrows show the order locks are taken in when more than one is held.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]      // Many functions can't be const due to trait bounds
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]  // Microsecond remainders fit in u32
#![allow(clippy::cast_precision_loss)]       // Byte counts to KB/s
#![allow(clippy::cast_possible_wrap)]        // Epoch seconds fit in i64
#![allow(clippy::significant_drop_tightening)] // Lock ordering is intentional
#![allow(clippy::option_if_let_else)]        // More readable in context
#![allow(clippy::use_self)]                  // Explicit type names in matches
#![allow(clippy::redundant_pub_crate)]       // Explicit visibility
#![allow(clippy::return_self_not_must_use)]  // Builder methods don't need must_use

pub mod config;
pub mod error;
pub mod manager;
pub mod rate;
pub mod routing;
pub mod split;
pub mod table;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::SplitManager;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value returned by weight and rate queries for an unknown destination.
pub const NOT_FOUND: f64 = -1.0;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::manager::SplitManager;
    pub use crate::rate::{RateEntry, RateSampler, RateTable};
    pub use crate::routing::{Route, RoutingTable};
    pub use crate::split::{RecomputeStats, SplitConfig, SplitEntry, SplitTable};
    pub use crate::table::TableLock;
    pub use crate::types::*;
    pub use crate::NOT_FOUND;
}
