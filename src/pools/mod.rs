//! # Resource pools: configuration and statistics.
//!
//! A pool is a named bucket of limits (concurrency, queue depth, aggregate
//! memory, per-query clamps) plus the accounting needed to enforce them
//! across a fleet of coordinators:
//!
//! - [`PoolConfig`]: the limits, with fixed and cluster-scaled variants
//!   resolved through single derivation methods.
//! - [`PoolStats`]: per-coordinator accounting in three freshness bands
//!   (eager local, lazy local, gossip-aggregated).
//! - [`HostMemMap`]: the per-host analogue of the pool-level
//!   reserved/admitted split.

mod config;
mod hostmem;
mod stats;

pub use config::PoolConfig;
pub use hostmem::HostMemMap;
pub use stats::{PoolStats, PoolTotals};

pub(crate) use config::display_bytes;
