//! # Per-pool admission statistics.
//!
//! One [`PoolStats`] exists per pool per coordinator. Its fields fall into
//! three bands with different freshness:
//!
//! ```text
//! eager locals ──► updated synchronously on admit/release/queue/dequeue
//!                  (agg_num_running, agg_num_queued, local_mem_admitted,
//!                   local_stats counters)
//! lazy locals  ──► refreshed from the MemTracker right before publish
//!                  (local_stats.backend_mem_reserved / backend_mem_usage)
//! aggregates   ──► recomputed on every gossip tick from
//!                  local_stats + Σ remote_stats
//!                  (agg_num_running, agg_num_queued, agg_mem_reserved)
//! ```
//!
//! The running/queued aggregates are bumped eagerly for local events and
//! overwritten wholesale by the gossip recomputation; after convergence the
//! recomputed value is the truth.
//!
//! ## Rules
//! - `effective_mem_reserved()` is `max(agg_mem_reserved,
//!   local_mem_admitted)`: local admissions count immediately, remote
//!   reservations arrive with gossip, and the max keeps either side from
//!   being under-counted. Do not replace it with a sum.
//! - All mutation happens under the controller lock.

use std::collections::HashMap;

use crate::gossip::PoolStatsSnapshot;
use crate::memory::MemTracker;
use crate::pools::HostMemMap;

/// Bins in the peak-memory histogram.
pub(crate) const HISTOGRAM_NUM_BINS: usize = 128;
/// Width of one histogram bin; the last bin absorbs everything above.
pub(crate) const HISTOGRAM_BIN_SIZE: i64 = 1024 * 1024 * 1024;
/// Weight of the newest sample in the wait-time moving average.
const WAIT_TIME_EMA_MULTIPLIER: f64 = 0.2;

/// Monotonic per-pool counters, incremented on terminal admission events.
///
/// Plain integers: every increment happens under the controller lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolTotals {
    pub admitted: u64,
    pub rejected: u64,
    pub queued: u64,
    /// Requests leaving the queue for admission; timeouts count separately.
    pub dequeued: u64,
    pub timed_out: u64,
    pub released: u64,
    pub time_in_queue_ms: u64,
}

/// Admission accounting for one pool on this coordinator.
#[derive(Debug)]
pub struct PoolStats {
    name: String,

    /// Running queries across all coordinators. Eagerly adjusted locally,
    /// overwritten by `update_aggregates`.
    agg_num_running: i64,
    /// Queued requests across all coordinators. Same discipline.
    agg_num_queued: i64,
    /// Memory reported reserved across all backends. Only
    /// `update_aggregates` writes this.
    agg_mem_reserved: i64,
    /// Cluster-wide memory needed by queries this coordinator admitted.
    /// Known immediately, without gossip latency.
    local_mem_admitted: i64,

    /// This coordinator's snapshot as sent on the topic. The counters are
    /// eager; the backend memory fields are lazy
    /// (see [`update_mem_tracker_stats`](Self::update_mem_tracker_stats)).
    local_stats: PoolStatsSnapshot,

    /// Latest snapshot per remote coordinator, entirely gossip-driven.
    remote_stats: HashMap<String, PoolStatsSnapshot>,

    /// Count of released queries by peak memory, in
    /// [`HISTOGRAM_BIN_SIZE`]-wide bins.
    peak_mem_histogram: Vec<u64>,
    /// Exponential moving average of queue wait time in ms.
    wait_time_ms_ema: f64,

    totals: PoolTotals,
}

impl PoolStats {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agg_num_running: 0,
            agg_num_queued: 0,
            agg_mem_reserved: 0,
            local_mem_admitted: 0,
            local_stats: PoolStatsSnapshot::default(),
            remote_stats: HashMap::new(),
            peak_mem_histogram: vec![0; HISTOGRAM_NUM_BINS],
            wait_time_ms_ema: 0.0,
            totals: PoolTotals::default(),
        }
    }

    pub fn agg_num_running(&self) -> i64 {
        self.agg_num_running
    }

    pub fn agg_num_queued(&self) -> i64 {
        self.agg_num_queued
    }

    pub fn agg_mem_reserved(&self) -> i64 {
        self.agg_mem_reserved
    }

    pub fn local_mem_admitted(&self) -> i64 {
        self.local_mem_admitted
    }

    pub fn local_stats(&self) -> &PoolStatsSnapshot {
        &self.local_stats
    }

    pub fn remote_stats(&self) -> &HashMap<String, PoolStatsSnapshot> {
        &self.remote_stats
    }

    pub fn totals(&self) -> &PoolTotals {
        &self.totals
    }

    pub fn wait_time_ms_ema(&self) -> f64 {
        self.wait_time_ms_ema
    }

    /// Memory figure admission decisions use for this pool.
    ///
    /// The max of the gossip-aggregated reservations and the locally
    /// admitted memory: neither staleness direction under-counts.
    pub fn effective_mem_reserved(&self) -> i64 {
        self.agg_mem_reserved.max(self.local_mem_admitted)
    }

    // ── admission lifecycle ─────────────────────────────────────────────

    /// Accounts an admitted request: `cluster_mem` is its aggregate
    /// memory across all participating hosts.
    pub fn admit(&mut self, cluster_mem: i64) {
        self.agg_num_running += 1;
        self.local_mem_admitted += cluster_mem;
        self.local_stats.num_admitted_running += 1;
        self.totals.admitted += 1;
    }

    /// Reverses [`admit`](Self::admit) when the query terminates, and
    /// buckets its peak memory use.
    pub fn release(&mut self, cluster_mem: i64, peak_mem: i64) {
        self.agg_num_running -= 1;
        self.local_mem_admitted -= cluster_mem;
        self.local_stats.num_admitted_running -= 1;
        self.totals.released += 1;
        if peak_mem >= 0 {
            let bin = ((peak_mem / HISTOGRAM_BIN_SIZE) as usize).min(HISTOGRAM_NUM_BINS - 1);
            self.peak_mem_histogram[bin] += 1;
        }
    }

    pub fn queue(&mut self) {
        self.agg_num_queued += 1;
        self.local_stats.num_queued += 1;
        self.totals.queued += 1;
    }

    pub fn dequeue(&mut self, timed_out: bool) {
        self.agg_num_queued -= 1;
        self.local_stats.num_queued -= 1;
        if timed_out {
            self.totals.timed_out += 1;
        } else {
            self.totals.dequeued += 1;
        }
    }

    pub fn record_rejection(&mut self) {
        self.totals.rejected += 1;
    }

    /// Folds one queue wait into the totals and the moving average.
    pub fn update_wait_time(&mut self, wait_time_ms: u64) {
        self.totals.time_in_queue_ms += wait_time_ms;
        self.wait_time_ms_ema = self.wait_time_ms_ema * (1.0 - WAIT_TIME_EMA_MULTIPLIER)
            + wait_time_ms as f64 * WAIT_TIME_EMA_MULTIPLIER;
    }

    // ── gossip integration ──────────────────────────────────────────────

    /// Refreshes the lazy backend memory fields from the execution
    /// engine's tracker. Called right before this pool's snapshot is
    /// published.
    pub fn update_mem_tracker_stats(&mut self, tracker: &dyn MemTracker) {
        self.local_stats.backend_mem_reserved = tracker.pool_mem_reserved(&self.name);
        self.local_stats.backend_mem_usage = tracker.pool_mem_usage(&self.name);
    }

    /// Replaces (or, on tombstone, removes) one remote coordinator's
    /// snapshot.
    pub fn update_remote_stats(&mut self, coordinator_id: &str, stats: Option<PoolStatsSnapshot>) {
        match stats {
            Some(stats) => {
                self.remote_stats.insert(coordinator_id.to_string(), stats);
            }
            None => {
                self.remote_stats.remove(coordinator_id);
            }
        }
    }

    /// Drops all remote snapshots; precedes a full (non-delta) topic
    /// refresh.
    pub fn clear_remote_stats(&mut self) {
        self.remote_stats.clear();
    }

    /// Recomputes the aggregate band from `local_stats + Σ remote_stats`
    /// and contributes every coordinator's backend reservation to the
    /// per-host accumulator.
    pub fn update_aggregates(
        &mut self,
        host_mem_reserved: &mut HostMemMap,
        local_coordinator_id: &str,
    ) {
        let mut num_running = self.local_stats.num_admitted_running;
        let mut num_queued = self.local_stats.num_queued;
        let mut mem_reserved = self.local_stats.backend_mem_reserved;
        host_mem_reserved.add(local_coordinator_id, self.local_stats.backend_mem_reserved);

        for (coordinator_id, stats) in &self.remote_stats {
            num_running += stats.num_admitted_running;
            num_queued += stats.num_queued;
            mem_reserved += stats.backend_mem_reserved;
            host_mem_reserved.add(coordinator_id, stats.backend_mem_reserved);
        }

        self.agg_num_running = num_running;
        self.agg_num_queued = num_queued;
        self.agg_mem_reserved = mem_reserved;
    }

    // ── informational state ─────────────────────────────────────────────

    /// Sparse `(bin_start_bytes, count)` view of the peak-memory
    /// histogram.
    pub fn histogram_buckets(&self) -> Vec<(i64, u64)> {
        self.peak_mem_histogram
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(bin, count)| (bin as i64 * HISTOGRAM_BIN_SIZE, *count))
            .collect()
    }

    /// Clears the totals, the histogram, and the wait-time average.
    /// Current running/queued/memory state is untouched.
    pub fn reset_informational_stats(&mut self) {
        self.totals = PoolTotals::default();
        self.peak_mem_histogram = vec![0; HISTOGRAM_NUM_BINS];
        self.wait_time_ms_ema = 0.0;
    }
}
