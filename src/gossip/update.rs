//! # Gossip reconciliation.
//!
//! The statestore transport calls
//! [`process_topic_delta`](crate::AdmissionController::process_topic_delta)
//! on every delivery of the request-queue topic. One call, under the
//! controller lock:
//!
//! 1. **Emit**: serialize the local stats of every dirty pool (refreshing
//!    the lazy mem-tracker fields first) and clear the dirty set. Publish
//!    volume is O(changed pools), never O(all pools).
//! 2. **Apply**: fold inbound entries into the per-coordinator remote
//!    maps; tombstones delete, a full (non-delta) refresh clears all
//!    remote state first.
//! 3. **Aggregate**: rebuild every pool's aggregate band and the per-host
//!    reserved map from scratch.
//! 4. Stamp the update time and wake the dequeue worker.
//!
//! Aggregates are estimates: decisions run against the cached state
//! between deliveries, so limits are soft and nothing admitted is ever
//! revoked. Staleness beyond twice the heartbeat only produces a warning;
//! it never blocks admission.

use std::time::Instant;

use crate::controller::core::{AdmissionController, ControllerState};
use crate::events::{Event, EventKind};
use crate::gossip::topic::{parse_topic_key, StatsTopicDelta, StatsTopicEntry};

impl AdmissionController {
    /// Reconciles one statestore delivery and returns the outbound
    /// entries for pools whose local state changed.
    pub async fn process_topic_delta(&self, delta: &StatsTopicDelta) -> Vec<StatsTopicEntry> {
        let mut state = self.state.lock().await;

        let outbound = self.collect_pool_updates(&mut state);
        self.apply_topic_entries(&mut state, delta);
        Self::update_cluster_aggregates(&mut state, &self.cfg.coordinator_id);
        state.last_topic_update = Some(Instant::now());

        tracing::debug!(
            inbound = delta.entries.len(),
            outbound = outbound.len(),
            is_delta = delta.is_delta,
            "processed statestore topic update"
        );
        self.bus.publish(Event::now(EventKind::TopicProcessed));
        self.dequeue_notify.notify_one();
        outbound
    }

    /// Snapshot entries for every dirty pool. Lock held.
    fn collect_pool_updates(&self, state: &mut ControllerState) -> Vec<StatsTopicEntry> {
        let mut dirty: Vec<String> = state.dirty_pools.drain().collect();
        dirty.sort_unstable();
        let mut outbound = Vec::with_capacity(dirty.len());
        for pool_name in dirty {
            if let Some(stats) = state.pools.get_mut(&pool_name) {
                stats.update_mem_tracker_stats(&*self.mem_tracker);
                outbound.push(StatsTopicEntry::update(
                    &pool_name,
                    &self.cfg.coordinator_id,
                    stats.local_stats().clone(),
                ));
            }
        }
        outbound
    }

    /// Folds inbound snapshots and tombstones into the remote maps. Lock
    /// held.
    fn apply_topic_entries(&self, state: &mut ControllerState, delta: &StatsTopicDelta) {
        if !delta.is_delta {
            for stats in state.pools.values_mut() {
                stats.clear_remote_stats();
            }
        }
        for entry in &delta.entries {
            let Some((pool_name, coordinator_id)) = parse_topic_key(&entry.key) else {
                tracing::warn!(key = %entry.key, "ignoring malformed topic key");
                continue;
            };
            // Our own entries come back with every delivery.
            if coordinator_id == self.cfg.coordinator_id {
                continue;
            }
            let pool_name = pool_name.to_string();
            let coordinator_id = coordinator_id.to_string();
            state
                .pool_stats(&pool_name)
                .update_remote_stats(&coordinator_id, entry.stats.clone());
        }
    }

    /// Rebuilds every pool's aggregates and the host reserved map. Lock
    /// held.
    fn update_cluster_aggregates(state: &mut ControllerState, local_coordinator_id: &str) {
        state.host_mem_reserved.clear();
        for stats in state.pools.values_mut() {
            stats.update_aggregates(&mut state.host_mem_reserved, local_coordinator_id);
        }
    }

    /// Milliseconds since the last processed topic update, if any.
    pub async fn time_since_last_update_ms(&self) -> Option<u64> {
        let state = self.state.lock().await;
        state
            .last_topic_update
            .map(|at| at.elapsed().as_millis() as u64)
    }

    /// A warning string when the admission data is stale, prefixed with
    /// `prefix`. Empty result means the data is fresh (or no transport is
    /// wired at all).
    pub async fn staleness_detail(&self, prefix: &str) -> Option<String> {
        let state = self.state.lock().await;
        self.staleness_detail_locked(&state, prefix)
    }

    pub(crate) fn staleness_detail_locked(
        &self,
        state: &ControllerState,
        prefix: &str,
    ) -> Option<String> {
        let last = state.last_topic_update?;
        let elapsed = last.elapsed();
        if elapsed <= self.cfg.statestore_heartbeat * 2 {
            return None;
        }
        Some(format!(
            "{prefix}admission control information from the statestore is stale: {}ms since \
             the last update was received",
            elapsed.as_millis()
        ))
    }
}
