//! # The dequeue worker.
//!
//! A single background task per coordinator. It sleeps on the controller's
//! notify handle and, on every wake-up, walks each pool with a non-empty
//! queue trying to admit from the head.
//!
//! ## Rules
//! - Strict FIFO within a pool: if the head cannot be admitted, the pool
//!   is skipped until the next state change; later entries never jump it.
//! - Memory requirements are re-derived for the head on every attempt, so
//!   pool config changes apply to waiting requests.
//! - The number of dequeues per wake-up is bounded by a proportionality
//!   heuristic (see [`max_to_dequeue`]): each coordinator takes a share of
//!   the free capacity proportional to its share of the cluster-wide
//!   queue, which limits collective overadmission when many coordinators
//!   observe the same resource release. The share is computed against the
//!   gossiped queue total even when the remote queued requests could not
//!   actually fit elsewhere, so a pool can dequeue slower than strictly
//!   necessary.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::controller::core::{AdmissionController, ControllerState};
use crate::controller::decision::{self, HostMemBands, PoolView};
use crate::events::{Event, EventKind};
use crate::outcome::AdmissionOutcome;
use crate::pools::PoolConfig;
use crate::request::MemoryRequirements;

/// Bounds how many requests one wake-up may admit from one pool's queue.
///
/// Returns `ceil(queue_len × slots_available / agg_queued)` clamped to
/// `[1, queue_len]` while capacity exists, `0` when the pool's running
/// count is already at its limit, and the whole queue when the pool does
/// not limit running queries (memory then gates each admission
/// individually).
pub(crate) fn max_to_dequeue(
    queue_len: i64,
    pool: &PoolView,
    cfg: &PoolConfig,
    cluster_size: i64,
) -> i64 {
    if queue_len <= 0 {
        return 0;
    }
    if !cfg.limits_running_queries(cluster_size) {
        return queue_len;
    }
    let max_requests = cfg.max_requests_for_pool(cluster_size);
    let slots_available = max_requests - pool.agg_num_running;
    if slots_available <= 0 {
        return 0;
    }
    let agg_queued = pool.agg_num_queued.max(queue_len);
    let fraction = queue_len as f64 / agg_queued as f64;
    let proportional = ((slots_available as f64 * fraction).ceil() as i64).max(1);
    proportional.min(queue_len)
}

impl AdmissionController {
    /// Runs until `token` is cancelled. Spawned by
    /// [`run`](AdmissionController::run).
    pub(crate) async fn dequeue_loop(self: Arc<Self>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = self.dequeue_notify.notified() => {}
            }
            let cluster_size = self.cluster_size();
            let mut state = self.state.lock().await;
            self.dequeue_all_pools(&mut state, cluster_size);
        }
        tracing::debug!("dequeue worker retired");
    }

    /// One pass over every pool with queued requests. Lock held.
    fn dequeue_all_pools(&self, state: &mut ControllerState, cluster_size: i64) {
        let pool_names: Vec<String> = state
            .queues
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        for pool_name in pool_names {
            // Configs are cached at submission; a queue implies one exists.
            let Some(pool_cfg) = state.pool_configs.get(&pool_name).cloned() else {
                continue;
            };
            let budget = max_to_dequeue(
                state.queue_len(&pool_name),
                &state.pool_view(&pool_name),
                &pool_cfg,
                cluster_size,
            );
            let mut remaining = budget;

            while remaining > 0 {
                let Some(head) = state
                    .queues
                    .get(&pool_name)
                    .and_then(|queue| queue.front())
                    .map(Arc::clone)
                else {
                    break;
                };
                let mem = MemoryRequirements::derive(
                    &head.request,
                    &pool_cfg,
                    self.cfg.backend_physical_mem,
                );
                let verdict = decision::can_admit_request(
                    &head.request,
                    &mem,
                    &pool_cfg,
                    &state.pool_view(&pool_name),
                    HostMemBands {
                        reserved: &state.host_mem_reserved,
                        admitted: &state.host_mem_admitted,
                    },
                    cluster_size,
                    true,
                    state.queue_len(&pool_name),
                );

                match verdict {
                    Err(reason) => {
                        head.request.profile.set_last_queue_reason(&reason);
                        tracing::debug!(
                            pool = %pool_name,
                            query = %head.request.query_id,
                            %reason,
                            "head of queue cannot be admitted"
                        );
                        break;
                    }
                    Ok(()) => {
                        state.remove_queued(&pool_name, &head);
                        remaining -= 1;
                        if head.outcome.set(AdmissionOutcome::Admitted)
                            == AdmissionOutcome::Admitted
                        {
                            state.pool_stats(&pool_name).dequeue(false);
                            self.admit_query(state, &head.request, &mem, true);
                            self.bus.publish(
                                Event::now(EventKind::Dequeued)
                                    .with_pool(&pool_name)
                                    .with_query(&head.request.query_id)
                                    .with_wait(head.enqueued_at.elapsed()),
                            );
                        } else {
                            // Lost to a canceller: nothing was charged and
                            // the submit task owns the stats decrement.
                            tracing::debug!(
                                pool = %pool_name,
                                query = %head.request.query_id,
                                "dequeued an already-cancelled query"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(running: i64, queued: i64) -> PoolView {
        PoolView {
            agg_num_running: running,
            agg_num_queued: queued,
            effective_mem_reserved: 0,
        }
    }

    #[test]
    fn no_slots_means_no_dequeue() {
        let cfg = PoolConfig {
            max_requests: 4,
            ..PoolConfig::default()
        };
        assert_eq!(max_to_dequeue(3, &view(4, 3), &cfg, 1), 0);
        assert_eq!(max_to_dequeue(3, &view(6, 3), &cfg, 1), 0);
    }

    #[test]
    fn proportional_share_of_cluster_queue() {
        let cfg = PoolConfig {
            max_requests: 10,
            ..PoolConfig::default()
        };
        // 2 of 10 queued here, 5 free slots: ceil(5 * 2/10) = 1.
        assert_eq!(max_to_dequeue(2, &view(5, 10), &cfg, 1), 1);
        // Entire cluster queue is local: take all free slots.
        assert_eq!(max_to_dequeue(10, &view(5, 10), &cfg, 1), 5);
    }

    #[test]
    fn stale_aggregate_below_local_queue_is_corrected() {
        let cfg = PoolConfig {
            max_requests: 10,
            ..PoolConfig::default()
        };
        // Gossip still reports fewer queued than we hold locally.
        assert_eq!(max_to_dequeue(4, &view(0, 1), &cfg, 1), 4);
    }

    #[test]
    fn unlimited_pools_drain_whole_queue() {
        let cfg = PoolConfig::default();
        assert_eq!(max_to_dequeue(7, &view(100, 50), &cfg, 1), 7);
    }

    #[test]
    fn at_least_one_when_any_capacity_exists() {
        let cfg = PoolConfig {
            max_requests: 100,
            ..PoolConfig::default()
        };
        // Tiny local share of a huge cluster queue still makes progress.
        assert_eq!(max_to_dequeue(1, &view(99, 10_000), &cfg, 1), 1);
    }
}
