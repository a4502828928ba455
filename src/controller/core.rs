//! # The admission controller.
//!
//! [`AdmissionController`] arbitrates query admission for one coordinator:
//! admit immediately, park in the pool queue, or reject. All mutable state
//! sits behind a single mutex; decisions are short and touch several pools
//! and hosts at once, so finer locking would buy multi-lock ordering for
//! no real gain.
//!
//! ## Architecture
//! ```text
//! submit_for_admission() ──► reject? admit? ──► queue ──► wait(outcome)
//!          │                     │                ▲           │
//!          │                  admit_query()       │ Notify    │ timeout /
//!          │                     │                │           │ cancel
//!          ▼                     ▼                │           ▼
//!   release_query() ──────► pool stats, host maps ┴── dequeue worker
//!                                ▲
//!   process_topic_delta() ───────┘  (gossip reconciliation, gossip::update)
//! ```
//!
//! ## Rules
//! - The lock is never held across an await; the only caller suspension
//!   point is the outcome wait.
//! - Outcome races (scheduler vs. canceller vs. timeout) resolve through
//!   the first-write-wins [`OutcomeCell`]; whoever loses observes the
//!   winner and adjusts.
//! - Every admit is matched by exactly one release; the controller keeps
//!   the admitted values itself so release reverses precisely what admit
//!   charged, even if the pool config changed in between.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterView;
use crate::config::ControllerConfig;
use crate::controller::decision::{self, HostMemBands, PoolView};
use crate::controller::queue::{QueueNode, RequestQueue};
use crate::error::AdmissionError;
use crate::events::{Bus, Event, EventKind};
use crate::memory::MemTracker;
use crate::outcome::{AdmissionOutcome, OutcomeCell};
use crate::pools::{HostMemMap, PoolConfig, PoolStats};
use crate::profile::AdmissionResult;
use crate::request::{MemoryRequirements, QueryRequest};
use crate::resolver::PoolResolver;
use crate::subscribers::{Subscribe, SubscriberSet};

/// What a successful admission hands back to the execution frontend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionGrant {
    /// Per-host memory charged by admission.
    pub per_backend_mem_to_admit: i64,
    /// Per-host memory limit to enforce at execution
    /// ([`MemoryRequirements::UNLIMITED`] for none).
    pub per_backend_mem_limit: i64,
    /// Whether the request waited in the queue first.
    pub was_queued: bool,
}

/// Accounting for one admitted, still-running query.
#[derive(Clone, Debug)]
pub(crate) struct AdmittedQuery {
    pub pool_name: String,
    pub per_backend_mem_to_admit: i64,
    pub per_backend_mem_limit: i64,
    pub executor_ids: Vec<String>,
    pub was_queued: bool,
}

/// Everything the controller lock protects.
#[derive(Default)]
pub(crate) struct ControllerState {
    pub pools: HashMap<String, PoolStats>,
    pub queues: HashMap<String, RequestQueue>,
    /// Last resolved config per pool, so the dequeue worker never calls
    /// back into the resolver.
    pub pool_configs: HashMap<String, PoolConfig>,
    /// Per-host memory reserved, rebuilt from gossip on every tick.
    pub host_mem_reserved: HostMemMap,
    /// Per-host memory admitted locally, adjusted eagerly.
    pub host_mem_admitted: HostMemMap,
    /// Pools whose local stats changed since the last publish.
    pub dirty_pools: HashSet<String>,
    /// Queries admitted by this coordinator and not yet released.
    pub running: HashMap<String, AdmittedQuery>,
    /// Monotonic time of the last processed statestore delivery.
    pub last_topic_update: Option<Instant>,
}

impl ControllerState {
    pub fn ensure_pool(&mut self, pool_name: &str) {
        if !self.pools.contains_key(pool_name) {
            self.pools
                .insert(pool_name.to_string(), PoolStats::new(pool_name));
        }
    }

    pub fn pool_stats(&mut self, pool_name: &str) -> &mut PoolStats {
        self.pools
            .entry(pool_name.to_string())
            .or_insert_with(|| PoolStats::new(pool_name))
    }

    pub fn pool_view(&self, pool_name: &str) -> PoolView {
        self.pools
            .get(pool_name)
            .map(PoolView::from)
            .unwrap_or_default()
    }

    pub fn queue_mut(&mut self, pool_name: &str) -> &mut RequestQueue {
        self.queues.entry(pool_name.to_string()).or_default()
    }

    pub fn queue_len(&self, pool_name: &str) -> i64 {
        self.queues
            .get(pool_name)
            .map(|queue| queue.len() as i64)
            .unwrap_or(0)
    }

    /// Removes `node` from its pool queue if still there.
    pub fn remove_queued(&mut self, pool_name: &str, node: &Arc<QueueNode>) -> bool {
        self.queues
            .get_mut(pool_name)
            .map(|queue| queue.remove(node))
            .unwrap_or(false)
    }

    /// Grant for a query this coordinator admitted.
    pub fn grant_for(&self, query_id: &str) -> Option<AdmissionGrant> {
        self.running.get(query_id).map(|admitted| AdmissionGrant {
            per_backend_mem_to_admit: admitted.per_backend_mem_to_admit,
            per_backend_mem_limit: admitted.per_backend_mem_limit,
            was_queued: admitted.was_queued,
        })
    }
}

/// Admission controller for one coordinator process.
pub struct AdmissionController {
    pub(crate) cfg: ControllerConfig,
    resolver: Arc<dyn PoolResolver>,
    cluster: Arc<dyn ClusterView>,
    pub(crate) mem_tracker: Arc<dyn MemTracker>,
    pub(crate) bus: Bus,
    /// Taken by the first `run()` call.
    subscribers: RwLock<Option<Vec<Arc<dyn Subscribe>>>>,
    pub(crate) state: Mutex<ControllerState>,
    /// Wakes the dequeue worker on any state change that may allow
    /// admission.
    pub(crate) dequeue_notify: Notify,
}

impl AdmissionController {
    /// Creates a controller wired to its collaborators. Call
    /// [`run`](Self::run) to start the dequeue worker and the subscriber
    /// fan-out.
    pub fn new(
        cfg: ControllerConfig,
        resolver: Arc<dyn PoolResolver>,
        cluster: Arc<dyn ClusterView>,
        mem_tracker: Arc<dyn MemTracker>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity);
        Arc::new(Self {
            cfg,
            resolver,
            cluster,
            mem_tracker,
            bus,
            subscribers: RwLock::new(Some(subscribers)),
            state: Mutex::new(ControllerState::default()),
            dequeue_notify: Notify::new(),
        })
    }

    /// The controller's event bus; subscribe for admission lifecycle
    /// events.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// Starts the background workers: the dequeue loop and the
    /// subscriber fan-out. Cancelling `token` retires both.
    pub fn run(self: &Arc<Self>, token: CancellationToken) {
        let controller = Arc::clone(self);
        let loop_token = token.clone();
        tokio::spawn(async move { controller.dequeue_loop(loop_token).await });

        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.subscriber_listener(token).await });
    }

    /// Forwards bus events into the subscriber set until shutdown.
    async fn subscriber_listener(self: Arc<Self>, token: CancellationToken) {
        let Some(subscribers) = self.subscribers.write().await.take() else {
            return;
        };
        let set = SubscriberSet::new(subscribers, self.bus.clone());
        let mut rx = self.bus.subscribe();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(ev) => set.emit_arc(Arc::new(ev)),
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
        set.shutdown().await;
    }

    /// Live executor count, clamped so scalable configs stay meaningful
    /// on an empty membership view.
    pub(crate) fn cluster_size(&self) -> i64 {
        (self.cluster.executor_count().max(1)) as i64
    }

    /// Submits `request` for admission.
    ///
    /// Returns immediately on rejection or immediate admission; otherwise
    /// parks the request in its pool queue and waits until the dequeue
    /// worker admits it, the queue timeout elapses, or someone resolves
    /// `outcome` to cancelled. Keep a clone of `outcome` to cancel from
    /// outside; if cancellation loses the race to admission the query is
    /// running and must be released normally.
    pub async fn submit_for_admission(
        &self,
        request: Arc<QueryRequest>,
        outcome: Arc<OutcomeCell>,
    ) -> Result<AdmissionGrant, AdmissionError> {
        let pool_name = request.pool_name.clone();
        let pool_cfg =
            self.resolver
                .resolve(&pool_name)
                .map_err(|e| AdmissionError::PoolResolution {
                    pool: pool_name.clone(),
                    reason: e.to_string(),
                })?;
        let cluster_size = self.cluster_size();
        let mem = MemoryRequirements::derive(&request, &pool_cfg, self.cfg.backend_physical_mem);
        let queue_timeout = pool_cfg.queue_timeout_or(self.cfg.default_queue_timeout);

        let mut state = self.state.lock().await;
        state
            .pool_configs
            .insert(pool_name.clone(), pool_cfg.clone());
        state.ensure_pool(&pool_name);
        let local_queued = state.queue_len(&pool_name);
        let view = state.pool_view(&pool_name);

        if let Some(reason) =
            decision::reject_immediately(&request, &mem, &pool_cfg, &view, cluster_size, local_queued)
        {
            state.pool_stats(&pool_name).record_rejection();
            request.profile.set_admission_result(AdmissionResult::Rejected);
            tracing::info!(pool = %pool_name, query = %request.query_id, %reason, "rejected query");
            self.bus.publish(
                Event::now(EventKind::Rejected)
                    .with_pool(&pool_name)
                    .with_query(&request.query_id)
                    .with_reason(&reason),
            );
            return Err(AdmissionError::Rejected {
                pool: pool_name,
                reason,
            });
        }

        let verdict = decision::can_admit_request(
            &request,
            &mem,
            &pool_cfg,
            &view,
            HostMemBands {
                reserved: &state.host_mem_reserved,
                admitted: &state.host_mem_admitted,
            },
            cluster_size,
            false,
            local_queued,
        );

        let not_admitted_reason = match verdict {
            Ok(()) => {
                // Resolve the outcome before charging anything, in case a
                // canceller got in first.
                if outcome.set(AdmissionOutcome::Admitted) != AdmissionOutcome::Admitted {
                    return Err(AdmissionError::Cancelled);
                }
                self.admit_query(&mut state, &request, &mem, false);
                return Ok(AdmissionGrant {
                    per_backend_mem_to_admit: mem.per_backend_mem_to_admit,
                    per_backend_mem_limit: mem.per_backend_mem_limit,
                    was_queued: false,
                });
            }
            Err(reason) => reason,
        };

        // Park the request and wait for the dequeue worker.
        let node = QueueNode::new(Arc::clone(&request), Arc::clone(&outcome));
        state.queue_mut(&pool_name).push_back(Arc::clone(&node));
        state.pool_stats(&pool_name).queue();
        state.dirty_pools.insert(pool_name.clone());
        request.profile.set_initial_queue_reason(&not_admitted_reason);
        tracing::debug!(
            pool = %pool_name,
            query = %request.query_id,
            reason = %not_admitted_reason,
            "queued query"
        );
        self.bus.publish(
            Event::now(EventKind::Queued)
                .with_pool(&pool_name)
                .with_query(&request.query_id)
                .with_reason(&not_admitted_reason),
        );
        self.dequeue_notify.notify_one();
        drop(state);

        let waited = tokio::time::timeout(queue_timeout, outcome.wait()).await;
        let mut state = self.state.lock().await;
        // On timeout, racing against the dequeue worker: the first writer
        // wins and the loser follows the winner's outcome.
        let final_outcome = match waited {
            Ok(resolved) => resolved,
            Err(_elapsed) => outcome.set(AdmissionOutcome::RejectedOrTimedOut),
        };

        match final_outcome {
            AdmissionOutcome::Admitted => {
                let wait_time = node.enqueued_at.elapsed();
                state
                    .pool_stats(&pool_name)
                    .update_wait_time(wait_time.as_millis() as u64);
                request.profile.set_wait_time(wait_time);
                if let Some(warning) = self.staleness_detail_locked(&state, "") {
                    request.profile.set_staleness_warning(warning);
                }
                let grant = state.grant_for(&request.query_id).unwrap_or(AdmissionGrant {
                    per_backend_mem_to_admit: mem.per_backend_mem_to_admit,
                    per_backend_mem_limit: mem.per_backend_mem_limit,
                    was_queued: true,
                });
                Ok(grant)
            }
            AdmissionOutcome::Cancelled => {
                // The dequeue worker may have popped the node when it lost
                // the race; the stats decrement belongs here either way.
                state.remove_queued(&pool_name, &node);
                state.pool_stats(&pool_name).dequeue(false);
                state.dirty_pools.insert(pool_name.clone());
                request
                    .profile
                    .set_admission_result(AdmissionResult::CancelledInQueue);
                tracing::debug!(pool = %pool_name, query = %request.query_id, "cancelled in queue");
                self.bus.publish(
                    Event::now(EventKind::Cancelled)
                        .with_pool(&pool_name)
                        .with_query(&request.query_id),
                );
                Err(AdmissionError::Cancelled)
            }
            AdmissionOutcome::RejectedOrTimedOut => {
                state.remove_queued(&pool_name, &node);
                state.pool_stats(&pool_name).dequeue(true);
                state.dirty_pools.insert(pool_name.clone());
                let reason = request
                    .profile
                    .last_queue_reason()
                    .unwrap_or(not_admitted_reason);
                request.profile.set_admission_result(AdmissionResult::TimedOut);
                tracing::info!(
                    pool = %pool_name,
                    query = %request.query_id,
                    %reason,
                    "admission timed out"
                );
                self.bus.publish(
                    Event::now(EventKind::TimedOut)
                        .with_pool(&pool_name)
                        .with_query(&request.query_id)
                        .with_reason(&reason),
                );
                Err(AdmissionError::TimedOut {
                    pool: pool_name,
                    timeout_ms: queue_timeout.as_millis() as u64,
                    reason: format!("queued reason: {reason}"),
                })
            }
        }
    }

    /// Books an admission into the pool stats, the host map, and the
    /// running set, and annotates the profile. Lock held by the caller.
    pub(crate) fn admit_query(
        &self,
        state: &mut ControllerState,
        request: &Arc<QueryRequest>,
        mem: &MemoryRequirements,
        was_queued: bool,
    ) {
        let cluster_mem = mem.cluster_mem_to_admit(request);
        let pool_name = request.pool_name.clone();
        state.pool_stats(&pool_name).admit(cluster_mem);
        for executor in &request.executors {
            state
                .host_mem_admitted
                .add(&executor.id, mem.per_backend_mem_to_admit);
        }
        state.running.insert(
            request.query_id.clone(),
            AdmittedQuery {
                pool_name: pool_name.clone(),
                per_backend_mem_to_admit: mem.per_backend_mem_to_admit,
                per_backend_mem_limit: mem.per_backend_mem_limit,
                executor_ids: request.executors.iter().map(|e| e.id.clone()).collect(),
                was_queued,
            },
        );
        state.dirty_pools.insert(pool_name.clone());

        request.profile.set_admission_result(if was_queued {
            AdmissionResult::AdmitQueued
        } else {
            AdmissionResult::AdmitImmediately
        });
        request.profile.set_admitted_mem(cluster_mem);
        tracing::info!(
            pool = %pool_name,
            query = %request.query_id,
            mem = cluster_mem,
            was_queued,
            "admitted query"
        );
        self.bus.publish(
            Event::now(EventKind::Admitted)
                .with_pool(&pool_name)
                .with_query(&request.query_id)
                .with_mem(cluster_mem),
        );
        self.dequeue_notify.notify_one();
    }

    /// Returns an admitted query's resources when it terminates. Must be
    /// called exactly once for every successful
    /// [`submit_for_admission`](Self::submit_for_admission). Does not
    /// block on anything but the controller lock.
    pub async fn release_query(&self, request: &QueryRequest, peak_mem_consumption: i64) {
        let mut state = self.state.lock().await;
        let Some(admitted) = state.running.remove(&request.query_id) else {
            tracing::warn!(query = %request.query_id, "release for a query this coordinator never admitted");
            return;
        };
        let cluster_mem =
            admitted.per_backend_mem_to_admit * admitted.executor_ids.len() as i64;
        state
            .pool_stats(&admitted.pool_name)
            .release(cluster_mem, peak_mem_consumption);
        for host in &admitted.executor_ids {
            state
                .host_mem_admitted
                .add(host, -admitted.per_backend_mem_to_admit);
        }
        state.dirty_pools.insert(admitted.pool_name.clone());
        tracing::debug!(
            pool = %admitted.pool_name,
            query = %request.query_id,
            peak_mem = peak_mem_consumption,
            "released query"
        );
        self.bus.publish(
            Event::now(EventKind::Released)
                .with_pool(&admitted.pool_name)
                .with_query(&request.query_id)
                .with_mem(cluster_mem),
        );
        self.dequeue_notify.notify_one();
    }
}
