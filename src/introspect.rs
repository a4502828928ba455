//! # Introspection views for debug endpoints.
//!
//! JSON renditions of the controller's state, meant for an operator-facing
//! web UI or CLI: per-pool config, derived runtime limits for the current
//! cluster size, the three accounting bands, the remote-stats map, the
//! peak-memory histogram, wait-time statistics, queued requests with their
//! reasons, and the per-host memory maps.
//!
//! Also carries the informational-stats reset entry points, so operators
//! can zero the totals and histograms without restarting.

use serde_json::{json, Map, Value};

use crate::controller::core::{AdmissionController, ControllerState};
use crate::pools::{PoolConfig, PoolStats};

impl AdmissionController {
    /// JSON snapshot of one pool, or `None` if the pool has never seen a
    /// submission or a gossip record.
    pub async fn pool_to_json(&self, pool_name: &str) -> Option<Value> {
        let state = self.state.lock().await;
        self.pool_json_locked(&state, pool_name)
    }

    /// JSON snapshots of every known pool.
    pub async fn all_pools_to_json(&self) -> Value {
        let state = self.state.lock().await;
        let mut pool_names: Vec<&String> = state.pools.keys().collect();
        pool_names.sort();
        let pools: Vec<Value> = pool_names
            .iter()
            .filter_map(|name| self.pool_json_locked(&state, name.as_str()))
            .collect();
        json!({ "resource_pools": pools })
    }

    /// Per-host `{ mem_reserved, mem_admitted }`, for the backends debug
    /// page.
    pub async fn host_mem_to_json(&self) -> Value {
        let state = self.state.lock().await;
        let mut hosts = Map::new();
        for (host, reserved) in state.host_mem_reserved.iter() {
            hosts.insert(
                host.to_string(),
                json!({ "mem_reserved": reserved, "mem_admitted": state.host_mem_admitted.get(host) }),
            );
        }
        for (host, admitted) in state.host_mem_admitted.iter() {
            hosts
                .entry(host.to_string())
                .or_insert_with(|| json!({ "mem_reserved": 0, "mem_admitted": admitted }));
        }
        Value::Object(hosts)
    }

    /// Zeroes one pool's totals, histogram, and wait-time average.
    pub async fn reset_pool_informational_stats(&self, pool_name: &str) {
        let mut state = self.state.lock().await;
        if let Some(stats) = state.pools.get_mut(pool_name) {
            stats.reset_informational_stats();
        }
    }

    /// Zeroes informational stats across all pools.
    pub async fn reset_all_informational_stats(&self) {
        let mut state = self.state.lock().await;
        for stats in state.pools.values_mut() {
            stats.reset_informational_stats();
        }
    }

    fn pool_json_locked(&self, state: &ControllerState, pool_name: &str) -> Option<Value> {
        let stats = state.pools.get(pool_name)?;
        let cluster_size = self.cluster_size();

        let mut pool = Map::new();
        pool.insert("pool_name".into(), json!(pool_name));
        pool.insert("agg_num_running".into(), json!(stats.agg_num_running()));
        pool.insert("agg_num_queued".into(), json!(stats.agg_num_queued()));
        pool.insert("agg_mem_reserved".into(), json!(stats.agg_mem_reserved()));
        pool.insert(
            "local_mem_admitted".into(),
            json!(stats.local_mem_admitted()),
        );
        pool.insert(
            "local_stats".into(),
            serde_json::to_value(stats.local_stats()).unwrap_or(Value::Null),
        );
        pool.insert("remote_stats".into(), remote_stats_json(stats));
        pool.insert(
            "totals".into(),
            serde_json::to_value(stats.totals()).unwrap_or(Value::Null),
        );
        pool.insert("wait_time_ms_ema".into(), json!(stats.wait_time_ms_ema()));
        pool.insert(
            "peak_mem_histogram".into(),
            json!(stats.histogram_buckets()),
        );

        if let Some(cfg) = state.pool_configs.get(pool_name) {
            pool.insert("pool_config".into(), pool_config_json(cfg));
            pool.insert(
                "derived_config".into(),
                json!({
                    "max_requests": cfg.max_requests_for_pool(cluster_size),
                    "max_queued": cfg.max_queued_for_pool(cluster_size),
                    "max_mem_resources": cfg.max_mem_for_pool(cluster_size),
                    "cluster_size": cluster_size,
                }),
            );
        }

        let queued: Vec<Value> = state
            .queues
            .get(pool_name)
            .map(|queue| {
                queue
                    .iter()
                    .map(|node| {
                        let profile = node.request.profile.snapshot();
                        json!({
                            "query_id": node.request.query_id,
                            "wait_time_ms": node.enqueued_at.elapsed().as_millis() as u64,
                            "initial_queue_reason": profile.initial_queue_reason,
                            "last_queue_reason": profile.last_queue_reason,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        pool.insert("queued_queries".into(), Value::Array(queued));

        if let Some(warning) = self.staleness_detail_locked(state, "") {
            pool.insert("staleness_warning".into(), json!(warning));
        }

        Some(Value::Object(pool))
    }
}

fn remote_stats_json(stats: &PoolStats) -> Value {
    let mut remotes = Map::new();
    for (coordinator, snapshot) in stats.remote_stats() {
        remotes.insert(
            coordinator.clone(),
            serde_json::to_value(snapshot).unwrap_or(Value::Null),
        );
    }
    Value::Object(remotes)
}

fn pool_config_json(cfg: &PoolConfig) -> Value {
    json!({
        "max_requests": cfg.max_requests,
        "max_queued": cfg.max_queued,
        "max_mem_resources": cfg.max_mem_resources,
        "min_query_mem_limit": cfg.min_query_mem_limit,
        "max_query_mem_limit": cfg.max_query_mem_limit,
        "clamp_mem_limit_query_option": cfg.clamp_mem_limit_query_option,
        "queue_timeout_ms": cfg.queue_timeout.map(|t| t.as_millis() as u64),
        "max_running_queries_multiple": cfg.max_running_queries_multiple,
        "max_queued_queries_multiple": cfg.max_queued_queries_multiple,
        "max_memory_multiple": cfg.max_memory_multiple,
    })
}
