//! Shared fixtures for the integration tests: a controller wired to
//! in-memory collaborators and request builders with sensible defaults.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use querygate::{
    AdmissionController, ControllerConfig, Executor, MemTracker, OutcomeCell, PoolConfig,
    QueryProfile, QueryRequest, StaticClusterView, StaticPoolResolver,
};

pub const GIB: i64 = 1024 * 1024 * 1024;

/// Mem tracker the tests drive by hand, standing in for the execution
/// engine's accounting.
#[derive(Default)]
pub struct TestMemTracker {
    reserved: Mutex<HashMap<String, i64>>,
}

impl TestMemTracker {
    pub fn set_pool_mem_reserved(&self, pool: &str, bytes: i64) {
        self.reserved
            .lock()
            .unwrap()
            .insert(pool.to_string(), bytes);
    }
}

impl MemTracker for TestMemTracker {
    fn pool_mem_reserved(&self, pool_name: &str) -> i64 {
        self.reserved
            .lock()
            .unwrap()
            .get(pool_name)
            .copied()
            .unwrap_or(0)
    }

    fn pool_mem_usage(&self, pool_name: &str) -> i64 {
        self.pool_mem_reserved(pool_name)
    }
}

pub struct TestCoordinator {
    pub controller: Arc<AdmissionController>,
    pub resolver: Arc<StaticPoolResolver>,
    pub cluster: Arc<StaticClusterView>,
    pub mem_tracker: Arc<TestMemTracker>,
    pub token: CancellationToken,
}

impl TestCoordinator {
    /// A running controller with one configured pool and a 10-node
    /// cluster view.
    pub fn start(coordinator_id: &str, pool_name: &str, pool_cfg: PoolConfig) -> Self {
        let resolver = Arc::new(StaticPoolResolver::default());
        resolver.set_pool(pool_name, pool_cfg);
        let cluster = Arc::new(StaticClusterView::new(10));
        let mem_tracker = Arc::new(TestMemTracker::default());
        let controller = AdmissionController::new(
            ControllerConfig::new(coordinator_id),
            resolver.clone(),
            cluster.clone(),
            mem_tracker.clone(),
            Vec::new(),
        );
        let token = CancellationToken::new();
        controller.run(token.clone());
        Self {
            controller,
            resolver,
            cluster,
            mem_tracker,
            token,
        }
    }
}

impl Drop for TestCoordinator {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Request with `hosts` executors of 100 GiB admission limit each.
pub fn request(
    query_id: &str,
    pool_name: &str,
    hosts: usize,
    per_host_mem_estimate: i64,
    largest_initial_reservation: i64,
) -> Arc<QueryRequest> {
    Arc::new(QueryRequest {
        query_id: query_id.to_string(),
        pool_name: pool_name.to_string(),
        executors: (0..hosts)
            .map(|i| Executor {
                id: format!("exec{i}:22000"),
                admit_mem_limit: 100 * GIB,
            })
            .collect(),
        per_host_mem_estimate,
        largest_initial_reservation,
        user_mem_limit: None,
        profile: Arc::new(QueryProfile::default()),
    })
}

pub fn outcome() -> Arc<OutcomeCell> {
    Arc::new(OutcomeCell::new())
}

/// Reads a numeric field from a pool's introspection JSON.
pub async fn pool_stat(controller: &AdmissionController, pool: &str, field: &str) -> i64 {
    let json = controller
        .pool_to_json(pool)
        .await
        .unwrap_or_else(|| panic!("pool {pool} has no stats"));
    json.get(field)
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| panic!("pool {pool} missing field {field}"))
}

/// Reads a counter from the pool's totals.
pub async fn pool_total(controller: &AdmissionController, pool: &str, counter: &str) -> u64 {
    let json = controller
        .pool_to_json(pool)
        .await
        .unwrap_or_else(|| panic!("pool {pool} has no stats"));
    json["totals"][counter]
        .as_u64()
        .unwrap_or_else(|| panic!("pool {pool} missing total {counter}"))
}
