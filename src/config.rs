//! # Controller-level configuration.
//!
//! [`ControllerConfig`] carries the per-coordinator settings: the identity
//! used in gossip topic keys, the default queue timeout, the statestore
//! heartbeat interval (which drives the staleness warning threshold), the
//! physical memory of a backend (upper cap for any derived per-host limit),
//! and the event bus capacity.
//!
//! Per-pool limits live in [`PoolConfig`](crate::PoolConfig) and are
//! resolved through the [`PoolResolver`](crate::PoolResolver) collaborator;
//! this struct only holds what is global to one coordinator process.

use std::time::Duration;

/// Global configuration for one coordinator's admission controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Identity of this coordinator in gossip topic keys
    /// (`<pool>!<coordinator_id>`). Must be unique across the fleet,
    /// conventionally `host:port`.
    pub coordinator_id: String,
    /// Queue timeout applied when the pool config does not override it.
    pub default_queue_timeout: Duration,
    /// Expected statestore delivery interval. Admission data older than
    /// twice this interval is reported as stale.
    pub statestore_heartbeat: Duration,
    /// Physical memory of a single backend. Derived per-host memory limits
    /// are capped here; user-provided or planner-produced values can each
    /// be unreasonable.
    pub backend_physical_mem: i64,
    /// Capacity of the admission event bus channel.
    pub bus_capacity: usize,
}

impl ControllerConfig {
    /// Creates a config for the given coordinator id with default knobs.
    pub fn new(coordinator_id: impl Into<String>) -> Self {
        Self {
            coordinator_id: coordinator_id.into(),
            ..Self::default()
        }
    }
}

impl Default for ControllerConfig {
    /// Provides a default configuration:
    /// - `coordinator_id = "localhost:21000"`
    /// - `default_queue_timeout = 60s`
    /// - `statestore_heartbeat = 1s`
    /// - `backend_physical_mem = i64::MAX` (no cap)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            coordinator_id: "localhost:21000".to_string(),
            default_queue_timeout: Duration::from_secs(60),
            statestore_heartbeat: Duration::from_secs(1),
            backend_physical_mem: i64::MAX,
            bus_capacity: 1024,
        }
    }
}
