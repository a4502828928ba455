//! # The admission decision procedure.
//!
//! Pure functions over scalar snapshots of the accounting state. Nothing
//! in here mutates or locks; the controller copies what a decision needs
//! into a [`PoolView`] and passes the host maps by reference.
//!
//! Two entry points matter:
//! - [`reject_immediately`]: conditions no amount of waiting can fix;
//! - [`can_admit_request`]: whether the request fits right now.
//!
//! Everything returns a human-readable reason on the negative path; the
//! same string lands in the client error, the query profile, and the
//! introspection output. For [`reject_immediately`] the check order only
//! affects which reason is reported; the decision itself is the
//! disjunction.

use crate::pools::{display_bytes, HostMemMap, PoolConfig, PoolStats};
use crate::request::{MemoryRequirements, QueryRequest};

/// Scalar snapshot of one pool's aggregates, taken under the controller
/// lock.
#[derive(Clone, Debug, Default)]
pub(crate) struct PoolView {
    pub agg_num_running: i64,
    pub agg_num_queued: i64,
    pub effective_mem_reserved: i64,
}

impl From<&PoolStats> for PoolView {
    fn from(stats: &PoolStats) -> Self {
        Self {
            agg_num_running: stats.agg_num_running(),
            agg_num_queued: stats.agg_num_queued(),
            effective_mem_reserved: stats.effective_mem_reserved(),
        }
    }
}

/// The reserved/admitted host maps, borrowed together.
#[derive(Clone, Copy)]
pub(crate) struct HostMemBands<'a> {
    pub reserved: &'a HostMemMap,
    pub admitted: &'a HostMemMap,
}

/// Whether the enforced per-host limit leaves room for the query's
/// largest initial reservation.
///
/// On failure the reason names which knob caused the shortfall: the pool
/// max limit, a user limit with no pool minimum, a user limit with a pool
/// minimum that is itself too low, or a user limit that the pool minimum
/// would have raised if clamping were enabled.
pub(crate) fn can_accommodate_initial_reservation(
    request: &QueryRequest,
    cfg: &PoolConfig,
    mem: &MemoryRequirements,
) -> Result<(), String> {
    if mem.is_unlimited() {
        return Ok(());
    }
    let needed = request.largest_initial_reservation;
    let limit = mem.per_backend_mem_limit;
    if limit >= needed {
        return Ok(());
    }

    let user_limit = request.effective_user_limit();
    let reason = if user_limit.is_none()
        || (cfg.clamp_mem_limit_query_option
            && cfg.max_query_mem_limit > 0
            && cfg.max_query_mem_limit < needed)
    {
        format!(
            "the pool max query mem limit {} is too low for the required initial reservation \
             {}; the query needs a per-host memory limit of at least {}",
            display_bytes(cfg.max_query_mem_limit),
            display_bytes(needed),
            display_bytes(needed)
        )
    } else if cfg.min_query_mem_limit == 0 && cfg.max_query_mem_limit == 0 {
        format!(
            "the query mem limit {} is below the required initial reservation {} and the pool \
             sets no min query mem limit to raise it",
            display_bytes(limit),
            display_bytes(needed)
        )
    } else if !cfg.clamp_mem_limit_query_option && cfg.min_query_mem_limit >= needed {
        format!(
            "the query mem limit {} is below the required initial reservation {}; the pool min \
             query mem limit {} would accommodate it, but clamping of the mem limit query \
             option is disabled",
            display_bytes(limit),
            display_bytes(needed),
            display_bytes(cfg.min_query_mem_limit)
        )
    } else {
        format!(
            "the query mem limit {} is below the required initial reservation {} and the pool \
             min query mem limit {} is also too low",
            display_bytes(limit),
            display_bytes(needed),
            display_bytes(cfg.min_query_mem_limit)
        )
    };
    Err(reason)
}

/// Whether the pool aggregate and every participating host can take the
/// request's memory.
pub(crate) fn has_available_mem_resources(
    request: &QueryRequest,
    mem: &MemoryRequirements,
    cfg: &PoolConfig,
    pool: &PoolView,
    hosts: HostMemBands<'_>,
    cluster_size: i64,
) -> Result<(), String> {
    let pool_max_mem = cfg.max_mem_for_pool(cluster_size);
    let cluster_mem_needed = mem.cluster_mem_to_admit(request);
    if pool_max_mem >= 0 && pool.effective_mem_reserved + cluster_mem_needed > pool_max_mem {
        return Err(format!(
            "not enough aggregate memory available in pool {} with max mem resources {} ({}); \
             needed {} but only {} was available",
            request.pool_name,
            display_bytes(pool_max_mem),
            cfg.max_mem_description(cluster_size),
            display_bytes(cluster_mem_needed),
            display_bytes((pool_max_mem - pool.effective_mem_reserved).max(0)),
        ));
    }

    for executor in &request.executors {
        let in_use = hosts
            .reserved
            .get(&executor.id)
            .max(hosts.admitted.get(&executor.id));
        if in_use + mem.per_backend_mem_to_admit > executor.admit_mem_limit {
            return Err(format!(
                "not enough memory available on host {}; needed {} but only {} out of {} was \
                 available",
                executor.id,
                display_bytes(mem.per_backend_mem_to_admit),
                display_bytes((executor.admit_mem_limit - in_use).max(0)),
                display_bytes(executor.admit_mem_limit),
            ));
        }
    }
    Ok(())
}

/// Whether the request can be admitted right now.
///
/// `admit_from_queue` marks evaluation of the queue head by the dequeue
/// worker; a fresh submission additionally requires an empty queue so it
/// cannot jump over requests already waiting.
pub(crate) fn can_admit_request(
    request: &QueryRequest,
    mem: &MemoryRequirements,
    cfg: &PoolConfig,
    pool: &PoolView,
    hosts: HostMemBands<'_>,
    cluster_size: i64,
    admit_from_queue: bool,
    local_queued: i64,
) -> Result<(), String> {
    cfg.validate_for_cluster(cluster_size, local_queued)
        .map_err(|reason| format!("pool config is invalid: {reason}"))?;

    if cfg.limits_running_queries(cluster_size) {
        let max_requests = cfg.max_requests_for_pool(cluster_size);
        if pool.agg_num_running >= max_requests {
            return Err(format!(
                "number of running queries {} is at or over limit {} ({})",
                pool.agg_num_running,
                max_requests,
                cfg.max_requests_description(cluster_size),
            ));
        }
    }

    if !admit_from_queue && pool.agg_num_queued > 0 {
        return Err(format!(
            "queue is not empty (size {}); queued queries are executed first",
            pool.agg_num_queued
        ));
    }

    has_available_mem_resources(request, mem, cfg, pool, hosts, cluster_size)
}

/// Conditions that reject the request without queueing. Returns the
/// reason, or `None` when the request may be admitted or queued.
pub(crate) fn reject_immediately(
    request: &QueryRequest,
    mem: &MemoryRequirements,
    cfg: &PoolConfig,
    pool: &PoolView,
    cluster_size: i64,
    local_queued: i64,
) -> Option<String> {
    if cfg.disabled(cluster_size) {
        return Some("disabled by requests limit set to 0".to_string());
    }
    if let Err(reason) = cfg.validate_for_cluster(cluster_size, local_queued) {
        return Some(format!("pool config is invalid: {reason}"));
    }
    let pool_max_mem = cfg.max_mem_for_pool(cluster_size);
    let cluster_mem_needed = mem.cluster_mem_to_admit(request);
    if pool_max_mem >= 0 && cluster_mem_needed > pool_max_mem {
        return Some(format!(
            "request memory needed {} is greater than pool max mem resources {} ({})",
            display_bytes(cluster_mem_needed),
            display_bytes(pool_max_mem),
            cfg.max_mem_description(cluster_size),
        ));
    }
    if let Err(reason) = can_accommodate_initial_reservation(request, cfg, mem) {
        return Some(reason);
    }
    let max_queued = cfg.max_queued_for_pool(cluster_size);
    if pool.agg_num_queued >= max_queued {
        return Some(format!(
            "queue full, limit={}, num_queued={}",
            max_queued, pool.agg_num_queued
        ));
    }
    if request.executors.is_empty() {
        return Some("no executors are available to run the query".to_string());
    }
    None
}
