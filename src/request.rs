//! # Admission requests and their derived memory requirements.
//!
//! A [`QueryRequest`] is the immutable input to one admission attempt: the
//! planner's per-host estimate, the largest initial reservation the query
//! cannot run below, an optional user memory limit, and the executor hosts
//! the query will touch (each carried with its admission memory limit from
//! the cluster-membership snapshot).
//!
//! [`MemoryRequirements::derive`] turns those inputs plus the pool config
//! into the two values admission actually works with:
//! - `per_backend_mem_to_admit`: charged against pool and host accounting;
//! - `per_backend_mem_limit`: enforced at execution (`-1` = unlimited).
//!
//! The derivation is deterministic and is re-run every time a queued
//! request is re-evaluated, so pool config changes take effect while a
//! request waits.

use std::sync::Arc;

use crate::pools::PoolConfig;
use crate::profile::QueryProfile;

/// Fraction of a memory limit that can be used for buffer reservations.
const RESERVATION_MEM_FRACTION: f64 = 0.8;
/// Memory that must stay available beyond the buffer reservation.
const RESERVATION_MEM_MIN_REMAINING: i64 = 75 * 1024 * 1024;

/// Smallest per-host memory limit under which `reservation` bytes of buffer
/// reservation still fit.
pub(crate) fn min_mem_limit_for_reservation(reservation: i64) -> i64 {
    if reservation <= 0 {
        return 0;
    }
    let from_fraction = (reservation as f64 / RESERVATION_MEM_FRACTION).ceil() as i64;
    from_fraction.max(reservation + RESERVATION_MEM_MIN_REMAINING)
}

/// One executor host a query will run fragments on, as seen by the
/// cluster-membership snapshot taken at submission.
#[derive(Clone, Debug)]
pub struct Executor {
    /// Host identity, conventionally `host:port`. Matches the identity
    /// used in gossip topic keys.
    pub id: String,
    /// The most memory this process allows admission to reserve on it.
    pub admit_mem_limit: i64,
}

/// Input to one admission attempt. Immutable for its lifetime.
#[derive(Clone, Debug)]
pub struct QueryRequest {
    /// Unique query id, used for release bookkeeping and logging.
    pub query_id: String,
    /// Target resource pool.
    pub pool_name: String,
    /// Executor hosts the query will touch, with their admission limits.
    pub executors: Vec<Executor>,
    /// Planner's per-host memory estimate.
    pub per_host_mem_estimate: i64,
    /// Smallest per-host working set the query cannot run below.
    pub largest_initial_reservation: i64,
    /// Explicit per-host memory limit from the user, if any.
    pub user_mem_limit: Option<i64>,
    /// Profile receiving admission annotations for this query.
    pub profile: Arc<QueryProfile>,
}

impl QueryRequest {
    /// Number of participating backends.
    pub fn host_count(&self) -> i64 {
        self.executors.len() as i64
    }

    /// The user limit, when set to a positive value.
    pub(crate) fn effective_user_limit(&self) -> Option<i64> {
        self.user_mem_limit.filter(|limit| *limit > 0)
    }
}

/// Memory values derived from a request and the pool config it targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRequirements {
    /// Per-host memory charged by admission accounting.
    pub per_backend_mem_to_admit: i64,
    /// Per-host memory limit enforced at execution, or
    /// [`MemoryRequirements::UNLIMITED`].
    pub per_backend_mem_limit: i64,
}

impl MemoryRequirements {
    /// Sentinel for "no enforced limit".
    pub const UNLIMITED: i64 = -1;

    /// Derives admission memory for `request` under `cfg`.
    ///
    /// Rule, in order:
    /// 1. Start from the user limit if set; otherwise from the planner
    ///    estimate, raised to the reservation-derived minimum when the
    ///    pool sets either clamp bound.
    /// 2. Clamp to `[min_query_mem_limit, max_query_mem_limit]` unless an
    ///    explicit user limit is exempt from clamping.
    /// 3. Cap at the backend's physical memory.
    ///
    /// With no clamp bounds and no user limit the estimate is used for
    /// admission only and execution runs unlimited (legacy behavior).
    pub fn derive(request: &QueryRequest, cfg: &PoolConfig, backend_physical_mem: i64) -> Self {
        let legacy_no_bounds = cfg.min_query_mem_limit == 0 && cfg.max_query_mem_limit == 0;

        let user_limit = request.effective_user_limit();
        let mut to_admit = match user_limit {
            Some(limit) => limit,
            None => {
                let mut estimate = request.per_host_mem_estimate;
                if !legacy_no_bounds {
                    estimate = estimate
                        .max(min_mem_limit_for_reservation(request.largest_initial_reservation));
                }
                estimate
            }
        };

        if user_limit.is_none() || cfg.clamp_mem_limit_query_option {
            if cfg.min_query_mem_limit > 0 {
                to_admit = to_admit.max(cfg.min_query_mem_limit);
            }
            if cfg.max_query_mem_limit > 0 {
                to_admit = to_admit.min(cfg.max_query_mem_limit);
            }
        }

        to_admit = to_admit.min(backend_physical_mem);

        let mem_limit = if legacy_no_bounds && user_limit.is_none() {
            Self::UNLIMITED
        } else {
            to_admit
        };

        Self {
            per_backend_mem_to_admit: to_admit,
            per_backend_mem_limit: mem_limit,
        }
    }

    /// Aggregate memory this request admits across all its hosts.
    pub fn cluster_mem_to_admit(&self, request: &QueryRequest) -> i64 {
        self.per_backend_mem_to_admit * request.host_count()
    }

    /// Whether execution runs without an enforced limit.
    pub fn is_unlimited(&self) -> bool {
        self.per_backend_mem_limit == Self::UNLIMITED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: i64 = 1024 * 1024;
    const GIB: i64 = 1024 * MIB;

    fn request(estimate: i64, reservation: i64, user_limit: Option<i64>) -> QueryRequest {
        QueryRequest {
            query_id: "q1".to_string(),
            pool_name: "default".to_string(),
            executors: vec![
                Executor {
                    id: "host1:22000".to_string(),
                    admit_mem_limit: 100 * GIB,
                },
                Executor {
                    id: "host2:22000".to_string(),
                    admit_mem_limit: 100 * GIB,
                },
            ],
            per_host_mem_estimate: estimate,
            largest_initial_reservation: reservation,
            user_mem_limit: user_limit,
            profile: Arc::new(QueryProfile::default()),
        }
    }

    #[test]
    fn legacy_path_admits_estimate_without_limit() {
        let cfg = PoolConfig::default();
        let reqs = MemoryRequirements::derive(&request(2 * GIB, GIB, None), &cfg, i64::MAX);
        assert_eq!(reqs.per_backend_mem_to_admit, 2 * GIB);
        assert!(reqs.is_unlimited());
    }

    #[test]
    fn user_limit_is_admitted_and_enforced() {
        let cfg = PoolConfig::default();
        let reqs = MemoryRequirements::derive(&request(2 * GIB, 0, Some(3 * GIB)), &cfg, i64::MAX);
        assert_eq!(reqs.per_backend_mem_to_admit, 3 * GIB);
        assert_eq!(reqs.per_backend_mem_limit, 3 * GIB);
    }

    #[test]
    fn estimate_raised_to_reservation_minimum_with_bounds() {
        let cfg = PoolConfig {
            max_query_mem_limit: 100 * GIB,
            ..PoolConfig::default()
        };
        let reqs = MemoryRequirements::derive(&request(100 * MIB, GIB, None), &cfg, i64::MAX);
        let floor = min_mem_limit_for_reservation(GIB);
        assert_eq!(reqs.per_backend_mem_to_admit, floor);
        assert_eq!(reqs.per_backend_mem_limit, floor);
        assert!(floor >= GIB + 75 * MIB);
    }

    #[test]
    fn clamping_applies_to_user_limit_when_configured() {
        let cfg = PoolConfig {
            min_query_mem_limit: 2 * GIB,
            max_query_mem_limit: 4 * GIB,
            clamp_mem_limit_query_option: true,
            ..PoolConfig::default()
        };
        let low = MemoryRequirements::derive(&request(0, 0, Some(GIB)), &cfg, i64::MAX);
        assert_eq!(low.per_backend_mem_to_admit, 2 * GIB);
        let high = MemoryRequirements::derive(&request(0, 0, Some(8 * GIB)), &cfg, i64::MAX);
        assert_eq!(high.per_backend_mem_to_admit, 4 * GIB);
    }

    #[test]
    fn unclamped_user_limit_is_respected() {
        let cfg = PoolConfig {
            min_query_mem_limit: 2 * GIB,
            max_query_mem_limit: 4 * GIB,
            clamp_mem_limit_query_option: false,
            ..PoolConfig::default()
        };
        let reqs = MemoryRequirements::derive(&request(0, 0, Some(GIB)), &cfg, i64::MAX);
        assert_eq!(reqs.per_backend_mem_to_admit, GIB);
        assert_eq!(reqs.per_backend_mem_limit, GIB);
    }

    #[test]
    fn capped_at_physical_memory() {
        let cfg = PoolConfig::default();
        let reqs =
            MemoryRequirements::derive(&request(0, 0, Some(500 * GIB)), &cfg, 128 * GIB);
        assert_eq!(reqs.per_backend_mem_to_admit, 128 * GIB);
    }

    #[test]
    fn cluster_mem_scales_with_hosts() {
        let cfg = PoolConfig::default();
        let req = request(50 * GIB, GIB, None);
        let reqs = MemoryRequirements::derive(&req, &cfg, i64::MAX);
        assert_eq!(reqs.cluster_mem_to_admit(&req), 100 * GIB);
    }
}
