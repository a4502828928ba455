//! # Per-pool resource limits.
//!
//! [`PoolConfig`] is what the pool-configuration service hands back for a
//! pool name. Every ceiling exists in two representations: a fixed value,
//! or a per-node multiple that scales with the live cluster size. All
//! decision code resolves a ceiling through exactly one derivation method
//! (`max_mem_for_pool`, `max_requests_for_pool`, `max_queued_for_pool`),
//! never by branching on the representation at the decision site.
//!
//! ## Conventions
//! - `-1` disables a limit, `0` means "none allowed" (for `max_requests`
//!   this disables the whole pool).
//! - `0` means "unset" for the query memory clamp bounds.
//! - A positive `*_multiple` takes precedence over the fixed value.
//! - Cluster size is clamped to 1 before scaling.

use std::time::Duration;

/// Resource limits and queue behavior for one pool.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolConfig {
    /// Maximum concurrently admitted queries. `-1` disables the count
    /// limit, `0` disables the pool.
    pub max_requests: i64,
    /// Maximum queued requests before new submissions are rejected.
    pub max_queued: i64,
    /// Cluster-wide aggregate memory ceiling in bytes. `-1` disables.
    pub max_mem_resources: i64,
    /// Lower clamp bound for a query's derived per-host memory. `0` unset.
    pub min_query_mem_limit: i64,
    /// Upper clamp bound for a query's derived per-host memory. `0` unset.
    pub max_query_mem_limit: i64,
    /// Whether the clamp bounds also apply to an explicit user-provided
    /// memory limit.
    pub clamp_mem_limit_query_option: bool,
    /// Per-pool override of the controller's default queue timeout.
    pub queue_timeout: Option<Duration>,
    /// Scalable variant of `max_requests`: queries per node.
    pub max_running_queries_multiple: f64,
    /// Scalable variant of `max_queued`: queued requests per node.
    pub max_queued_queries_multiple: f64,
    /// Scalable variant of `max_mem_resources`: bytes per node.
    pub max_memory_multiple: i64,
}

impl Default for PoolConfig {
    /// Unlimited concurrency and memory, a 200-deep queue, clamping on.
    fn default() -> Self {
        Self {
            max_requests: -1,
            max_queued: 200,
            max_mem_resources: -1,
            min_query_mem_limit: 0,
            max_query_mem_limit: 0,
            clamp_mem_limit_query_option: true,
            queue_timeout: None,
            max_running_queries_multiple: 0.0,
            max_queued_queries_multiple: 0.0,
            max_memory_multiple: 0,
        }
    }
}

/// Scales a per-node multiple by the cluster size, flooring at one.
fn scale_count(multiple: f64, cluster_size: i64) -> i64 {
    ((multiple * cluster_size as f64).ceil() as i64).max(1)
}

impl PoolConfig {
    /// Effective aggregate memory ceiling for the given cluster size.
    pub fn max_mem_for_pool(&self, cluster_size: i64) -> i64 {
        if self.max_memory_multiple > 0 {
            return self.max_memory_multiple * cluster_size.max(1);
        }
        self.max_mem_resources
    }

    /// Effective concurrent-query ceiling for the given cluster size.
    pub fn max_requests_for_pool(&self, cluster_size: i64) -> i64 {
        if self.max_running_queries_multiple > 0.0 {
            return scale_count(self.max_running_queries_multiple, cluster_size.max(1));
        }
        self.max_requests
    }

    /// Effective queue-length ceiling for the given cluster size.
    pub fn max_queued_for_pool(&self, cluster_size: i64) -> i64 {
        if self.max_queued_queries_multiple > 0.0 {
            return scale_count(self.max_queued_queries_multiple, cluster_size.max(1));
        }
        self.max_queued
    }

    /// A pool with a zero request ceiling accepts nothing.
    pub fn disabled(&self, cluster_size: i64) -> bool {
        self.max_requests_for_pool(cluster_size) == 0
    }

    /// Whether the pool caps the number of running queries at all.
    pub fn limits_running_queries(&self, cluster_size: i64) -> bool {
        self.max_requests_for_pool(cluster_size) >= 0
    }

    /// Describes how the memory ceiling was derived, for reason strings.
    pub fn max_mem_description(&self, cluster_size: i64) -> String {
        if self.max_memory_multiple > 0 {
            return format!(
                "calculated as {} backends each with {}",
                cluster_size.max(1),
                display_bytes(self.max_memory_multiple)
            );
        }
        "configured statically".to_string()
    }

    /// Describes how the request ceiling was derived, for reason strings.
    pub fn max_requests_description(&self, cluster_size: i64) -> String {
        if self.max_running_queries_multiple > 0.0 {
            return format!(
                "calculated as {} backends each with {} queries",
                cluster_size.max(1),
                self.max_running_queries_multiple
            );
        }
        "configured statically".to_string()
    }

    /// Checks the config against the live cluster, returning a
    /// human-readable reason when invalid.
    ///
    /// `local_queued` is this coordinator's queue length for the pool; a
    /// zero request ceiling with requests already queued is a
    /// misconfiguration (the queue can never drain).
    pub fn validate_for_cluster(&self, cluster_size: i64, local_queued: i64) -> Result<(), String> {
        if self.max_running_queries_multiple < 0.0
            || self.max_queued_queries_multiple < 0.0
            || self.max_memory_multiple < 0
        {
            return Err("scalable pool limits must not be negative".to_string());
        }
        if self.max_queued_for_pool(cluster_size) < 0 {
            return Err(format!(
                "max queued requests must not be negative, but is {}",
                self.max_queued
            ));
        }
        if self.max_query_mem_limit != 0 && self.min_query_mem_limit > self.max_query_mem_limit {
            return Err(format!(
                "min query mem limit {} is greater than max query mem limit {}",
                display_bytes(self.min_query_mem_limit),
                display_bytes(self.max_query_mem_limit)
            ));
        }
        let max_mem = self.max_mem_for_pool(cluster_size);
        if max_mem >= 0 && max_mem < self.min_query_mem_limit {
            return Err(format!(
                "pool max mem resources {} ({}) is less than min query mem limit {}",
                display_bytes(max_mem),
                self.max_mem_description(cluster_size),
                display_bytes(self.min_query_mem_limit)
            ));
        }
        if self.max_requests_for_pool(cluster_size) == 0 && local_queued > 0 {
            return Err(format!(
                "requests limit is 0 but {} requests are queued",
                local_queued
            ));
        }
        Ok(())
    }

    /// Queue timeout for this pool, falling back to `default`.
    pub fn queue_timeout_or(&self, default: Duration) -> Duration {
        self.queue_timeout.unwrap_or(default)
    }
}

/// Formats a byte count the way it appears in reasons and logs
/// (binary units, two decimals).
pub(crate) fn display_bytes(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let sign = if bytes < 0 { "-" } else { "" };
    let abs = bytes.unsigned_abs() as f64;
    if abs >= GIB {
        format!("{sign}{:.2} GB", abs / GIB)
    } else if abs >= MIB {
        format!("{sign}{:.2} MB", abs / MIB)
    } else if abs >= KIB {
        format!("{sign}{:.2} KB", abs / KIB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: i64 = 1024 * 1024 * 1024;

    #[test]
    fn fixed_ceilings_ignore_cluster_size() {
        let cfg = PoolConfig {
            max_requests: 8,
            max_queued: 16,
            max_mem_resources: 4 * GIB,
            ..PoolConfig::default()
        };
        assert_eq!(cfg.max_requests_for_pool(1), 8);
        assert_eq!(cfg.max_requests_for_pool(100), 8);
        assert_eq!(cfg.max_queued_for_pool(50), 16);
        assert_eq!(cfg.max_mem_for_pool(50), 4 * GIB);
    }

    #[test]
    fn scalable_ceilings_track_cluster_size() {
        let cfg = PoolConfig {
            max_requests: 2,
            max_running_queries_multiple: 0.5,
            max_memory_multiple: GIB,
            ..PoolConfig::default()
        };
        // Multiple takes precedence over the fixed value.
        assert_eq!(cfg.max_requests_for_pool(10), 5);
        assert_eq!(cfg.max_mem_for_pool(10), 10 * GIB);
        // Floors at one query even on a tiny cluster.
        assert_eq!(cfg.max_requests_for_pool(1), 1);
    }

    #[test]
    fn cluster_size_zero_is_clamped() {
        let cfg = PoolConfig {
            max_running_queries_multiple: 2.0,
            max_memory_multiple: GIB,
            ..PoolConfig::default()
        };
        assert_eq!(cfg.max_requests_for_pool(0), 2);
        assert_eq!(cfg.max_mem_for_pool(0), GIB);
    }

    #[test]
    fn zero_max_requests_disables_pool() {
        let cfg = PoolConfig {
            max_requests: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.disabled(4));
        assert!(cfg.limits_running_queries(4));

        let unlimited = PoolConfig::default();
        assert!(!unlimited.disabled(4));
        assert!(!unlimited.limits_running_queries(4));
    }

    #[test]
    fn invalid_when_min_exceeds_max_limit() {
        let cfg = PoolConfig {
            min_query_mem_limit: 2 * GIB,
            max_query_mem_limit: GIB,
            ..PoolConfig::default()
        };
        let reason = cfg.validate_for_cluster(4, 0).unwrap_err();
        assert!(reason.contains("min query mem limit"));
    }

    #[test]
    fn invalid_when_pool_mem_below_min_limit() {
        let cfg = PoolConfig {
            max_mem_resources: GIB,
            min_query_mem_limit: 2 * GIB,
            ..PoolConfig::default()
        };
        assert!(cfg.validate_for_cluster(4, 0).is_err());
        // Unlimited pool memory never trips the bound.
        let cfg = PoolConfig {
            max_mem_resources: -1,
            min_query_mem_limit: 2 * GIB,
            ..PoolConfig::default()
        };
        assert!(cfg.validate_for_cluster(4, 0).is_ok());
    }

    #[test]
    fn invalid_when_disabled_with_queued_requests() {
        let cfg = PoolConfig {
            max_requests: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate_for_cluster(4, 0).is_ok());
        assert!(cfg.validate_for_cluster(4, 3).is_err());
    }

    #[test]
    fn display_bytes_units() {
        assert_eq!(display_bytes(512), "512 B");
        assert_eq!(display_bytes(2 * GIB), "2.00 GB");
        assert_eq!(display_bytes(-(GIB / 2)), "-512.00 MB");
    }
}
