//! # Error types surfaced by the admission engine.
//!
//! [`AdmissionError`] covers every way an admission attempt can terminate
//! without the query running. Rejections and timeouts are ordinary outcomes
//! of resource arbitration, not faults: each carries the human-readable
//! reason that is also recorded on the query profile, so operators see the
//! same explanation in the client error and on the debug endpoints.
//!
//! Invalid pool configuration is deliberately *not* a separate variant. It
//! surfaces as a [`AdmissionError::Rejected`] reason, which lets an operator
//! fix the pool config without restarting any coordinator.

use thiserror::Error;

/// Terminal failures of a single admission attempt.
///
/// None of these are retried internally; the caller decides whether to
/// resubmit.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// The controller decided against running this request, permanently.
    #[error("rejected query from pool {pool}: {reason}")]
    Rejected {
        /// Pool the request was submitted to.
        pool: String,
        /// Why the request cannot run (queue full, over memory, invalid
        /// config, ...).
        reason: String,
    },

    /// The request waited in the pool queue past its timeout.
    #[error("admission for query exceeded timeout {timeout_ms}ms in pool {pool}. {reason}")]
    TimedOut {
        /// Pool the request was queued in.
        pool: String,
        /// Configured queue timeout that elapsed.
        timeout_ms: u64,
        /// Most recent reason the request could not be admitted.
        reason: String,
    },

    /// The caller (or another holder of the outcome handle) cancelled the
    /// attempt while it was queued.
    ///
    /// Not an error in the traditional sense; it signals intentional
    /// termination.
    #[error("admission cancelled")]
    Cancelled,

    /// The pool-configuration service could not resolve the target pool.
    #[error("could not resolve config for pool {pool}: {reason}")]
    PoolResolution {
        /// Pool name that failed to resolve.
        pool: String,
        /// Resolver-provided explanation.
        reason: String,
    },
}

impl AdmissionError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AdmissionError::Rejected { .. } => "admission_rejected",
            AdmissionError::TimedOut { .. } => "admission_timed_out",
            AdmissionError::Cancelled => "admission_cancelled",
            AdmissionError::PoolResolution { .. } => "admission_pool_resolution",
        }
    }

    /// True for terminal decisions against the request (rejection/timeout).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AdmissionError::Rejected { .. } | AdmissionError::TimedOut { .. }
        )
    }
}
