//! # Cluster view seam.
//!
//! The admission controller never tracks membership itself; it asks a
//! [`ClusterView`] for the current executor count whenever it resolves
//! scalable pool limits. The per-host admission memory limits travel with
//! each request (its membership snapshot), so this trait stays minimal.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Read-only view of the live executor fleet.
pub trait ClusterView: Send + Sync {
    /// Number of live executor hosts. The controller clamps this to 1
    /// before resolving scalable configs.
    fn executor_count(&self) -> usize;
}

/// Fixed-size cluster view, settable at runtime.
///
/// Useful for embedders with externally managed membership and for tests.
#[derive(Debug, Default)]
pub struct StaticClusterView {
    executors: AtomicUsize,
}

impl StaticClusterView {
    pub fn new(executors: usize) -> Self {
        Self {
            executors: AtomicUsize::new(executors),
        }
    }

    /// Replaces the executor count.
    pub fn set_executor_count(&self, executors: usize) {
        self.executors.store(executors, Ordering::Release);
    }
}

impl ClusterView for StaticClusterView {
    fn executor_count(&self) -> usize {
        self.executors.load(Ordering::Acquire)
    }
}
