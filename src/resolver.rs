//! # Pool-configuration seam.
//!
//! Pool configs come from an external service (files, a control plane, a
//! JNI bridge); the controller only sees the [`PoolResolver`] trait. The
//! resolved config is cached per pool under the controller lock so the
//! dequeue worker never has to call back into the resolver.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::pools::PoolConfig;

/// Raised when a pool name cannot be resolved to a configuration.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ResolveError(pub String);

/// Maps a pool name to its current configuration.
pub trait PoolResolver: Send + Sync {
    /// Resolves `pool_name`. Called on every submission, so lookups should
    /// be cheap; the heavy lifting belongs in the service behind this
    /// trait.
    fn resolve(&self, pool_name: &str) -> Result<PoolConfig, ResolveError>;
}

/// In-memory resolver over a fixed pool table, updatable at runtime.
#[derive(Debug, Default)]
pub struct StaticPoolResolver {
    pools: RwLock<HashMap<String, PoolConfig>>,
}

impl StaticPoolResolver {
    pub fn new(pools: HashMap<String, PoolConfig>) -> Self {
        Self {
            pools: RwLock::new(pools),
        }
    }

    /// Inserts or replaces a pool config.
    pub fn set_pool(&self, name: impl Into<String>, cfg: PoolConfig) {
        self.write().insert(name.into(), cfg);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, PoolConfig>> {
        self.pools.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, PoolConfig>> {
        self.pools.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl PoolResolver for StaticPoolResolver {
    fn resolve(&self, pool_name: &str) -> Result<PoolConfig, ResolveError> {
        self.read()
            .get(pool_name)
            .cloned()
            .ok_or_else(|| ResolveError(format!("unknown pool '{pool_name}'")))
    }
}
