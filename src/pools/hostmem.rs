//! # Per-host memory accounting.
//!
//! Two of these maps live in the controller state, mirroring the per-pool
//! reserved/admitted split at host granularity:
//! - `host_mem_reserved`: rebuilt from gossiped snapshots on every topic
//!   tick;
//! - `host_mem_admitted`: adjusted eagerly when this coordinator admits
//!   or releases.
//!
//! Decisions read `max(reserved, admitted)` per host, the same staleness
//! guard used for pool aggregates.

use std::collections::HashMap;

/// Memory in bytes keyed by executor host id.
#[derive(Clone, Debug, Default)]
pub struct HostMemMap {
    map: HashMap<String, i64>,
}

impl HostMemMap {
    /// Current value for `host`, zero when absent.
    pub fn get(&self, host: &str) -> i64 {
        self.map.get(host).copied().unwrap_or(0)
    }

    /// Adjusts `host` by `delta` (negative on release). Entries that
    /// return to zero or below are dropped so departed hosts do not
    /// accumulate.
    pub fn add(&mut self, host: &str, delta: i64) {
        let value = self.get(host) + delta;
        if value <= 0 {
            self.map.remove(host);
        } else {
            self.map.insert(host.to_string(), value);
        }
    }

    /// Drops all entries; used before a full aggregate rebuild.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.map.iter().map(|(host, value)| (host.as_str(), *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_drain() {
        let mut map = HostMemMap::default();
        map.add("host1:22000", 1024);
        map.add("host1:22000", 512);
        assert_eq!(map.get("host1:22000"), 1536);

        map.add("host1:22000", -1536);
        assert_eq!(map.get("host1:22000"), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn missing_host_reads_zero() {
        let map = HostMemMap::default();
        assert_eq!(map.get("nowhere:22000"), 0);
    }
}
