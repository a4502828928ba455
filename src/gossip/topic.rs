//! # Gossip topic records.
//!
//! Pool statistics travel between coordinators as per-(pool, coordinator)
//! records on the request-queue topic. The key is
//! `<pool_name>!<coordinator_id>`; the value is a [`PoolStatsSnapshot`].
//! A record with no snapshot is a tombstone: the coordinator left and its
//! contribution must be dropped from the aggregates.
//!
//! The transport itself is a collaborator. It hands the controller a
//! [`StatsTopicDelta`] on every tick and ships back the entries the
//! controller wants published. Snapshots are plain serde types; the wire
//! encoding is the transport's business.

use serde::{Deserialize, Serialize};

/// Separator between pool name and coordinator id in topic keys.
pub const TOPIC_KEY_DELIMITER: char = '!';

/// One pool's local statistics on one coordinator, as gossiped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    /// Queries admitted by that coordinator and still running.
    pub num_admitted_running: i64,
    /// Requests queued on that coordinator.
    pub num_queued: i64,
    /// Memory reserved on that backend by this pool's fragments.
    pub backend_mem_reserved: i64,
    /// Current memory consumption on that backend for this pool.
    pub backend_mem_usage: i64,
}

/// Builds the topic key for a pool on a coordinator.
pub fn make_topic_key(pool_name: &str, coordinator_id: &str) -> String {
    format!("{pool_name}{TOPIC_KEY_DELIMITER}{coordinator_id}")
}

/// Splits a topic key into `(pool_name, coordinator_id)`.
///
/// Pool names may themselves contain the delimiter; coordinator ids never
/// do, so the split happens at the last occurrence.
pub fn parse_topic_key(key: &str) -> Option<(&str, &str)> {
    let pos = key.rfind(TOPIC_KEY_DELIMITER)?;
    let (pool, rest) = key.split_at(pos);
    let coordinator = &rest[TOPIC_KEY_DELIMITER.len_utf8()..];
    if pool.is_empty() || coordinator.is_empty() {
        return None;
    }
    Some((pool, coordinator))
}

/// One topic record: a snapshot upsert, or a tombstone when `stats` is
/// `None`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsTopicEntry {
    pub key: String,
    pub stats: Option<PoolStatsSnapshot>,
}

impl StatsTopicEntry {
    /// Snapshot upsert for `(pool, coordinator)`.
    pub fn update(pool_name: &str, coordinator_id: &str, stats: PoolStatsSnapshot) -> Self {
        Self {
            key: make_topic_key(pool_name, coordinator_id),
            stats: Some(stats),
        }
    }

    /// Deletion marker for `(pool, coordinator)`.
    pub fn tombstone(pool_name: &str, coordinator_id: &str) -> Self {
        Self {
            key: make_topic_key(pool_name, coordinator_id),
            stats: None,
        }
    }
}

/// One delivery of the request-queue topic.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsTopicDelta {
    pub entries: Vec<StatsTopicEntry>,
    /// `false` for a full refresh: all remote state is cleared before the
    /// entries are applied.
    pub is_delta: bool,
}

impl StatsTopicDelta {
    /// An incremental delivery of `entries`.
    pub fn delta(entries: Vec<StatsTopicEntry>) -> Self {
        Self {
            entries,
            is_delta: true,
        }
    }

    /// A full refresh carrying the complete topic content.
    pub fn full(entries: Vec<StatsTopicEntry>) -> Self {
        Self {
            entries,
            is_delta: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_key_round_trip() {
        let key = make_topic_key("root.analytics", "coord1:21000");
        assert_eq!(key, "root.analytics!coord1:21000");
        assert_eq!(
            parse_topic_key(&key),
            Some(("root.analytics", "coord1:21000"))
        );
    }

    #[test]
    fn pool_name_may_contain_delimiter() {
        let key = make_topic_key("odd!pool", "coord1:21000");
        assert_eq!(parse_topic_key(&key), Some(("odd!pool", "coord1:21000")));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert_eq!(parse_topic_key("no-delimiter"), None);
        assert_eq!(parse_topic_key("!coord"), None);
        assert_eq!(parse_topic_key("pool!"), None);
    }

    #[test]
    fn snapshot_survives_serialization() {
        let snapshot = PoolStatsSnapshot {
            num_admitted_running: 3,
            num_queued: 1,
            backend_mem_reserved: 4096,
            backend_mem_usage: 1024,
        };
        let entry = StatsTopicEntry::update("default", "coord1:21000", snapshot.clone());
        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: StatsTopicEntry = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.stats, Some(snapshot));
    }
}
