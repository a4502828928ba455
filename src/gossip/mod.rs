//! # Gossip: topic records and reconciliation.
//!
//! Coordinators share pool statistics through a statestore-style pub/sub
//! topic. This module owns the wire data model ([`PoolStatsSnapshot`],
//! [`StatsTopicEntry`], [`StatsTopicDelta`]) and the reconciliation of
//! deliveries into the controller's aggregates (`update`).

mod topic;
mod update;

pub use topic::{
    make_topic_key, parse_topic_key, PoolStatsSnapshot, StatsTopicDelta, StatsTopicEntry,
    TOPIC_KEY_DELIMITER,
};
