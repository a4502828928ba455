//! # Admission lifecycle events.
//!
//! Every terminal admission decision and every gossip tick produces an
//! [`Event`] on the controller's bus. Subscribers (metrics exporters,
//! audit logs) consume them without coupling the engine to any backend.
//!
//! ## Event flow examples
//!
//! ### Immediate admission
//! ```text
//! submit_for_admission()
//!   → Admitted
//!   → [query runs]
//!   → Released
//! ```
//!
//! ### Queued admission
//! ```text
//! submit_for_admission()
//!   → Queued
//!   → [gossip frees resources] → TopicProcessed
//!   → Dequeued + Admitted
//! ```
//!
//! ### Queue timeout
//! ```text
//! submit_for_admission()
//!   → Queued
//!   → [queue_timeout elapses]
//!   → TimedOut
//! ```
//!
//! ## Ordering
//! Each event carries a globally unique, monotonically increasing `seq`,
//! so consumers can re-order events delivered through async channels.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of admission events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Admission lifecycle ===
    /// Request admitted; `mem` carries the cluster-wide admitted bytes.
    Admitted,
    /// Request parked in its pool queue; `reason` explains why.
    Queued,
    /// Request left the queue for admission.
    Dequeued,
    /// Request rejected outright; `reason` explains why.
    Rejected,
    /// Queue timeout elapsed before admission.
    TimedOut,
    /// Attempt cancelled while queued.
    Cancelled,
    /// Admitted query terminated and its resources were returned.
    Released,

    // === Gossip ===
    /// A statestore delivery was reconciled into the aggregates.
    TopicProcessed,
}

/// Admission event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for display only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Pool the event belongs to, if any.
    pub pool: Option<String>,
    /// Query the event belongs to, if any.
    pub query_id: Option<String>,
    /// Decision reason for queueing/rejection/timeout, or panic detail.
    pub reason: Option<String>,
    /// Memory in bytes (admitted or released), if relevant.
    pub mem: Option<i64>,
    /// Time spent in the queue, if relevant.
    pub wait: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the next sequence
    /// number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pool: None,
            query_id: None,
            reason: None,
            mem: None,
            wait: None,
        }
    }

    /// Attaches a pool name.
    pub fn with_pool(mut self, pool: impl Into<String>) -> Self {
        self.pool = Some(pool.into());
        self
    }

    /// Attaches a query id.
    pub fn with_query(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = Some(query_id.into());
        self
    }

    /// Attaches a decision reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a memory amount in bytes.
    pub fn with_mem(mut self, bytes: i64) -> Self {
        self.mem = Some(bytes);
        self
    }

    /// Attaches a queue wait duration.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Creates a subscriber overflow event.
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_query(subscriber)
            .with_reason(info)
    }

    pub(crate) fn is_subscriber_overflow(&self) -> bool {
        self.kind == EventKind::SubscriberOverflow
    }

    pub(crate) fn is_subscriber_panic(&self) -> bool {
        self.kind == EventKind::SubscriberPanicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::now(EventKind::Admitted);
        let b = Event::now(EventKind::Released);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::Rejected)
            .with_pool("default")
            .with_query("q7")
            .with_reason("queue full, limit=5, num_queued=5");
        assert_eq!(ev.pool.as_deref(), Some("default"));
        assert_eq!(ev.query_id.as_deref(), Some("q7"));
        assert!(ev.reason.as_deref().unwrap().contains("queue full"));
    }
}
