//! # Built-in tracing subscriber.
//!
//! [`LogSubscriber`] renders admission events through `tracing`, one line
//! per decision with structured fields. It is the reference [`Subscribe`]
//! implementation; production embedders typically add their own metrics
//! subscriber next to it.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Logs every admission event via `tracing`.
pub struct LogSubscriber;

#[async_trait]
impl Subscribe for LogSubscriber {
    async fn on_event(&self, e: &Event) {
        let pool = e.pool.as_deref().unwrap_or("-");
        let query = e.query_id.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::Admitted => {
                info!(pool, query, mem = e.mem, "query admitted");
            }
            EventKind::Queued => {
                info!(pool, query, reason = e.reason.as_deref(), "query queued");
            }
            EventKind::Dequeued => {
                debug!(pool, query, wait = ?e.wait, "query dequeued");
            }
            EventKind::Rejected => {
                info!(pool, query, reason = e.reason.as_deref(), "query rejected");
            }
            EventKind::TimedOut => {
                warn!(pool, query, reason = e.reason.as_deref(), "admission timed out");
            }
            EventKind::Cancelled => {
                info!(pool, query, "admission cancelled");
            }
            EventKind::Released => {
                debug!(pool, query, mem = e.mem, "query released");
            }
            EventKind::TopicProcessed => {
                debug!("statestore topic processed");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                warn!(reason = e.reason.as_deref(), "subscriber diagnostic");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
