//! # Admission event subscriber trait.
//!
//! [`Subscribe`] is the extension point for metrics exporters, audit
//! trails, and any other observer of admission decisions. The engine's
//! metrics counters stay in-process; exporting them is the embedder's
//! business, and this trait is the seam.
//!
//! Each subscriber gets a dedicated worker task and a bounded queue, so a
//! slow metrics backend can never stall an admission decision.
//!
//! ## Rules
//! - Slow subscribers only affect themselves (queue overflow → event drop,
//!   reported as `SubscriberOverflow`).
//! - Panics are caught and isolated, reported as `SubscriberPanicked`.
//! - Subscribers never block publishers or each other.

use async_trait::async_trait;

use crate::events::Event;

/// Observer of admission lifecycle events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Runs on this subscriber's dedicated worker task; events arrive in
    /// publication order. Handle errors internally and do not panic.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue. Overflow drops events for
    /// this subscriber only.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
