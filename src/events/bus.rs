//! # Broadcast bus for admission events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so the controller, the dequeue
//! worker, and the gossip path can publish [`Event`]s to any number of
//! subscribers without blocking.
//!
//! ## Key characteristics
//! - **Broadcast semantics**: every active subscriber receives a clone of
//!   each event.
//! - **Non-persistent**: events published with no subscribers are dropped;
//!   the engine runs fine unobserved.
//! - **Bounded capacity**: slow subscribers lag and skip, they never stall
//!   admission.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for admission events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity. When capacity is
    /// exceeded, the oldest undelivered events are dropped per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current subscribers. Never blocks; with
    /// no subscribers the event is dropped silently.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
