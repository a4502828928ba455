//! Admission events: types and broadcast bus.
//!
//! The event **data model** ([`Event`], [`EventKind`]) and the **bus**
//! ([`Bus`]) used to publish admission lifecycle events to observers.
//!
//! Publishers: the controller (submit/release paths), the dequeue worker,
//! and the gossip reconciliation. Consumers: the subscriber fan-out
//! spawned by [`AdmissionController::run`](crate::AdmissionController::run)
//! and any direct [`Bus::subscribe`] caller.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
