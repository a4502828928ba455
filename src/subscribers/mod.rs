//! Subscriber fan-out: the observability seam.
//!
//! - [`Subscribe`]: trait for admission event observers.
//! - [`SubscriberSet`]: per-subscriber queues and workers with panic
//!   isolation.
//! - [`LogSubscriber`]: built-in `tracing` observer.

mod log;
mod set;
mod subscriber;

pub use log::LogSubscriber;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
