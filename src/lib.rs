//! # querygate
//!
//! **Querygate** is a resource-pool admission controller for distributed
//! analytical query services.
//!
//! Any coordinator in a fleet may accept queries; each runs one
//! [`AdmissionController`] that decides, per request, whether to admit it
//! immediately, park it in its pool's FIFO queue, or reject it. Limits are
//! per named pool (concurrent queries, queue depth, aggregate cluster
//! memory, per-query memory clamps), and the accounting that backs the
//! decisions is gossiped between coordinators over a statestore-style
//! pub/sub topic, so decisions run against a slightly stale aggregate
//! view with soft limits.
//!
//! ## Features
//!
//! | Area              | Description                                                      | Key types / traits                           |
//! |-------------------|------------------------------------------------------------------|----------------------------------------------|
//! | **Admission API** | Submit, wait/cancel, release.                                    | [`AdmissionController`], [`OutcomeCell`]     |
//! | **Pools**         | Per-pool limits, fixed or scaled with cluster size.              | [`PoolConfig`], [`PoolResolver`]             |
//! | **Accounting**    | Eager local + gossiped remote stats, per-pool and per-host.      | [`PoolStatsSnapshot`], [`StatsTopicDelta`]   |
//! | **Collaborators** | Membership, pool configs, backend memory stay behind traits.     | [`ClusterView`], [`MemTracker`]              |
//! | **Observability** | Lifecycle events, subscriber fan-out, JSON introspection.        | [`Subscribe`], [`Event`], [`QueryProfile`]   |
//! | **Errors**        | Typed rejection/timeout/cancellation outcomes with reasons.      | [`AdmissionError`]                           |
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use querygate::{
//!     AdmissionController, ControllerConfig, Executor, LogSubscriber, OutcomeCell,
//!     PoolConfig, QueryProfile, QueryRequest, StaticClusterView, StaticPoolResolver,
//!     Subscribe, UntrackedMem,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let resolver = Arc::new(StaticPoolResolver::new(HashMap::from([(
//!         "default".to_string(),
//!         PoolConfig { max_requests: 4, ..PoolConfig::default() },
//!     )])));
//!     let cluster = Arc::new(StaticClusterView::new(10));
//!
//!     let controller = AdmissionController::new(
//!         ControllerConfig::new("coord1:21000"),
//!         resolver,
//!         cluster,
//!         Arc::new(UntrackedMem),
//!         vec![Arc::new(LogSubscriber) as Arc<dyn Subscribe>],
//!     );
//!     controller.run(CancellationToken::new());
//!
//!     let request = Arc::new(QueryRequest {
//!         query_id: "q1".to_string(),
//!         pool_name: "default".to_string(),
//!         executors: vec![Executor { id: "exec1:22000".into(), admit_mem_limit: 64 << 30 }],
//!         per_host_mem_estimate: 4 << 30,
//!         largest_initial_reservation: 64 << 20,
//!         user_mem_limit: None,
//!         profile: Arc::new(QueryProfile::default()),
//!     });
//!     let outcome = Arc::new(OutcomeCell::new());
//!     let grant = controller
//!         .submit_for_admission(Arc::clone(&request), outcome)
//!         .await?;
//!     // ... run the query, then:
//!     controller.release_query(&request, grant.per_backend_mem_to_admit).await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod cluster;
mod config;
mod controller;
mod error;
mod gossip;
mod introspect;
mod memory;
mod outcome;
mod pools;
mod profile;
mod request;
mod resolver;

pub mod events;
pub mod subscribers;

// ---- Public re-exports ----

pub use cluster::{ClusterView, StaticClusterView};
pub use config::ControllerConfig;
pub use controller::{AdmissionController, AdmissionGrant};
pub use error::AdmissionError;
pub use events::{Bus, Event, EventKind};
pub use gossip::{
    make_topic_key, parse_topic_key, PoolStatsSnapshot, StatsTopicDelta, StatsTopicEntry,
    TOPIC_KEY_DELIMITER,
};
pub use memory::{MemTracker, UntrackedMem};
pub use outcome::{AdmissionOutcome, OutcomeCell};
pub use pools::{PoolConfig, PoolTotals};
pub use profile::{AdmissionResult, ProfileSnapshot, QueryProfile};
pub use request::{Executor, MemoryRequirements, QueryRequest};
pub use resolver::{PoolResolver, ResolveError, StaticPoolResolver};
pub use subscribers::{LogSubscriber, Subscribe};
