//! Skein Job Scheduling and Execution Lifecycle Core
//!
//! This crate is the control plane's core: it accepts job submissions,
//! admits them under resource and moderation constraints, drives each
//! execution through its lifecycle, reacts to cluster events, and
//! persists every transition so a controller restart reconstructs the
//! in-flight world.
//!
//! # Overview
//!
//! 1. **Submission**: assets resolve to content IDs, the spec is
//!    validated, and the job persists with status `pending`.
//! 2. **Admission**: the moderator gate either queues the execution for
//!    scheduling or holds it until throttled connections clear.
//! 3. **Allocation**: a single-consumer loop places the slicer, then the
//!    workers, publishing `scheduling` and `initializing` along the way.
//! 4. **Execution**: cluster and slicer events advance the record to
//!    `running` and eventually to a terminal status.
//!
//! # Lifecycle
//!
//! | Active | Terminal |
//! |--------|----------|
//! | `pending`, `scheduling`, `initializing`, `running`, `failing`, `paused`, `moderator_paused` | `completed`, `stopped`, `rejected`, `failed`, `terminated` |
//!
//! # Example: submit and run
//!
//! ```ignore
//! use std::sync::Arc;
//! use skein_sched::{BasicValidator, ControllerConfig, JobController, MemoryStore};
//! use skein_types::{JobSpec, OpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = JobController::start(
//!         ControllerConfig::default().with_cluster_name("dev"),
//!         Arc::new(MemoryStore::new("dev")),
//!         cluster_service,
//!         Arc::new(BasicValidator::new()),
//!     )
//!     .await?;
//!
//!     let spec = JobSpec::new(
//!         "reindex",
//!         4,
//!         vec![OpConfig::new("es_reader"), OpConfig::new("es_writer")],
//!     );
//!     let job_id = controller.submit_job(spec, true).await?;
//!     println!("submitted: {job_id}");
//!
//!     controller.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Events
//!
//! External signals arrive on the [`EventBus`] as one tagged
//! [`ClusterEvent`] sum; the router dispatches them sequentially, so a
//! handler always runs to completion before the next event. Asset
//! resolution rides the same bus through correlation-keyed one-shot
//! replies.
//!
//! # Persistence
//!
//! The document store is external; [`StateStorage`] is the contract and
//! [`MemoryStore`] the bundled single-process implementation:
//!
//! ```ignore
//! use skein_sched::{MemoryStore, StateStorage};
//!
//! let store = MemoryStore::new("dev");
//! ```

pub mod allocator;
pub mod bus;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod moderator;
pub mod persistence;
pub mod queue;
pub mod router;
pub mod validator;

#[cfg(test)]
mod test_support;

// Re-exports
pub use allocator::Allocator;
pub use bus::{AssetRequest, AssetResponse, ClusterEvent, CorrelationId, EventBus};
pub use controller::{ControllerConfig, JobController};
pub use error::{CoreError, CoreResult};
pub use lifecycle::ExecutionLifecycle;
pub use moderator::{ModeratorGate, STATE_CONNECTION_TYPE};
pub use persistence::{
    ExecutionQuery, MemoryStore, Sort, SortField, SortOrder, StateStorage, MAX_SEARCH_SIZE,
};
pub use queue::{AdmissionQueue, AdmissionQueues};
pub use router::EventRouter;
pub use validator::{BasicValidator, JobValidator};
