//! Skein domain records.
//!
//! This crate defines the persisted shapes of the control plane — jobs,
//! executions, the status model, and control commands — shared by the
//! cluster contract and the scheduling core.
//!
//! # Records
//!
//! A [`Job`] is the user-supplied template describing work: an operator
//! pipeline, a worker count, optional asset references, and an optional
//! moderator dependency map. An [`Execution`] is one run of a job,
//! carrying a snapshot of the pipeline and a [`ExecutionStatus`] that the
//! core drives through the lifecycle:
//!
//! ```text
//!   pending ──→ scheduling ──→ initializing ──→ running ──→ completed
//!      │                                          │  ↑
//!      │                                      paused / failing
//!      └──────────────────────────────────────→ stopped / failed /
//!                                               rejected / terminated
//! ```
//!
//! Serde attributes preserve the document-store field names (`_status`,
//! `_created`, `_updated`, ...) so records round-trip against the backing
//! index unchanged.

pub mod error;
pub mod execution;
pub mod job;

pub use error::TypesError;
pub use execution::{
    ControlCommand, ErrorFlag, ExId, Execution, ExecutionSpec, ExecutionStatus, ExecutionUpdate,
    SlicerStats, ACTIVE_STATUSES,
};
pub use job::{
    AssetId, ConnectionList, ConnectionRef, Job, JobId, JobLifecycle, JobSpec, JobUpdate, OpConfig,
    RecordContext,
};
