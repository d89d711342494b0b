//! Persistence layer for jobs and executions.
//!
//! The document store itself is an external collaborator; this module
//! defines the adapter contract the core consumes plus the bundled
//! in-memory implementation used by tests and single-process deployments.

mod memory;
mod query;

pub use memory::MemoryStore;
pub use query::{ExecutionQuery, Sort, SortField, SortOrder};

use async_trait::async_trait;

use skein_types::{ExId, Execution, ExecutionSpec, ExecutionUpdate, Job, JobId, JobSpec, JobUpdate};

use crate::error::CoreResult;

/// Largest window a search may return. Backends that cannot return this
/// many records must document their lower cap.
pub const MAX_SEARCH_SIZE: usize = 10_000;

/// Contract over the persistent record store.
///
/// Creation assigns identifiers and stamps `_context`, `_created`, and
/// `_updated`; updates merge a typed partial and bump `_updated`.
/// Failures bubble as [`CoreError::Storage`](crate::CoreError::Storage);
/// the core logs and surfaces them rather than retrying.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Persist a new job template.
    async fn create_job(&self, spec: JobSpec) -> CoreResult<Job>;

    /// Persist a new execution with status `pending`.
    async fn create_execution(&self, spec: ExecutionSpec) -> CoreResult<Execution>;

    /// Fetch a job by ID.
    async fn job(&self, job_id: &JobId) -> CoreResult<Job>;

    /// Fetch an execution by ID.
    async fn execution(&self, ex_id: &ExId) -> CoreResult<Execution>;

    /// Merge a partial into a job record.
    async fn update_job(&self, job_id: &JobId, update: JobUpdate) -> CoreResult<Job>;

    /// Merge a partial into an execution record.
    async fn update_execution(&self, ex_id: &ExId, update: ExecutionUpdate) -> CoreResult<()>;

    /// Search the execution collection. `size` is clamped to
    /// [`MAX_SEARCH_SIZE`].
    async fn search_executions(
        &self,
        query: &ExecutionQuery,
        from: usize,
        size: usize,
        sort: Sort,
    ) -> CoreResult<Vec<Execution>>;

    /// Search the job collection, ordered by creation time.
    async fn search_jobs(&self, from: usize, size: usize, sort: Sort) -> CoreResult<Vec<Job>>;

    /// Release the store's resources. Called once during shutdown.
    async fn close(&self) -> CoreResult<()>;
}
