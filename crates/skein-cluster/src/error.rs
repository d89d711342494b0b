//! Error types for cluster-service calls.

use thiserror::Error;

/// Result type for cluster-service operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors reported by a cluster-service implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClusterError {
    /// Slicer placement failed.
    #[error("slicer allocation failed: {0}")]
    SlicerAllocation(String),

    /// Worker placement failed.
    #[error("worker allocation failed: {0}")]
    WorkerAllocation(String),

    /// One or more node notifications failed.
    #[error("node notification failed: {0}")]
    Notification(String),

    /// A node could not be reached.
    #[error("node unreachable: {0}")]
    NodeUnreachable(String),

    /// The moderator query failed.
    #[error("moderator check failed: {0}")]
    Moderator(String),

    /// Any other cluster-side failure.
    #[error("cluster error: {0}")]
    Backend(String),
}
