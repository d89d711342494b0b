//! Error handling for the scheduling core.

use thiserror::Error;

use skein_cluster::ClusterError;
use skein_types::{ExId, TypesError};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while driving job and execution lifecycles.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Job spec rejected by the validator. Nothing is persisted.
    #[error("job validation failed: {0}")]
    Validation(String),

    /// Asset names missing or resolution count mismatched.
    #[error("asset resolution failed: {0}")]
    AssetResolution(String),

    /// A notify command outside the command set.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A status name outside the status set.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    /// Document store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// The backing index has not been created yet. Tolerated during
    /// bootstrap on a fresh cluster.
    #[error("state store not initialized")]
    StoreNotInitialized,

    /// Cluster service call failed.
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Record absent.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind, `job` or `execution`.
        kind: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// Restart refused: the execution already ran to completion.
    #[error("execution {0} has completed and cannot be restarted")]
    CompletedNotRestartable(ExId),

    /// Restart refused: the execution is being scheduled right now.
    #[error("execution {0} is already being scheduled")]
    AlreadyScheduling(ExId),

    /// Serialization failure at the store boundary.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A wiring bug inside the core.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// A `NotFound` for a job record.
    pub fn job_not_found(id: impl ToString) -> Self {
        CoreError::NotFound {
            kind: "job",
            id: id.to_string(),
        }
    }

    /// A `NotFound` for an execution record.
    pub fn execution_not_found(id: impl ToString) -> Self {
        CoreError::NotFound {
            kind: "execution",
            id: id.to_string(),
        }
    }
}

impl From<TypesError> for CoreError {
    fn from(e: TypesError) -> Self {
        match e {
            TypesError::UnknownStatus(s) => CoreError::InvalidStatus(s),
            TypesError::UnknownCommand(c) => CoreError::InvalidCommand(c),
        }
    }
}
