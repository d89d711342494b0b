//! Typed queries over the execution collection.
//!
//! The core never concatenates query strings; it builds these shapes and
//! the store adapter translates them to the backing index's language.

use skein_types::{Execution, ExecutionStatus, JobId, ACTIVE_STATUSES};

/// Filter over execution records: an optional job filter conjoined with a
/// disjunction over statuses. An empty status list matches every status.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQuery {
    /// Restrict to executions of one job.
    pub job_id: Option<JobId>,

    /// Match any of these statuses; empty matches all.
    pub statuses: Vec<ExecutionStatus>,
}

impl ExecutionQuery {
    /// Match every execution.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match executions of one job.
    pub fn for_job(job_id: JobId) -> Self {
        Self {
            job_id: Some(job_id),
            statuses: Vec::new(),
        }
    }

    /// Match one status.
    pub fn with_status(status: ExecutionStatus) -> Self {
        Self {
            job_id: None,
            statuses: vec![status],
        }
    }

    /// Match any of the given statuses.
    pub fn with_statuses(statuses: impl IntoIterator<Item = ExecutionStatus>) -> Self {
        Self {
            job_id: None,
            statuses: statuses.into_iter().collect(),
        }
    }

    /// Match every active execution.
    pub fn active() -> Self {
        Self::with_statuses(ACTIVE_STATUSES)
    }

    /// Restrict an existing query to one job.
    pub fn and_job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    /// Whether a record satisfies this query.
    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(ref job_id) = self.job_id {
            if &execution.job_id != job_id {
                return false;
            }
        }
        self.statuses.is_empty() || self.statuses.contains(&execution.status)
    }
}

/// Field a search is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Order by `_created`.
    Created,
    /// Order by `_updated`.
    Updated,
}

/// Direction of a search ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Oldest first.
    Ascending,
    /// Newest first.
    Descending,
}

/// Ordering applied to a search window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    /// Field to order by.
    pub field: SortField,
    /// Direction.
    pub order: SortOrder,
}

impl Sort {
    /// Oldest-created first.
    pub fn created_asc() -> Self {
        Self {
            field: SortField::Created,
            order: SortOrder::Ascending,
        }
    }

    /// Newest-created first.
    pub fn created_desc() -> Self {
        Self {
            field: SortField::Created,
            order: SortOrder::Descending,
        }
    }

    /// Most-recently-updated first.
    pub fn updated_desc() -> Self {
        Self {
            field: SortField::Updated,
            order: SortOrder::Descending,
        }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self::created_asc()
    }
}
