//! In-memory record store for tests and single-process deployments.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use skein_types::{
    ExId, Execution, ExecutionSpec, ExecutionStatus, ExecutionUpdate, Job, JobId, JobSpec,
    JobUpdate, RecordContext,
};

use crate::error::{CoreError, CoreResult};
use crate::persistence::{ExecutionQuery, Sort, SortField, SortOrder, StateStorage, MAX_SEARCH_SIZE};

/// The index name both collections live in, derived from the cluster name.
fn state_index_name(cluster_name: &str) -> String {
    format!("{cluster_name}__state")
}

/// In-memory document store.
///
/// Mirrors the cache layer a real document-store driver keeps: one map
/// per collection behind an async lock. A store that has never been
/// written reports [`CoreError::StoreNotInitialized`] from searches,
/// which bootstrap tolerates on a fresh cluster.
pub struct MemoryStore {
    index: String,
    initialized: AtomicBool,
    jobs: RwLock<rustc_hash::FxHashMap<JobId, Job>>,
    executions: RwLock<rustc_hash::FxHashMap<ExId, Execution>>,
}

impl MemoryStore {
    /// Create a store for the named cluster.
    pub fn new(cluster_name: &str) -> Self {
        Self {
            index: state_index_name(cluster_name),
            initialized: AtomicBool::new(false),
            jobs: RwLock::new(rustc_hash::FxHashMap::default()),
            executions: RwLock::new(rustc_hash::FxHashMap::default()),
        }
    }

    /// The index name records are stored under.
    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    fn ensure_initialized(&self) -> CoreResult<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::StoreNotInitialized)
        }
    }
}

fn sort_executions(records: &mut [Execution], sort: Sort) {
    records.sort_by(|a, b| {
        let ordering = match sort.field {
            SortField::Created => a.created.cmp(&b.created),
            SortField::Updated => a.updated.cmp(&b.updated),
        };
        match sort.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

fn window<T>(records: Vec<T>, from: usize, size: usize) -> Vec<T> {
    records
        .into_iter()
        .skip(from)
        .take(size.min(MAX_SEARCH_SIZE))
        .collect()
}

#[async_trait]
impl StateStorage for MemoryStore {
    async fn create_job(&self, spec: JobSpec) -> CoreResult<Job> {
        let now = Utc::now();
        let job = Job {
            job_id: JobId::new(),
            spec,
            context: RecordContext::Job,
            created: now,
            updated: now,
        };

        let mut jobs = self.jobs.write().await;
        jobs.insert(job.job_id.clone(), job.clone());
        self.mark_initialized();
        Ok(job)
    }

    async fn create_execution(&self, spec: ExecutionSpec) -> CoreResult<Execution> {
        let now = Utc::now();
        let execution = Execution {
            ex_id: ExId::new(),
            job_id: spec.job_id,
            name: spec.name,
            workers: spec.workers,
            operations: spec.operations,
            assets: spec.assets,
            moderator: spec.moderator,
            status: ExecutionStatus::Pending,
            context: RecordContext::Execution,
            created: now,
            updated: now,
            failure_reason: None,
            slicer_stats: None,
            has_errors: None,
            recover_execution: false,
        };

        let mut executions = self.executions.write().await;
        executions.insert(execution.ex_id.clone(), execution.clone());
        self.mark_initialized();
        Ok(execution)
    }

    async fn job(&self, job_id: &JobId) -> CoreResult<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id)
            .cloned()
            .ok_or_else(|| CoreError::job_not_found(job_id))
    }

    async fn execution(&self, ex_id: &ExId) -> CoreResult<Execution> {
        let executions = self.executions.read().await;
        executions
            .get(ex_id)
            .cloned()
            .ok_or_else(|| CoreError::execution_not_found(ex_id))
    }

    async fn update_job(&self, job_id: &JobId, update: JobUpdate) -> CoreResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| CoreError::job_not_found(job_id))?;

        update.apply(&mut job.spec);
        job.updated = Utc::now();
        Ok(job.clone())
    }

    async fn update_execution(&self, ex_id: &ExId, update: ExecutionUpdate) -> CoreResult<()> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(ex_id)
            .ok_or_else(|| CoreError::execution_not_found(ex_id))?;

        update.apply(execution);
        execution.updated = Utc::now();
        Ok(())
    }

    async fn search_executions(
        &self,
        query: &ExecutionQuery,
        from: usize,
        size: usize,
        sort: Sort,
    ) -> CoreResult<Vec<Execution>> {
        self.ensure_initialized()?;

        let executions = self.executions.read().await;
        let mut matched: Vec<Execution> = executions
            .values()
            .filter(|ex| query.matches(ex))
            .cloned()
            .collect();

        sort_executions(&mut matched, sort);
        Ok(window(matched, from, size))
    }

    async fn search_jobs(&self, from: usize, size: usize, sort: Sort) -> CoreResult<Vec<Job>> {
        self.ensure_initialized()?;

        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs.values().cloned().collect();

        matched.sort_by(|a, b| {
            let ordering = match sort.field {
                SortField::Created => a.created.cmp(&b.created),
                SortField::Updated => a.updated.cmp(&b.updated),
            };
            match sort.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        Ok(window(matched, from, size))
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_types::OpConfig;

    fn spec(name: &str) -> JobSpec {
        JobSpec::new(
            name,
            2,
            vec![OpConfig::new("es_reader"), OpConfig::new("es_writer")],
        )
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let store = MemoryStore::new("dev");
        assert_eq!(store.index_name(), "dev__state");

        let job = store.create_job(spec("reindex")).await.unwrap();
        let fetched = store.job(&job.job_id).await.unwrap();
        assert_eq!(fetched.spec.name, "reindex");
        assert_eq!(fetched.context, RecordContext::Job);

        let ex = store
            .create_execution(ExecutionSpec::from_job(&job, Vec::new()))
            .await
            .unwrap();
        assert_eq!(ex.status, ExecutionStatus::Pending);
        assert_eq!(ex.context, RecordContext::Execution);
        assert_eq!(ex.job_id, job.job_id);

        let fetched = store.execution(&ex.ex_id).await.unwrap();
        assert_eq!(fetched, ex);
    }

    #[tokio::test]
    async fn test_missing_records() {
        let store = MemoryStore::new("dev");
        store.create_job(spec("j")).await.unwrap();

        assert!(matches!(
            store.job(&JobId::new()).await,
            Err(CoreError::NotFound { kind: "job", .. })
        ));
        assert!(matches!(
            store.execution(&ExId::new()).await,
            Err(CoreError::NotFound {
                kind: "execution",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_updated() {
        let store = MemoryStore::new("dev");
        let job = store.create_job(spec("j")).await.unwrap();
        let ex = store
            .create_execution(ExecutionSpec::from_job(&job, Vec::new()))
            .await
            .unwrap();

        store
            .update_execution(&ex.ex_id, ExecutionUpdate::status(ExecutionStatus::Scheduling))
            .await
            .unwrap();

        let fetched = store.execution(&ex.ex_id).await.unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Scheduling);
        assert_eq!(fetched.created, ex.created);
        assert!(fetched.updated >= ex.updated);
    }

    #[tokio::test]
    async fn test_search_uninitialized() {
        let store = MemoryStore::new("dev");
        assert!(matches!(
            store
                .search_executions(&ExecutionQuery::all(), 0, 100, Sort::created_asc())
                .await,
            Err(CoreError::StoreNotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_search_filters_and_sorts() {
        let store = MemoryStore::new("dev");
        let job = store.create_job(spec("j")).await.unwrap();

        let first = store
            .create_execution(ExecutionSpec::from_job(&job, Vec::new()))
            .await
            .unwrap();
        let second = store
            .create_execution(ExecutionSpec::from_job(&job, Vec::new()))
            .await
            .unwrap();
        store
            .update_execution(&second.ex_id, ExecutionUpdate::status(ExecutionStatus::Running))
            .await
            .unwrap();

        let pending = store
            .search_executions(
                &ExecutionQuery::with_status(ExecutionStatus::Pending),
                0,
                100,
                Sort::created_asc(),
            )
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].ex_id, first.ex_id);

        let newest_first = store
            .search_executions(&ExecutionQuery::all(), 0, 100, Sort::created_desc())
            .await
            .unwrap();
        assert_eq!(newest_first.len(), 2);
        assert_eq!(newest_first[0].ex_id, second.ex_id);

        let windowed = store
            .search_executions(&ExecutionQuery::all(), 1, 100, Sort::created_asc())
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].ex_id, second.ex_id);
    }
}
