//! The controller: configuration, bootstrap, the public API surface, and
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use skein_cluster::{ClusterService, MessageKind};
use skein_types::{
    ControlCommand, ExId, Execution, ExecutionStatus, ExecutionUpdate, Job, JobId, JobSpec,
    JobUpdate,
};

use crate::allocator::Allocator;
use crate::bus::EventBus;
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::ExecutionLifecycle;
use crate::moderator::ModeratorGate;
use crate::persistence::{ExecutionQuery, Sort, StateStorage, MAX_SEARCH_SIZE};
use crate::queue::AdmissionQueues;
use crate::router::EventRouter;
use crate::validator::JobValidator;

/// Configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cluster name; the backing index name derives from it.
    pub cluster_name: String,

    /// The state-store connection every moderator check includes.
    pub state_connection: String,

    /// Safety-net tick of the allocator loop.
    pub allocator_tick: Duration,

    /// Minimum free workers before anything is scheduled: a slicer slot
    /// plus at least one worker.
    pub min_available_workers: u32,

    /// How many persisted pending executions bootstrap re-enqueues.
    pub bootstrap_scan_limit: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: std::env::var("SKEIN_CLUSTER").unwrap_or_else(|_| "skein".to_string()),
            state_connection: "default".to_string(),
            allocator_tick: Duration::from_secs(1),
            min_available_workers: 2,
            bootstrap_scan_limit: MAX_SEARCH_SIZE,
        }
    }
}

impl ControllerConfig {
    /// Set the cluster name.
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Set the state-store connection name.
    pub fn with_state_connection(mut self, connection: impl Into<String>) -> Self {
        self.state_connection = connection.into();
        self
    }

    /// Set the allocator's safety-net tick.
    pub fn with_allocator_tick(mut self, tick: Duration) -> Self {
        self.allocator_tick = tick;
        self
    }
}

/// The control plane's job and execution API.
///
/// `start` reconstitutes queues from persisted state and spawns the
/// allocator and router tasks; `shutdown` terminalizes active executions
/// and closes the store.
pub struct JobController {
    store: Arc<dyn StateStorage>,
    lifecycle: Arc<ExecutionLifecycle>,
    bus: Arc<EventBus>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JobController {
    /// Boot the controller with a fresh event bus.
    pub async fn start(
        config: ControllerConfig,
        store: Arc<dyn StateStorage>,
        cluster: Arc<dyn ClusterService>,
        validator: Arc<dyn JobValidator>,
    ) -> CoreResult<Self> {
        Self::start_with_bus(config, store, cluster, validator, Arc::new(EventBus::new())).await
    }

    /// Boot the controller on an existing bus, so the transport layer and
    /// the asset subsystem can be wired to it first.
    pub async fn start_with_bus(
        config: ControllerConfig,
        store: Arc<dyn StateStorage>,
        cluster: Arc<dyn ClusterService>,
        validator: Arc<dyn JobValidator>,
        bus: Arc<EventBus>,
    ) -> CoreResult<Self> {
        let queues = Arc::new(Mutex::new(AdmissionQueues::new()));
        let wake = Arc::new(Notify::new());
        let gate = ModeratorGate::new(cluster.clone(), config.state_connection.clone());

        let lifecycle = Arc::new(ExecutionLifecycle::new(
            store.clone(),
            cluster.clone(),
            bus.clone(),
            queues.clone(),
            gate,
            validator,
            wake.clone(),
        ));

        Self::reconstitute(&config, &store, &queues).await?;

        let events = bus
            .take_events()
            .ok_or_else(|| CoreError::Internal("event bus consumer already claimed".into()))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let allocator = Allocator::new(
            cluster,
            lifecycle.clone(),
            queues,
            wake,
            config.allocator_tick,
            config.min_available_workers,
        );
        let router = EventRouter::new(lifecycle.clone(), events);

        let tasks = vec![
            tokio::spawn(allocator.run(shutdown_rx.clone())),
            tokio::spawn(router.run(shutdown_rx)),
        ];
        info!("controller started for cluster {}", config.cluster_name);

        Ok(Self {
            store,
            lifecycle,
            bus,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        })
    }

    /// Rebuild the pending queue from persisted state. Executions that
    /// were `running` at the previous shutdown are left in place.
    async fn reconstitute(
        config: &ControllerConfig,
        store: &Arc<dyn StateStorage>,
        queues: &Arc<Mutex<AdmissionQueues>>,
    ) -> CoreResult<()> {
        let running = match store
            .search_executions(
                &ExecutionQuery::with_status(ExecutionStatus::Running),
                0,
                config.bootstrap_scan_limit,
                Sort::created_asc(),
            )
            .await
        {
            Ok(records) => records,
            Err(CoreError::StoreNotInitialized) => {
                debug!("fresh state store, nothing to reconstitute");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if !running.is_empty() {
            warn!(
                "{} executions were running at the previous shutdown and are left in place",
                running.len()
            );
        }

        let pending = store
            .search_executions(
                &ExecutionQuery::with_status(ExecutionStatus::Pending),
                0,
                config.bootstrap_scan_limit,
                Sort::created_asc(),
            )
            .await?;
        if pending.is_empty() {
            return Ok(());
        }

        let count = pending.len();
        let mut guard = queues.lock().await;
        for execution in pending {
            guard.pending.enqueue(execution);
        }
        info!("re-enqueued {} pending executions", count);
        Ok(())
    }

    /// The bus this controller consumes events from.
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Validate and persist a job; with `should_run`, also spawn its
    /// first execution.
    pub async fn submit_job(&self, spec: JobSpec, should_run: bool) -> CoreResult<JobId> {
        self.lifecycle.submit_job(spec, should_run).await
    }

    /// Spawn a fresh execution of a persisted job.
    pub async fn start_job(&self, job_id: &JobId) -> CoreResult<JobId> {
        self.lifecycle.start_job(job_id).await
    }

    /// Re-enqueue an execution with recovery intent.
    pub async fn restart_execution(&self, ex_id: &ExId) -> CoreResult<()> {
        self.lifecycle.restart_execution(ex_id).await
    }

    /// Fan a command out to the execution's nodes and write the mapped
    /// status.
    pub async fn notify(
        &self,
        ex_id: &ExId,
        command: ControlCommand,
    ) -> CoreResult<ExecutionStatus> {
        self.lifecycle.notify(ex_id, command).await
    }

    /// Merge a partial into a job record.
    pub async fn update_job(&self, job_id: &JobId, update: JobUpdate) -> CoreResult<Job> {
        self.store.update_job(job_id, update).await
    }

    /// Merge a partial into an execution record.
    pub async fn update_execution(
        &self,
        ex_id: &ExId,
        update: ExecutionUpdate,
    ) -> CoreResult<()> {
        self.store.update_execution(ex_id, update).await
    }

    /// Fetch a job.
    pub async fn job(&self, job_id: &JobId) -> CoreResult<Job> {
        self.store.job(job_id).await
    }

    /// Page through jobs, oldest first.
    pub async fn jobs(&self, from: usize, size: usize) -> CoreResult<Vec<Job>> {
        self.store.search_jobs(from, size, Sort::created_asc()).await
    }

    /// Fetch an execution.
    pub async fn execution(&self, ex_id: &ExId) -> CoreResult<Execution> {
        self.store.execution(ex_id).await
    }

    /// Page through executions, optionally restricted to one status.
    pub async fn execution_contexts(
        &self,
        status: Option<ExecutionStatus>,
        from: usize,
        size: usize,
    ) -> CoreResult<Vec<Execution>> {
        let query = match status {
            Some(status) => ExecutionQuery::with_status(status),
            None => ExecutionQuery::all(),
        };
        self.store
            .search_executions(&query, from, size, Sort::created_asc())
            .await
    }

    /// Every execution ID of a job, oldest first.
    pub async fn executions(&self, job_id: &JobId) -> CoreResult<Vec<ExId>> {
        let records = self
            .store
            .search_executions(
                &ExecutionQuery::for_job(job_id.clone()),
                0,
                MAX_SEARCH_SIZE,
                Sort::created_asc(),
            )
            .await?;
        Ok(records.into_iter().map(|ex| ex.ex_id).collect())
    }

    /// The newest execution of a job. With `only_if_active`, `Ok(None)`
    /// when no active execution exists; otherwise a missing execution is
    /// `NotFound`.
    pub async fn latest_execution(
        &self,
        job_id: &JobId,
        only_if_active: bool,
    ) -> CoreResult<Option<Execution>> {
        let query = if only_if_active {
            ExecutionQuery::active().and_job(job_id.clone())
        } else {
            ExecutionQuery::for_job(job_id.clone())
        };

        let mut results = self
            .store
            .search_executions(&query, 0, 1, Sort::created_desc())
            .await?;
        match results.pop() {
            Some(execution) => Ok(Some(execution)),
            None if only_if_active => Ok(None),
            None => Err(CoreError::execution_not_found(job_id)),
        }
    }

    /// Stop both loops, terminalize every active execution, and close the
    /// store. Per-execution errors are logged, never fatal; the store is
    /// closed regardless.
    pub async fn shutdown(&self) -> CoreResult<()> {
        let _ = self.shutdown_tx.send(true);

        let active = match self
            .store
            .search_executions(&ExecutionQuery::active(), 0, MAX_SEARCH_SIZE, Sort::created_asc())
            .await
        {
            Ok(records) => records,
            Err(CoreError::StoreNotInitialized) => Vec::new(),
            Err(e) => {
                error!("could not enumerate active executions: {}", e);
                Vec::new()
            }
        };

        for execution in &active {
            if let Err(e) = self
                .lifecycle
                .notify_nodes(&execution.ex_id, MessageKind::Stop, false)
                .await
            {
                error!("failed to stop execution {}: {}", execution.ex_id, e);
            }
            if let Err(e) = self
                .lifecycle
                .set_status(&execution.ex_id, ExecutionStatus::Terminated)
                .await
            {
                error!("failed to terminate execution {}: {}", execution.ex_id, e);
            }
        }
        if !active.is_empty() {
            info!("terminated {} active executions", active.len());
        }

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }

        self.store.close().await
    }
}
