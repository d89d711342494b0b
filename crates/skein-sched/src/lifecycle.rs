//! The execution lifecycle: submission, admission, commands, and the
//! event-driven transitions.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use skein_cluster::{ClusterError, ClusterMessage, ClusterService, MessageKind, NodeId};
use skein_types::{
    AssetId, ConnectionRef, ControlCommand, ErrorFlag, ExId, ExecutionSpec, ExecutionStatus,
    ExecutionUpdate, Job, JobId, JobSpec, OpConfig, SlicerStats,
};

use crate::bus::{AssetResponse, EventBus};
use crate::error::{CoreError, CoreResult};
use crate::moderator::ModeratorGate;
use crate::persistence::{ExecutionQuery, Sort, StateStorage, MAX_SEARCH_SIZE};
use crate::queue::AdmissionQueues;
use crate::validator::JobValidator;

/// Drives executions through their lifecycle.
///
/// All mutation of execution records flows through here; the allocator,
/// the event router, and the controller's public API are its callers.
pub struct ExecutionLifecycle {
    store: Arc<dyn StateStorage>,
    cluster: Arc<dyn ClusterService>,
    bus: Arc<EventBus>,
    queues: Arc<Mutex<AdmissionQueues>>,
    gate: ModeratorGate,
    validator: Arc<dyn JobValidator>,
    allocator_wake: Arc<Notify>,
}

impl ExecutionLifecycle {
    /// Wire the lifecycle to its collaborators.
    pub fn new(
        store: Arc<dyn StateStorage>,
        cluster: Arc<dyn ClusterService>,
        bus: Arc<EventBus>,
        queues: Arc<Mutex<AdmissionQueues>>,
        gate: ModeratorGate,
        validator: Arc<dyn JobValidator>,
        allocator_wake: Arc<Notify>,
    ) -> Self {
        Self {
            store,
            cluster,
            bus,
            queues,
            gate,
            validator,
            allocator_wake,
        }
    }

    /// Validate and persist a job; with `should_run`, also spawn its
    /// first execution.
    pub async fn submit_job(&self, spec: JobSpec, should_run: bool) -> CoreResult<JobId> {
        let assets = self.resolve_assets(&spec.assets).await?;
        self.validator.validate(&spec)?;

        let job = self.store.create_job(spec).await?;
        info!("job {} submitted", job.job_id);

        if !should_run {
            return Ok(job.job_id);
        }
        self.create_execution(&job, assets).await
    }

    /// Spawn a fresh execution of a persisted job.
    pub async fn start_job(&self, job_id: &JobId) -> CoreResult<JobId> {
        let job = self.store.job(job_id).await?;
        let assets = self.resolve_assets(&job.spec.assets).await?;
        self.create_execution(&job, assets).await
    }

    /// Persist an execution of the job, write its first durable status,
    /// and admit it into a queue.
    pub(crate) async fn create_execution(
        &self,
        job: &Job,
        assets: Vec<AssetId>,
    ) -> CoreResult<JobId> {
        let execution = self
            .store
            .create_execution(ExecutionSpec::from_job(job, assets))
            .await?;
        let ex_id = execution.ex_id.clone();

        // The first durable transition and the moderator consult run
        // concurrently; both must succeed.
        let (_, admitted) = tokio::try_join!(
            self.set_status(&ex_id, ExecutionStatus::Pending),
            self.gate.admits(execution.moderator.as_ref()),
        )?;

        let mut queues = self.queues.lock().await;
        if admitted {
            queues.pending.enqueue(execution);
            drop(queues);
            self.allocator_wake.notify_one();
            debug!("execution {} admitted to pending", ex_id);
        } else {
            queues.held.enqueue(execution);
            drop(queues);
            info!("execution {} held by moderator", ex_id);
        }

        Ok(job.job_id.clone())
    }

    /// Re-enqueue an execution with recovery intent. The status stays
    /// untouched until the allocator picks it up.
    pub async fn restart_execution(&self, ex_id: &ExId) -> CoreResult<()> {
        let mut execution = self.store.execution(ex_id).await?;
        match execution.status {
            ExecutionStatus::Completed => {
                return Err(CoreError::CompletedNotRestartable(ex_id.clone()))
            }
            ExecutionStatus::Scheduling => {
                return Err(CoreError::AlreadyScheduling(ex_id.clone()))
            }
            _ => {}
        }

        execution.recover_execution = true;
        let mut queues = self.queues.lock().await;
        queues.pending.enqueue(execution);
        drop(queues);
        self.allocator_wake.notify_one();

        info!("execution {} enqueued for recovery", ex_id);
        Ok(())
    }

    /// Fan a control command out to the execution's nodes, then write the
    /// status the command maps to. Message-only commands are rejected
    /// with `InvalidCommand`.
    pub async fn notify(
        &self,
        ex_id: &ExId,
        command: ControlCommand,
    ) -> CoreResult<ExecutionStatus> {
        let target = command
            .target_status()
            .ok_or_else(|| CoreError::InvalidCommand(command.to_string()))?;

        self.notify_nodes(
            ex_id,
            MessageKind::for_command(command),
            command.targets_slicer_only(),
        )
        .await?;

        self.store.execution(ex_id).await?;
        self.set_status(ex_id, target).await?;
        Ok(target)
    }

    /// Deliver one message kind to the nodes running an execution,
    /// collecting every response before reporting an aggregated failure.
    pub(crate) async fn notify_nodes(
        &self,
        ex_id: &ExId,
        kind: MessageKind,
        slicer_only: bool,
    ) -> CoreResult<()> {
        let nodes = self
            .cluster
            .find_nodes_for_execution(ex_id, slicer_only)
            .await?;

        let sends = nodes.iter().map(|node| {
            self.cluster
                .notify_node(&node.node_id, ClusterMessage::new(kind, ex_id.clone()))
        });
        let failures: Vec<String> = join_all(sends)
            .await
            .into_iter()
            .filter_map(|result| result.err())
            .map(|e| e.to_string())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::Notification(failures.join("; ")).into())
        }
    }

    /// Write a status transition.
    pub async fn set_status(&self, ex_id: &ExId, status: ExecutionStatus) -> CoreResult<()> {
        self.set_status_with(ex_id, status, ExecutionUpdate::new())
            .await
    }

    /// Write a status transition along with terminal metadata.
    pub async fn set_status_with(
        &self,
        ex_id: &ExId,
        status: ExecutionStatus,
        mut metadata: ExecutionUpdate,
    ) -> CoreResult<()> {
        metadata.status = Some(status);
        self.store.update_execution(ex_id, metadata).await?;
        debug!("execution {} is now {}", ex_id, status);
        Ok(())
    }

    /// Map asset bundle names to content IDs through the asset
    /// subsystem. No names, no round-trip.
    async fn resolve_assets(&self, names: &[String]) -> CoreResult<Vec<AssetId>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let reply = self.bus.request_assets(names.to_vec());
        match reply.await {
            Err(_) => Err(CoreError::AssetResolution(
                "asset service unavailable".into(),
            )),
            Ok(AssetResponse::Failed(reason)) => Err(CoreError::AssetResolution(reason)),
            Ok(AssetResponse::Resolved(ids)) => {
                if ids.len() != names.len() {
                    return Err(CoreError::AssetResolution(format!(
                        "resolved {} of {} referenced assets",
                        ids.len(),
                        names.len()
                    )));
                }
                Ok(ids)
            }
        }
    }

    // --- event-driven transitions, called by the router ---

    /// `slicer:initialized`: the execution is running.
    pub(crate) async fn on_slicer_initialized(&self, ex_id: &ExId) -> CoreResult<()> {
        self.set_status(ex_id, ExecutionStatus::Running).await
    }

    /// `cluster:job_finished`: completed, with final stats; a recovered
    /// execution is marked as such.
    pub(crate) async fn on_job_finished(&self, ex_id: &ExId, stats: SlicerStats) -> CoreResult<()> {
        let execution = self.store.execution(ex_id).await?;

        let mut update = ExecutionUpdate::new().with_slicer_stats(stats);
        if execution.recover_execution {
            update = update.with_has_errors(ErrorFlag::Recovered);
        }
        self.set_status_with(ex_id, ExecutionStatus::Completed, update)
            .await?;
        info!("execution {} completed", ex_id);
        Ok(())
    }

    /// `cluster:job_failure` / `cluster:slicer_failure`: terminal failure.
    pub(crate) async fn on_execution_failure(
        &self,
        ex_id: &ExId,
        reason: Option<String>,
        stats: Option<SlicerStats>,
    ) -> CoreResult<()> {
        let mut update = ExecutionUpdate::new().with_has_errors(ErrorFlag::Errors);
        if let Some(reason) = reason {
            update = update.with_failure_reason(reason);
        }
        if let Some(stats) = stats {
            update = update.with_slicer_stats(stats);
        }
        self.set_status_with(ex_id, ExecutionStatus::Failed, update)
            .await
    }

    /// `slicer:processing:error`: errors are accumulating; the terminal
    /// transition arrives later as a job failure.
    pub(crate) async fn on_processing_error(&self, ex_id: &ExId) -> CoreResult<()> {
        self.set_status_with(
            ex_id,
            ExecutionStatus::Failing,
            ExecutionUpdate::new().with_has_errors(ErrorFlag::Errors),
        )
        .await
    }

    /// `slicer:job:update`: the slicer rewrote the pipeline snapshot.
    pub(crate) async fn on_pipeline_update(
        &self,
        ex_id: &ExId,
        operations: Vec<OpConfig>,
    ) -> CoreResult<()> {
        self.store
            .update_execution(ex_id, ExecutionUpdate::new().with_operations(operations))
            .await
    }

    /// `cluster_service:cleanup_job`: a node disconnected; recover the
    /// execution if it was making progress, otherwise ignore.
    pub(crate) async fn on_cleanup_job(&self, ex_id: &ExId, node_id: &NodeId) -> CoreResult<()> {
        let execution = self.store.execution(ex_id).await?;
        match execution.status {
            ExecutionStatus::Running | ExecutionStatus::Failing | ExecutionStatus::Paused => {
                info!("node {} lost, recovering execution {}", node_id, ex_id);
                self.restart_execution(ex_id).await
            }
            status => {
                debug!(
                    "ignoring cleanup for execution {} in status {}",
                    ex_id, status
                );
                Ok(())
            }
        }
    }

    /// `moderate_jobs:pause`: pause every running execution touching a
    /// throttled connection.
    pub(crate) async fn on_moderator_pause(
        &self,
        connections: &[ConnectionRef],
    ) -> CoreResult<()> {
        let candidates = self
            .store
            .search_executions(
                &ExecutionQuery::with_statuses([
                    ExecutionStatus::Running,
                    ExecutionStatus::Failing,
                ]),
                0,
                MAX_SEARCH_SIZE,
                Sort::created_asc(),
            )
            .await?;

        for execution in candidates
            .iter()
            .filter(|ex| ex.moderator.as_ref().is_some_and(|m| m.touches(connections)))
        {
            if let Err(e) = self
                .notify(&execution.ex_id, ControlCommand::ModeratorPaused)
                .await
            {
                error!("failed to pause execution {}: {}", execution.ex_id, e);
            }
        }
        Ok(())
    }

    /// `moderate_jobs:resume`: re-check held executions and promote the
    /// passing ones ahead of the pending queue, then resume paused
    /// executions touching the released connections.
    pub(crate) async fn on_moderator_resume(
        &self,
        connections: &[ConnectionRef],
    ) -> CoreResult<()> {
        let held = {
            let mut queues = self.queues.lock().await;
            queues.held.drain()
        };

        let mut passing = Vec::new();
        let mut still_held = Vec::new();
        for execution in held {
            match self.gate.admits(execution.moderator.as_ref()).await {
                Ok(true) => passing.push(execution),
                Ok(false) => still_held.push(execution),
                Err(e) => {
                    error!(
                        "moderator re-check failed for execution {}: {}",
                        execution.ex_id, e
                    );
                    still_held.push(execution);
                }
            }
        }

        let promoted = passing.len();
        {
            let mut queues = self.queues.lock().await;
            // Reversed front-inserts keep the held queue's relative order.
            for execution in passing.into_iter().rev() {
                queues.pending.enqueue_front(execution);
            }
            for execution in still_held {
                queues.held.enqueue(execution);
            }
        }
        if promoted > 0 {
            info!("moderator released {} held executions", promoted);
            self.allocator_wake.notify_one();
        }

        let paused = self
            .store
            .search_executions(
                &ExecutionQuery::with_status(ExecutionStatus::ModeratorPaused),
                0,
                MAX_SEARCH_SIZE,
                Sort::created_asc(),
            )
            .await?;
        for execution in paused
            .iter()
            .filter(|ex| ex.moderator.as_ref().is_some_and(|m| m.touches(connections)))
        {
            if let Err(e) = self.notify(&execution.ex_id, ControlCommand::Resume).await {
                error!("failed to resume execution {}: {}", execution.ex_id, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AssetRequest;
    use crate::persistence::MemoryStore;
    use crate::test_support::MockCluster;
    use crate::validator::BasicValidator;
    use skein_types::{ConnectionList, OpConfig};

    struct Harness {
        lifecycle: ExecutionLifecycle,
        store: Arc<MemoryStore>,
        cluster: Arc<MockCluster>,
        bus: Arc<EventBus>,
        queues: Arc<Mutex<AdmissionQueues>>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new("test"));
        let cluster = Arc::new(MockCluster::new());
        let bus = Arc::new(EventBus::new());
        let queues = Arc::new(Mutex::new(AdmissionQueues::new()));

        let lifecycle = ExecutionLifecycle::new(
            store.clone(),
            cluster.clone(),
            bus.clone(),
            queues.clone(),
            ModeratorGate::new(cluster.clone(), "default"),
            Arc::new(BasicValidator::new()),
            Arc::new(Notify::new()),
        );

        Harness {
            lifecycle,
            store,
            cluster,
            bus,
            queues,
        }
    }

    fn spec(name: &str) -> JobSpec {
        JobSpec::new(
            name,
            2,
            vec![OpConfig::new("es_reader"), OpConfig::new("es_writer")],
        )
    }

    /// Answer every asset request with one resolved ID per name.
    fn spawn_asset_responder(bus: &Arc<EventBus>) {
        let mut requests = bus.take_asset_requests().unwrap();
        let bus = bus.clone();
        tokio::spawn(async move {
            while let Some(AssetRequest {
                assets,
                correlation,
            }) = requests.recv().await
            {
                let ids = assets
                    .iter()
                    .map(|name| AssetId::new(format!("content-{name}")))
                    .collect();
                bus.resolve_assets(&correlation, AssetResponse::Resolved(ids));
            }
        });
    }

    #[tokio::test]
    async fn test_submit_persists_job_and_pending_execution() {
        let h = harness();

        let job_id = h.lifecycle.submit_job(spec("reindex"), true).await.unwrap();

        let job = h.store.job(&job_id).await.unwrap();
        assert_eq!(job.spec.name, "reindex");

        let executions = h
            .store
            .search_executions(
                &ExecutionQuery::for_job(job_id),
                0,
                100,
                Sort::created_asc(),
            )
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, ExecutionStatus::Pending);

        let queues = h.queues.lock().await;
        assert_eq!(queues.pending.len(), 1);
        assert!(queues.pending.contains(&executions[0].ex_id));
        assert!(queues.held.is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_run_creates_no_execution() {
        let h = harness();

        let job_id = h.lifecycle.submit_job(spec("later"), false).await.unwrap();
        assert!(h.store.job(&job_id).await.is_ok());

        let executions = h
            .store
            .search_executions(&ExecutionQuery::all(), 0, 100, Sort::created_asc())
            .await
            .unwrap();
        assert!(executions.is_empty());
        assert!(h.queues.lock().await.pending.is_empty());
    }

    #[tokio::test]
    async fn test_validation_failure_persists_nothing() {
        let h = harness();

        let mut bad = spec("broken");
        bad.operations.truncate(1);
        let err = h.lifecycle.submit_job(bad, true).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // The store was never written.
        assert!(matches!(
            h.store.search_jobs(0, 10, Sort::created_asc()).await,
            Err(CoreError::StoreNotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_assets_resolve_to_content_ids() {
        let h = harness();
        spawn_asset_responder(&h.bus);

        let spec = spec("with-assets")
            .with_asset("transforms")
            .with_asset("models");
        let job_id = h.lifecycle.submit_job(spec, true).await.unwrap();

        // The job keeps the human-readable names.
        let job = h.store.job(&job_id).await.unwrap();
        assert_eq!(job.spec.assets, vec!["transforms", "models"]);

        // The execution carries the resolved IDs.
        let executions = h
            .store
            .search_executions(
                &ExecutionQuery::for_job(job_id),
                0,
                100,
                Sort::created_asc(),
            )
            .await
            .unwrap();
        assert_eq!(
            executions[0].assets,
            vec![
                AssetId::new("content-transforms"),
                AssetId::new("content-models")
            ]
        );
    }

    #[tokio::test]
    async fn test_asset_count_mismatch_fails_submission() {
        let h = harness();

        // Responder that loses one asset.
        let mut requests = h.bus.take_asset_requests().unwrap();
        let bus = h.bus.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                bus.resolve_assets(
                    &request.correlation,
                    AssetResponse::Resolved(vec![AssetId::new("only-one")]),
                );
            }
        });

        let spec = spec("short").with_asset("a").with_asset("b");
        let err = h.lifecycle.submit_job(spec, true).await.unwrap_err();
        assert!(matches!(err, CoreError::AssetResolution(_)));
    }

    #[tokio::test]
    async fn test_moderator_refusal_lands_in_held() {
        let h = harness();
        h.cluster.block_connection("elasticsearch", "hot");

        let spec = spec("gated").with_moderator(
            ConnectionList::new().with_connection("elasticsearch", "hot"),
        );
        let job_id = h.lifecycle.submit_job(spec, true).await.unwrap();

        let executions = h
            .store
            .search_executions(
                &ExecutionQuery::for_job(job_id),
                0,
                100,
                Sort::created_asc(),
            )
            .await
            .unwrap();
        assert_eq!(executions[0].status, ExecutionStatus::Pending);

        let queues = h.queues.lock().await;
        assert!(queues.pending.is_empty());
        assert_eq!(queues.held.len(), 1);
    }

    #[tokio::test]
    async fn test_restart_rules() {
        let h = harness();
        h.lifecycle.submit_job(spec("restartable"), true).await.unwrap();
        let ex_id = {
            let queues = h.queues.lock().await;
            queues.pending.iter().next().unwrap().ex_id.clone()
        };

        h.lifecycle
            .set_status(&ex_id, ExecutionStatus::Completed)
            .await
            .unwrap();
        assert!(matches!(
            h.lifecycle.restart_execution(&ex_id).await,
            Err(CoreError::CompletedNotRestartable(_))
        ));

        h.lifecycle
            .set_status(&ex_id, ExecutionStatus::Scheduling)
            .await
            .unwrap();
        assert!(matches!(
            h.lifecycle.restart_execution(&ex_id).await,
            Err(CoreError::AlreadyScheduling(_))
        ));

        h.lifecycle
            .set_status(&ex_id, ExecutionStatus::Running)
            .await
            .unwrap();
        h.lifecycle.restart_execution(&ex_id).await.unwrap();

        // Status untouched, recovery flag set on the queued copy, tail
        // position (submit left one copy in front of it).
        let stored = h.store.execution(&ex_id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);

        let queues = h.queues.lock().await;
        let queued: Vec<_> = queues.pending.iter().collect();
        assert_eq!(queued.len(), 2);
        assert!(queued[1].recover_execution);
    }

    #[tokio::test]
    async fn test_notify_pause_then_resume() {
        let h = harness();
        h.cluster.add_node("node-1", "host-a");

        h.lifecycle.submit_job(spec("paused"), true).await.unwrap();
        let ex_id = {
            let queues = h.queues.lock().await;
            queues.pending.iter().next().unwrap().ex_id.clone()
        };

        let status = h
            .lifecycle
            .notify(&ex_id, ControlCommand::Pause)
            .await
            .unwrap();
        assert_eq!(status, ExecutionStatus::Paused);
        assert_eq!(
            h.store.execution(&ex_id).await.unwrap().status,
            ExecutionStatus::Paused
        );

        let status = h
            .lifecycle
            .notify(&ex_id, ControlCommand::Resume)
            .await
            .unwrap();
        assert_eq!(status, ExecutionStatus::Running);

        let sent = h.cluster.notifications();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.kind, MessageKind::Pause);
        assert_eq!(sent[1].1.kind, MessageKind::Resume);

        // Pause and resume go to the slicer node only.
        assert_eq!(h.cluster.node_queries(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_notify_rejects_message_only_commands() {
        let h = harness();
        let err = h
            .lifecycle
            .notify(&ExId::new(), ControlCommand::Restart)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand(_)));
    }

    #[tokio::test]
    async fn test_notify_aggregates_node_failures() {
        let h = harness();
        h.cluster.add_node("node-1", "host-a");
        h.cluster.add_node("node-2", "host-b");
        h.cluster.fail_notifications(true);

        h.lifecycle.submit_job(spec("unreachable"), true).await.unwrap();
        let ex_id = {
            let queues = h.queues.lock().await;
            queues.pending.iter().next().unwrap().ex_id.clone()
        };

        let err = h
            .lifecycle
            .notify(&ex_id, ControlCommand::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cluster(_)));

        // The status write never happened.
        assert_eq!(
            h.store.execution(&ex_id).await.unwrap().status,
            ExecutionStatus::Pending
        );
    }
}
