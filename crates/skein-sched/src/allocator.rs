//! The allocation loop: drains the pending queue one execution at a time
//! when cluster capacity allows.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::time::interval;
use tracing::{debug, error, warn};

use skein_cluster::ClusterService;
use skein_types::{Execution, ExecutionStatus, ExecutionUpdate};

use crate::lifecycle::ExecutionLifecycle;
use crate::queue::AdmissionQueues;

/// Schedules pending executions onto the cluster.
///
/// Only this task dequeues `pending`, so at most one allocation is ever in
/// flight. It wakes on every enqueue and keeps a periodic tick as the
/// safety net for cluster capacity changes it cannot observe.
pub struct Allocator {
    cluster: Arc<dyn ClusterService>,
    lifecycle: Arc<ExecutionLifecycle>,
    queues: Arc<Mutex<AdmissionQueues>>,
    wake: Arc<Notify>,
    tick: Duration,
    min_workers: u32,
}

impl Allocator {
    /// Wire the allocator to its collaborators.
    pub fn new(
        cluster: Arc<dyn ClusterService>,
        lifecycle: Arc<ExecutionLifecycle>,
        queues: Arc<Mutex<AdmissionQueues>>,
        wake: Arc<Notify>,
        tick: Duration,
        min_workers: u32,
    ) -> Self {
        Self {
            cluster,
            lifecycle,
            queues,
            wake,
            tick,
            min_workers,
        }
    }

    /// Run until shutdown flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
                _ = shutdown.changed() => break,
            }
            self.drain().await;
        }
        debug!("allocator stopped");
    }

    /// Schedule queued executions until the queue empties or capacity
    /// runs out. Per-execution failures are contained; the drain moves on.
    pub(crate) async fn drain(&self) {
        loop {
            match self.cluster.available_workers().await {
                Ok(available) if available >= self.min_workers => {}
                Ok(available) => {
                    debug!("deferring scheduling, {} workers available", available);
                    break;
                }
                Err(e) => {
                    warn!("available-workers check failed: {}", e);
                    break;
                }
            }

            let next = { self.queues.lock().await.pending.dequeue() };
            let Some(execution) = next else { break };
            self.allocate(execution).await;
        }
    }

    /// Place one execution: slicer first, then workers. Worker-alloc
    /// failure leaves the execution in `initializing` for cluster events
    /// to resolve; slicer-alloc failure marks it `failed`.
    async fn allocate(&self, execution: Execution) {
        let ex_id = execution.ex_id.clone();
        let recover = execution.recover_execution;

        let mut update = ExecutionUpdate::new();
        if recover {
            // Persist the recovery intent so the completion handler can
            // tell a recovered run from a fresh one.
            update = update.with_recover_execution(true);
        }
        if let Err(e) = self
            .lifecycle
            .set_status_with(&ex_id, ExecutionStatus::Scheduling, update)
            .await
        {
            error!("failed to mark execution {} scheduling: {}", ex_id, e);
            return;
        }

        if let Err(cause) = self.cluster.allocate_slicer(&execution, recover).await {
            error!("slicer allocation failed for execution {}: {}", ex_id, cause);
            if let Err(e) = self
                .lifecycle
                .set_status_with(
                    &ex_id,
                    ExecutionStatus::Failed,
                    ExecutionUpdate::new().with_failure_reason(cause.to_string()),
                )
                .await
            {
                error!("failed to mark execution {} failed: {}", ex_id, e);
            }
            return;
        }

        if let Err(e) = self
            .lifecycle
            .set_status(&ex_id, ExecutionStatus::Initializing)
            .await
        {
            error!("failed to mark execution {} initializing: {}", ex_id, e);
            return;
        }

        if let Err(e) = self
            .cluster
            .allocate_workers(&execution, execution.workers)
            .await
        {
            warn!("worker allocation failed for execution {}: {}", ex_id, e);
        }
    }
}
