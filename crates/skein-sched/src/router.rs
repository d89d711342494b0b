//! Dispatches bus events to lifecycle transitions.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error};

use crate::bus::ClusterEvent;
use crate::error::CoreResult;
use crate::lifecycle::ExecutionLifecycle;

/// Single-consumer dispatch loop over the cluster-event channel.
///
/// Each event runs to completion before the next is dispatched. Handler
/// failures are logged at the boundary; the loop never dies to one.
pub struct EventRouter {
    lifecycle: Arc<ExecutionLifecycle>,
    events: mpsc::UnboundedReceiver<ClusterEvent>,
}

impl EventRouter {
    /// Wire the router to the lifecycle and the claimed event receiver.
    pub fn new(
        lifecycle: Arc<ExecutionLifecycle>,
        events: mpsc::UnboundedReceiver<ClusterEvent>,
    ) -> Self {
        Self { lifecycle, events }
    }

    /// Run until shutdown flips or every bus sender is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => {
                        if let Err(e) = self.dispatch(event).await {
                            error!("event handler failed: {}", e);
                        }
                    }
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("event router stopped");
    }

    /// Route one event to its lifecycle transition.
    pub(crate) async fn dispatch(&self, event: ClusterEvent) -> CoreResult<()> {
        match event {
            ClusterEvent::SlicerInitialized { ex_id } => {
                self.lifecycle.on_slicer_initialized(&ex_id).await
            }
            ClusterEvent::JobFinished { ex_id, stats } => {
                self.lifecycle.on_job_finished(&ex_id, stats).await
            }
            ClusterEvent::JobFailure {
                ex_id,
                reason,
                stats,
            }
            | ClusterEvent::SlicerFailure {
                ex_id,
                reason,
                stats,
            } => {
                self.lifecycle
                    .on_execution_failure(&ex_id, reason, stats)
                    .await
            }
            ClusterEvent::ProcessingError { ex_id } => {
                self.lifecycle.on_processing_error(&ex_id).await
            }
            ClusterEvent::PipelineUpdate { ex_id, operations } => {
                self.lifecycle.on_pipeline_update(&ex_id, operations).await
            }
            ClusterEvent::CleanupJob { ex_id, node_id } => {
                self.lifecycle.on_cleanup_job(&ex_id, &node_id).await
            }
            ClusterEvent::ModeratorPause { connections } => {
                self.lifecycle.on_moderator_pause(&connections).await
            }
            ClusterEvent::ModeratorResume { connections } => {
                self.lifecycle.on_moderator_resume(&connections).await
            }
        }
    }
}
