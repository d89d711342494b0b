//! Process-wide event bus.
//!
//! Cluster and slicer signals arrive as one tagged [`ClusterEvent`] sum
//! consumed by the event router; asset-resolution requests go out on
//! their own channel and come back through one-shot replies keyed by a
//! freshly generated [`CorrelationId`], so concurrent submissions never
//! cross-wire responses.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use skein_cluster::NodeId;
use skein_types::{AssetId, ConnectionRef, ExId, OpConfig, SlicerStats};

/// Opaque short ID tying an asset-resolution reply to its request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    const LEN: usize = 10;

    /// Generate a fresh ID.
    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..Self::LEN].to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An external event the lifecycle reacts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// The allocated slicer reported readiness.
    SlicerInitialized {
        /// Execution that is now producing slices.
        ex_id: ExId,
    },

    /// The execution ran to completion.
    JobFinished {
        /// Execution that finished.
        ex_id: ExId,
        /// Final slicer counters.
        stats: SlicerStats,
    },

    /// The execution failed terminally.
    JobFailure {
        /// Execution that failed.
        ex_id: ExId,
        /// Why, if the cluster knows.
        reason: Option<String>,
        /// Final slicer counters, if any were reported.
        stats: Option<SlicerStats>,
    },

    /// The slicer process failed.
    SlicerFailure {
        /// Execution whose slicer failed.
        ex_id: ExId,
        /// Why, if the cluster knows.
        reason: Option<String>,
        /// Final slicer counters, if any were reported.
        stats: Option<SlicerStats>,
    },

    /// The slicer reported a processing error; terminal failure may
    /// follow as a separate `JobFailure`.
    ProcessingError {
        /// Execution accumulating errors.
        ex_id: ExId,
    },

    /// The slicer rewrote the pipeline snapshot.
    PipelineUpdate {
        /// Execution to update.
        ex_id: ExId,
        /// New pipeline snapshot.
        operations: Vec<OpConfig>,
    },

    /// A node hosting the execution disconnected and its processes were
    /// cleaned up.
    CleanupJob {
        /// Execution affected.
        ex_id: ExId,
        /// Node that went away.
        node_id: NodeId,
    },

    /// The moderator throttled the listed connections.
    ModeratorPause {
        /// Connections now over their limits.
        connections: Vec<ConnectionRef>,
    },

    /// The moderator released the listed connections.
    ModeratorResume {
        /// Connections now below their limits.
        connections: Vec<ConnectionRef>,
    },
}

/// A request for the asset subsystem to map bundle names to content IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRequest {
    /// Human-readable bundle names.
    pub assets: Vec<String>,
    /// Reply key.
    #[serde(rename = "_msgID")]
    pub correlation: CorrelationId,
}

/// The asset subsystem's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssetResponse {
    /// Every name resolved, in request order.
    Resolved(Vec<AssetId>),
    /// Resolution failed.
    Failed(String),
}

/// The bus itself: one single-consumer channel per consumer plus the
/// one-shot reply registry.
pub struct EventBus {
    events_tx: mpsc::UnboundedSender<ClusterEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ClusterEvent>>>,
    assets_tx: mpsc::UnboundedSender<AssetRequest>,
    assets_rx: Mutex<Option<mpsc::UnboundedReceiver<AssetRequest>>>,
    replies: Mutex<rustc_hash::FxHashMap<CorrelationId, oneshot::Sender<AssetResponse>>>,
}

impl EventBus {
    /// Create a bus with both receivers unclaimed.
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (assets_tx, assets_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            assets_tx,
            assets_rx: Mutex::new(Some(assets_rx)),
            replies: Mutex::new(rustc_hash::FxHashMap::default()),
        }
    }

    /// Publish a cluster event. Dropped with a debug log once the router
    /// has shut down.
    pub fn emit(&self, event: ClusterEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("event dropped: router has shut down");
        }
    }

    /// Claim the cluster-event receiver. The router calls this once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ClusterEvent>> {
        self.events_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Claim the asset-request receiver. The asset subsystem calls this
    /// once.
    pub fn take_asset_requests(&self) -> Option<mpsc::UnboundedReceiver<AssetRequest>> {
        self.assets_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Publish an asset-resolution request and return the one-shot reply
    /// slot for its correlation ID.
    pub fn request_assets(&self, assets: Vec<String>) -> oneshot::Receiver<AssetResponse> {
        let correlation = CorrelationId::generate();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(correlation.clone(), reply_tx);

        let request = AssetRequest {
            assets,
            correlation: correlation.clone(),
        };
        if self.assets_tx.send(request).is_err() {
            // Receiver slot dropped; the pending oneshot sender is removed
            // so the caller observes a closed reply channel.
            self.replies
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&correlation);
        }

        reply_rx
    }

    /// Deliver an asset-resolution reply. Returns false when no request
    /// is waiting under the correlation ID.
    pub fn resolve_assets(&self, correlation: &CorrelationId, response: AssetResponse) -> bool {
        let sender = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(correlation);

        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
