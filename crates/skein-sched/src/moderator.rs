//! Admission gate over external data-source moderation.

use std::sync::Arc;

use tracing::debug;

use skein_cluster::ClusterService;
use skein_types::ConnectionList;

use crate::error::CoreResult;

/// Connection type the controller's own backing store lives under.
pub const STATE_CONNECTION_TYPE: &str = "elasticsearch";

/// Decides whether an execution's declared external connections are
/// currently below throttle limits.
///
/// The process-wide state-store connection is injected into every checked
/// list so each job is also gated on the availability of the controller's
/// own backing store.
pub struct ModeratorGate {
    cluster: Arc<dyn ClusterService>,
    state_connection: String,
}

impl ModeratorGate {
    /// Create a gate that always includes the named state-store
    /// connection in its checks.
    pub fn new(cluster: Arc<dyn ClusterService>, state_connection: impl Into<String>) -> Self {
        Self {
            cluster,
            state_connection: state_connection.into(),
        }
    }

    /// Whether an execution with the given declared connections may run
    /// now. `None` or an empty list admits immediately without consulting
    /// the cluster. A failed moderator call fails the whole check.
    pub async fn admits(&self, connections: Option<&ConnectionList>) -> CoreResult<bool> {
        let Some(declared) = connections else {
            return Ok(true);
        };
        if declared.is_empty() {
            return Ok(true);
        }

        let mut checked = declared.clone();
        checked.insert(STATE_CONNECTION_TYPE, self.state_connection.clone());

        let verdicts = self.cluster.check_moderator(&checked).await?;
        let blocked: Vec<_> = verdicts.iter().filter(|v| !v.can_run).collect();
        if !blocked.is_empty() {
            debug!(
                "moderator blocked {} of {} connections",
                blocked.len(),
                verdicts.len()
            );
        }

        Ok(blocked.is_empty())
    }
}
