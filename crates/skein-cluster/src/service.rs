//! The cluster-service trait and its supporting types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use skein_types::{ConnectionList, ExId, Execution};

use crate::error::ClusterResult;
use crate::message::ClusterMessage;

/// Unique identifier of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A cluster node currently hosting processes for an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    pub node_id: NodeId,

    /// Reachable hostname of the node.
    pub hostname: String,
}

impl Node {
    /// Create a node descriptor.
    pub fn new(node_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            node_id: NodeId::new(node_id),
            hostname: hostname.into(),
        }
    }
}

/// Moderator answer for one declared connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorVerdict {
    /// Connection type the verdict applies to.
    #[serde(rename = "type")]
    pub connection_type: String,

    /// Named connection the verdict applies to.
    pub connection: String,

    /// Whether work touching this connection may run now.
    #[serde(rename = "canRun")]
    pub can_run: bool,
}

/// Capability contract over the live cluster.
///
/// The scheduling core is the only caller; implementations wrap whatever
/// node transport the deployment uses. Every method is a suspension point
/// for the core's cooperative model, so implementations should bound
/// their own latency.
#[async_trait]
pub trait ClusterService: Send + Sync {
    /// Number of worker slots currently free across the cluster.
    async fn available_workers(&self) -> ClusterResult<u32>;

    /// Place the slicer for an execution. With `recover` set, the slicer
    /// restores the execution's prior state instead of starting fresh.
    async fn allocate_slicer(&self, execution: &Execution, recover: bool) -> ClusterResult<()>;

    /// Place `count` worker processes for an execution.
    async fn allocate_workers(&self, execution: &Execution, count: u32) -> ClusterResult<()>;

    /// Nodes currently hosting processes of an execution. With
    /// `slicer_only`, just the node hosting the slicer.
    async fn find_nodes_for_execution(
        &self,
        ex_id: &ExId,
        slicer_only: bool,
    ) -> ClusterResult<Vec<Node>>;

    /// Deliver a message to one node.
    async fn notify_node(&self, node_id: &NodeId, message: ClusterMessage) -> ClusterResult<()>;

    /// Ask the moderator whether each declared connection is currently
    /// below its throttle limits. One verdict per connection.
    async fn check_moderator(
        &self,
        connections: &ConnectionList,
    ) -> ClusterResult<Vec<ModeratorVerdict>>;
}
