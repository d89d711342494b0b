//! Recording mock of the cluster service for unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use skein_cluster::{
    ClusterError, ClusterMessage, ClusterResult, ClusterService, ModeratorVerdict, Node, NodeId,
};
use skein_types::{ConnectionList, ExId, Execution};

/// Scriptable in-memory cluster: capacity, nodes, failure switches, and a
/// record of everything the core asked of it.
pub struct MockCluster {
    available_workers: AtomicU32,
    fail_slicer: AtomicBool,
    fail_workers: AtomicBool,
    fail_notifications: AtomicBool,
    fail_moderator: AtomicBool,
    moderator_calls: AtomicUsize,
    blocked: Mutex<Vec<(String, String)>>,
    last_moderator_query: Mutex<Option<ConnectionList>>,
    nodes: Mutex<Vec<Node>>,
    node_queries: Mutex<Vec<bool>>,
    notifications: Mutex<Vec<(NodeId, ClusterMessage)>>,
    slicer_allocations: Mutex<Vec<(ExId, bool)>>,
    worker_allocations: Mutex<Vec<(ExId, u32)>>,
}

impl MockCluster {
    /// A cluster with five free workers, no nodes, and nothing failing.
    pub fn new() -> Self {
        Self {
            available_workers: AtomicU32::new(5),
            fail_slicer: AtomicBool::new(false),
            fail_workers: AtomicBool::new(false),
            fail_notifications: AtomicBool::new(false),
            fail_moderator: AtomicBool::new(false),
            moderator_calls: AtomicUsize::new(0),
            blocked: Mutex::new(Vec::new()),
            last_moderator_query: Mutex::new(None),
            nodes: Mutex::new(Vec::new()),
            node_queries: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            slicer_allocations: Mutex::new(Vec::new()),
            worker_allocations: Mutex::new(Vec::new()),
        }
    }

    pub fn set_available_workers(&self, count: u32) {
        self.available_workers.store(count, Ordering::SeqCst);
    }

    pub fn fail_slicer_allocation(&self, fail: bool) {
        self.fail_slicer.store(fail, Ordering::SeqCst);
    }

    pub fn fail_worker_allocation(&self, fail: bool) {
        self.fail_workers.store(fail, Ordering::SeqCst);
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub fn fail_moderator(&self, fail: bool) {
        self.fail_moderator.store(fail, Ordering::SeqCst);
    }

    /// Make the moderator report `canRun: false` for one connection.
    pub fn block_connection(&self, connection_type: &str, connection: &str) {
        self.blocked
            .lock()
            .unwrap()
            .push((connection_type.to_string(), connection.to_string()));
    }

    /// Clear every blocked connection.
    pub fn unblock_all(&self) {
        self.blocked.lock().unwrap().clear();
    }

    pub fn add_node(&self, node_id: &str, hostname: &str) {
        self.nodes.lock().unwrap().push(Node::new(node_id, hostname));
    }

    pub fn moderator_calls(&self) -> usize {
        self.moderator_calls.load(Ordering::SeqCst)
    }

    pub fn last_moderator_query(&self) -> Option<ConnectionList> {
        self.last_moderator_query.lock().unwrap().clone()
    }

    /// The `slicer_only` flag of every node lookup, in call order.
    pub fn node_queries(&self) -> Vec<bool> {
        self.node_queries.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(NodeId, ClusterMessage)> {
        self.notifications.lock().unwrap().clone()
    }

    /// Every slicer placement as `(ex_id, recover)`, in call order.
    pub fn slicer_allocations(&self) -> Vec<(ExId, bool)> {
        self.slicer_allocations.lock().unwrap().clone()
    }

    pub fn worker_allocations(&self) -> Vec<(ExId, u32)> {
        self.worker_allocations.lock().unwrap().clone()
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterService for MockCluster {
    async fn available_workers(&self) -> ClusterResult<u32> {
        Ok(self.available_workers.load(Ordering::SeqCst))
    }

    async fn allocate_slicer(&self, execution: &Execution, recover: bool) -> ClusterResult<()> {
        if self.fail_slicer.load(Ordering::SeqCst) {
            return Err(ClusterError::SlicerAllocation("no slicer slot".into()));
        }
        self.slicer_allocations
            .lock()
            .unwrap()
            .push((execution.ex_id.clone(), recover));
        Ok(())
    }

    async fn allocate_workers(&self, execution: &Execution, count: u32) -> ClusterResult<()> {
        if self.fail_workers.load(Ordering::SeqCst) {
            return Err(ClusterError::WorkerAllocation("no worker slots".into()));
        }
        self.worker_allocations
            .lock()
            .unwrap()
            .push((execution.ex_id.clone(), count));
        Ok(())
    }

    async fn find_nodes_for_execution(
        &self,
        _ex_id: &ExId,
        slicer_only: bool,
    ) -> ClusterResult<Vec<Node>> {
        self.node_queries.lock().unwrap().push(slicer_only);
        let nodes = self.nodes.lock().unwrap();
        if slicer_only {
            Ok(nodes.first().cloned().into_iter().collect())
        } else {
            Ok(nodes.clone())
        }
    }

    async fn notify_node(&self, node_id: &NodeId, message: ClusterMessage) -> ClusterResult<()> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(ClusterError::NodeUnreachable(node_id.to_string()));
        }
        self.notifications
            .lock()
            .unwrap()
            .push((node_id.clone(), message));
        Ok(())
    }

    async fn check_moderator(
        &self,
        connections: &ConnectionList,
    ) -> ClusterResult<Vec<ModeratorVerdict>> {
        self.moderator_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_moderator_query.lock().unwrap() = Some(connections.clone());

        if self.fail_moderator.load(Ordering::SeqCst) {
            return Err(ClusterError::Moderator("moderator offline".into()));
        }

        let blocked = self.blocked.lock().unwrap();
        Ok(connections
            .iter()
            .map(|conn| {
                let is_blocked = blocked
                    .iter()
                    .any(|(t, c)| t == &conn.connection_type && c == &conn.connection);
                ModeratorVerdict {
                    connection_type: conn.connection_type,
                    connection: conn.connection,
                    can_run: !is_blocked,
                }
            })
            .collect())
    }
}
