//! Skein cluster-service capability contract.
//!
//! The scheduling core never talks to cluster nodes directly; it consumes
//! the [`ClusterService`] trait defined here. Implementations report
//! available worker capacity, place slicers and workers for an execution,
//! deliver [`ClusterMessage`]s to nodes, and answer moderator queries
//! about external data-source throttling.
//!
//! # Example: delivering a pause
//!
//! ```ignore
//! use skein_cluster::{ClusterMessage, ClusterService, MessageKind};
//! use skein_types::ControlCommand;
//!
//! let kind = MessageKind::for_command(ControlCommand::Pause);
//! let nodes = cluster.find_nodes_for_execution(&ex_id, true).await?;
//! for node in &nodes {
//!     cluster
//!         .notify_node(&node.node_id, ClusterMessage::new(kind, ex_id.clone()))
//!         .await?;
//! }
//! ```

pub mod error;
pub mod message;
pub mod service;

pub use error::{ClusterError, ClusterResult};
pub use message::{ClusterMessage, MessageKind};
pub use service::{ClusterService, ModeratorVerdict, Node, NodeId};
