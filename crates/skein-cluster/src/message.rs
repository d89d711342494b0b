//! Messages delivered to cluster nodes.

use serde::{Deserialize, Serialize};

use skein_types::{ControlCommand, ExId};

/// The kinds of message a node understands for a running execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Stop producing and processing slices.
    Pause,
    /// Resume a paused execution.
    Resume,
    /// Restart the execution's processes.
    Restart,
    /// Shut the execution's processes down.
    Stop,
}

impl MessageKind {
    /// The wire subject of this message kind.
    pub fn subject(&self) -> &'static str {
        match self {
            MessageKind::Pause => "cluster:job:pause",
            MessageKind::Resume => "cluster:job:resume",
            MessageKind::Restart => "cluster:job:restart",
            MessageKind::Stop => "cluster:job:stop",
        }
    }

    /// The command→message map: every control command fans out as one of
    /// the four node message kinds.
    pub fn for_command(command: ControlCommand) -> Self {
        match command {
            ControlCommand::Pause | ControlCommand::ModeratorPaused => MessageKind::Pause,
            ControlCommand::Resume => MessageKind::Resume,
            ControlCommand::Restart => MessageKind::Restart,
            ControlCommand::Stop | ControlCommand::Terminated => MessageKind::Stop,
        }
    }
}

/// A message addressed to the nodes running one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMessage {
    /// What the node should do.
    pub kind: MessageKind,

    /// The execution the message concerns.
    pub ex_id: ExId,
}

impl ClusterMessage {
    /// Create a message for an execution.
    pub fn new(kind: MessageKind, ex_id: ExId) -> Self {
        Self { kind, ex_id }
    }
}
