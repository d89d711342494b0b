//! Execution records and the status model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypesError;
use crate::job::{AssetId, ConnectionList, Job, JobId, OpConfig, RecordContext};

/// Unique identifier for one run of a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExId(pub Uuid);

impl ExId {
    /// Create a new random execution ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an execution ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ExId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of an execution.
///
/// The first seven statuses are active; everything else is terminal. The
/// ordering of [`ACTIVE_STATUSES`] is load-bearing and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Admitted, waiting to be scheduled.
    Pending,
    /// Picked up by the allocator, slicer allocation in progress.
    Scheduling,
    /// Slicer placed, worker allocation requested.
    Initializing,
    /// Slicer reported ready; slices are flowing.
    Running,
    /// A processing error was reported; terminal failure may follow.
    Failing,
    /// Paused by a user command.
    Paused,
    /// Paused because a declared external connection is throttled.
    ModeratorPaused,
    /// Ran to completion.
    Completed,
    /// Stopped by a user command.
    Stopped,
    /// Refused before scheduling.
    Rejected,
    /// Terminal failure.
    Failed,
    /// Stopped by controller shutdown.
    Terminated,
}

/// The active statuses, in lifecycle order. Membership here is exactly
/// what [`ExecutionStatus::is_active`] reports.
pub const ACTIVE_STATUSES: [ExecutionStatus; 7] = [
    ExecutionStatus::Pending,
    ExecutionStatus::Scheduling,
    ExecutionStatus::Initializing,
    ExecutionStatus::Running,
    ExecutionStatus::Failing,
    ExecutionStatus::Paused,
    ExecutionStatus::ModeratorPaused,
];

impl ExecutionStatus {
    /// True for the seven active statuses.
    pub fn is_active(&self) -> bool {
        ACTIVE_STATUSES.contains(self)
    }

    /// True for every status outside the active set.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// The wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Scheduling => "scheduling",
            ExecutionStatus::Initializing => "initializing",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Failing => "failing",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::ModeratorPaused => "moderator_paused",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Stopped => "stopped",
            ExecutionStatus::Rejected => "rejected",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "scheduling" => Ok(ExecutionStatus::Scheduling),
            "initializing" => Ok(ExecutionStatus::Initializing),
            "running" => Ok(ExecutionStatus::Running),
            "failing" => Ok(ExecutionStatus::Failing),
            "paused" => Ok(ExecutionStatus::Paused),
            "moderator_paused" => Ok(ExecutionStatus::ModeratorPaused),
            "completed" => Ok(ExecutionStatus::Completed),
            "stopped" => Ok(ExecutionStatus::Stopped),
            "rejected" => Ok(ExecutionStatus::Rejected),
            "failed" => Ok(ExecutionStatus::Failed),
            "terminated" => Ok(ExecutionStatus::Terminated),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

/// A command accepted by `notify` or fanned out to cluster nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Stop the execution.
    Stop,
    /// Pause slice production.
    Pause,
    /// Resume a paused execution.
    Resume,
    /// Pause because an external connection is throttled.
    ModeratorPaused,
    /// Restart the execution on its nodes.
    Restart,
    /// Controller-initiated stop during shutdown.
    Terminated,
}

impl ControlCommand {
    /// The status a `notify` with this command writes, or `None` for
    /// message-only commands (`restart`, `terminated`).
    pub fn target_status(&self) -> Option<ExecutionStatus> {
        match self {
            ControlCommand::Stop => Some(ExecutionStatus::Stopped),
            ControlCommand::Pause => Some(ExecutionStatus::Paused),
            ControlCommand::Resume => Some(ExecutionStatus::Running),
            ControlCommand::ModeratorPaused => Some(ExecutionStatus::ModeratorPaused),
            ControlCommand::Restart | ControlCommand::Terminated => None,
        }
    }

    /// True when the command is delivered to the slicer node only;
    /// false fans out to every node running the execution.
    pub fn targets_slicer_only(&self) -> bool {
        matches!(
            self,
            ControlCommand::Pause | ControlCommand::Resume | ControlCommand::ModeratorPaused
        )
    }

    /// The wire name of this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Stop => "stop",
            ControlCommand::Pause => "pause",
            ControlCommand::Resume => "resume",
            ControlCommand::ModeratorPaused => "moderator_paused",
            ControlCommand::Restart => "restart",
            ControlCommand::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ControlCommand {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(ControlCommand::Stop),
            "pause" => Ok(ControlCommand::Pause),
            "resume" => Ok(ControlCommand::Resume),
            "moderator_paused" => Ok(ControlCommand::ModeratorPaused),
            "restart" => Ok(ControlCommand::Restart),
            "terminated" => Ok(ControlCommand::Terminated),
            other => Err(TypesError::UnknownCommand(other.to_string())),
        }
    }
}

/// Error marker on terminal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorFlag {
    /// The execution accumulated errors.
    #[serde(rename = "true")]
    Errors,
    /// The execution completed after a recovery.
    #[serde(rename = "recovered")]
    Recovered,
}

/// Counters reported by a slicer on completion or failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlicerStats {
    /// Slices processed to completion.
    pub processed: u64,

    /// Slices that failed permanently.
    pub failed: u64,

    /// Slices produced but not yet consumed.
    pub queued: u64,

    /// Slicer-specific extras, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Inputs for creating an execution record: the job snapshot plus the
/// resolved asset IDs that travel with it for worker spawning.
#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    /// Back-reference to the job.
    pub job_id: JobId,
    /// Job name at submission time.
    pub name: String,
    /// Worker count at submission time.
    pub workers: u32,
    /// Pipeline snapshot.
    pub operations: Vec<OpConfig>,
    /// Resolved asset content IDs.
    pub assets: Vec<AssetId>,
    /// Moderator dependencies snapshot.
    pub moderator: Option<ConnectionList>,
}

impl ExecutionSpec {
    /// Snapshot a job into an execution spec.
    pub fn from_job(job: &Job, assets: Vec<AssetId>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            name: job.spec.name.clone(),
            workers: job.spec.workers,
            operations: job.spec.operations.clone(),
            assets,
            moderator: job.spec.moderator.clone(),
        }
    }
}

/// One run of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution identifier, assigned on creation.
    pub ex_id: ExId,

    /// Back-reference to the job.
    pub job_id: JobId,

    /// Job name at submission time.
    pub name: String,

    /// Worker count at submission time.
    pub workers: u32,

    /// Pipeline snapshot, updatable by `slicer:job:update`.
    pub operations: Vec<OpConfig>,

    /// Resolved asset content IDs for worker spawning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<AssetId>,

    /// Moderator dependencies snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator: Option<ConnectionList>,

    /// Current lifecycle status.
    #[serde(rename = "_status")]
    pub status: ExecutionStatus,

    /// Collection marker.
    #[serde(rename = "_context")]
    pub context: RecordContext,

    /// Set once on create, never modified.
    #[serde(rename = "_created")]
    pub created: DateTime<Utc>,

    /// Advances on every mutation.
    #[serde(rename = "_updated")]
    pub updated: DateTime<Utc>,

    /// Why the execution failed, set on failure transitions.
    #[serde(rename = "_failureReason", default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Final slicer counters, set on terminal transitions.
    #[serde(rename = "_slicer_stats", default, skip_serializing_if = "Option::is_none")]
    pub slicer_stats: Option<SlicerStats>,

    /// Error marker, set on failure or recovered completion.
    #[serde(rename = "_has_errors", default, skip_serializing_if = "Option::is_none")]
    pub has_errors: Option<ErrorFlag>,

    /// When set, the allocator resumes this execution's state instead of
    /// starting fresh.
    #[serde(rename = "_recover_execution", default, skip_serializing_if = "std::ops::Not::not")]
    pub recover_execution: bool,
}

/// Partial update applied to a persisted execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    /// Replace the status.
    pub status: Option<ExecutionStatus>,
    /// Replace the pipeline snapshot.
    pub operations: Option<Vec<OpConfig>>,
    /// Record a failure reason.
    pub failure_reason: Option<String>,
    /// Record final slicer counters.
    pub slicer_stats: Option<SlicerStats>,
    /// Record an error marker.
    pub has_errors: Option<ErrorFlag>,
    /// Set or clear the recovery flag.
    pub recover_execution: Option<bool>,
}

impl ExecutionUpdate {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// An update that only moves the status.
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Replace the pipeline snapshot.
    pub fn with_operations(mut self, operations: Vec<OpConfig>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Record a failure reason.
    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// Record final slicer counters.
    pub fn with_slicer_stats(mut self, stats: SlicerStats) -> Self {
        self.slicer_stats = Some(stats);
        self
    }

    /// Record an error marker.
    pub fn with_has_errors(mut self, flag: ErrorFlag) -> Self {
        self.has_errors = Some(flag);
        self
    }

    /// Set the recovery flag.
    pub fn with_recover_execution(mut self, recover: bool) -> Self {
        self.recover_execution = Some(recover);
        self
    }

    /// Apply this update to an execution in place. Does not touch
    /// `updated`; the store owns that stamp.
    pub fn apply(self, execution: &mut Execution) {
        if let Some(status) = self.status {
            execution.status = status;
        }
        if let Some(operations) = self.operations {
            execution.operations = operations;
        }
        if let Some(reason) = self.failure_reason {
            execution.failure_reason = Some(reason);
        }
        if let Some(stats) = self.slicer_stats {
            execution.slicer_stats = Some(stats);
        }
        if let Some(flag) = self.has_errors {
            execution.has_errors = Some(flag);
        }
        if let Some(recover) = self.recover_execution {
            execution.recover_execution = recover;
        }
    }
}
