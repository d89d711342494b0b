//! Job records and their building blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Create a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque content identifier of a resolved asset bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    /// Create an asset ID from a resolved content hash.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a job runs once to completion or is restarted indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLifecycle {
    /// Run to completion and stop.
    #[default]
    Once,
    /// Keep the execution running until explicitly stopped.
    Persistent,
}

/// One operator in the processing pipeline.
///
/// The first operation of a pipeline reads slices; subsequent operations
/// transform or write them. Operator-specific settings travel in the
/// flattened map untouched by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpConfig {
    /// Registered operator name.
    #[serde(rename = "_op")]
    pub op: String,

    /// Operator-specific configuration.
    #[serde(flatten)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl OpConfig {
    /// Create an operation with no extra configuration.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            config: serde_json::Map::new(),
        }
    }

    /// Add an operator setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// A reference to one named connection of a connection type, as carried by
/// moderator pause/resume events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRef {
    /// Connection type, e.g. `elasticsearch` or `kafka`.
    #[serde(rename = "type")]
    pub connection_type: String,

    /// Named connection within the type.
    pub connection: String,
}

impl ConnectionRef {
    /// Create a connection reference.
    pub fn new(connection_type: impl Into<String>, connection: impl Into<String>) -> Self {
        Self {
            connection_type: connection_type.into(),
            connection: connection.into(),
        }
    }
}

/// Declared external data-source connections a job reads or writes,
/// grouped by connection type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionList(pub rustc_hash::FxHashMap<String, Vec<String>>);

impl ConnectionList {
    /// Create an empty connection list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named connection under a type.
    pub fn with_connection(
        mut self,
        connection_type: impl Into<String>,
        connection: impl Into<String>,
    ) -> Self {
        self.insert(connection_type, connection);
        self
    }

    /// Insert a named connection under a type if not already present.
    pub fn insert(&mut self, connection_type: impl Into<String>, connection: impl Into<String>) {
        let connection = connection.into();
        let entries = self.0.entry(connection_type.into()).or_default();
        if !entries.contains(&connection) {
            entries.push(connection);
        }
    }

    /// True when no connections are declared.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Total number of declared connections.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// True when any of the given references matches a declared connection.
    pub fn touches(&self, refs: &[ConnectionRef]) -> bool {
        refs.iter().any(|r| {
            self.0
                .get(&r.connection_type)
                .is_some_and(|names| names.contains(&r.connection))
        })
    }

    /// Iterate over `(type, connection)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = ConnectionRef> + '_ {
        self.0.iter().flat_map(|(connection_type, names)| {
            names
                .iter()
                .map(move |name| ConnectionRef::new(connection_type.clone(), name.clone()))
        })
    }
}

/// Collection marker carried by every persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordContext {
    /// A job template record.
    #[serde(rename = "job")]
    Job,
    /// An execution record.
    #[serde(rename = "ex")]
    Execution,
}

/// User-supplied job template, as accepted by `submit_job`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Human-readable job name.
    pub name: String,

    /// Run-once or persistent.
    #[serde(default)]
    pub lifecycle: JobLifecycle,

    /// Number of worker processes to allocate.
    pub workers: u32,

    /// Operator pipeline: a reader followed by processors.
    pub operations: Vec<OpConfig>,

    /// Human-readable asset bundle names, resolved to content IDs before
    /// an execution is spawned. The job record keeps the names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<String>,

    /// Declared external data-source dependencies gating admission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moderator: Option<ConnectionList>,
}

impl JobSpec {
    /// Create a spec with the given name, worker count, and pipeline.
    pub fn new(name: impl Into<String>, workers: u32, operations: Vec<OpConfig>) -> Self {
        Self {
            name: name.into(),
            lifecycle: JobLifecycle::default(),
            workers,
            operations,
            assets: Vec::new(),
            moderator: None,
        }
    }

    /// Set the lifecycle.
    pub fn with_lifecycle(mut self, lifecycle: JobLifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Reference an asset bundle by name.
    pub fn with_asset(mut self, name: impl Into<String>) -> Self {
        self.assets.push(name.into());
        self
    }

    /// Declare moderator dependencies.
    pub fn with_moderator(mut self, connections: ConnectionList) -> Self {
        self.moderator = Some(connections);
        self
    }
}

/// A persisted job template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier, assigned on creation.
    pub job_id: JobId,

    /// The user-supplied template.
    #[serde(flatten)]
    pub spec: JobSpec,

    /// Collection marker.
    #[serde(rename = "_context")]
    pub context: RecordContext,

    /// Set once on create, never modified.
    #[serde(rename = "_created")]
    pub created: DateTime<Utc>,

    /// Advances on every mutation.
    #[serde(rename = "_updated")]
    pub updated: DateTime<Utc>,
}

/// Partial update applied to a persisted job.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// Replace the job name.
    pub name: Option<String>,
    /// Replace the worker count.
    pub workers: Option<u32>,
    /// Replace the operator pipeline.
    pub operations: Option<Vec<OpConfig>>,
    /// Replace the asset references.
    pub assets: Option<Vec<String>>,
    /// Replace the moderator dependencies.
    pub moderator: Option<ConnectionList>,
}

impl JobUpdate {
    /// An empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the worker count.
    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Replace the operator pipeline.
    pub fn with_operations(mut self, operations: Vec<OpConfig>) -> Self {
        self.operations = Some(operations);
        self
    }

    /// Apply this update to a spec in place.
    pub fn apply(self, spec: &mut JobSpec) {
        if let Some(name) = self.name {
            spec.name = name;
        }
        if let Some(workers) = self.workers {
            spec.workers = workers;
        }
        if let Some(operations) = self.operations {
            spec.operations = operations;
        }
        if let Some(assets) = self.assets {
            spec.assets = assets;
        }
        if let Some(moderator) = self.moderator {
            spec.moderator = Some(moderator);
        }
    }
}
