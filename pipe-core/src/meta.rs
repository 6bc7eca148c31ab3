//! Pipe meta data model.
//!
//! A `PipeMeta` is the unit of reconciliation. The coordinator's copy describes the desired state
//! of a pipe, while every node keeps its own copy describing what it actually runs. Nodes only
//! ever mutate their own copy.

use std::collections::BTreeMap;
use std::fmt;

use crate::index::ProgressIndex;

/// The ID of a node in the cluster.
pub type NodeId = i32;

/// The ID of a unit of parallel assignment within a pipe, typically a consensus group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionId(pub i32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of a pipe.
///
/// The creation time disambiguates successive pipes which reuse the same name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipeIdentity {
    pub name: String,
    pub creation_time: i64,
}

impl PipeIdentity {
    pub fn new(name: impl Into<String>, creation_time: i64) -> Self {
        Self { name: name.into(), creation_time }
    }
}

impl fmt::Display for PipeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.creation_time)
    }
}

/// The immutable definition of a pipe.
///
/// Equality is structural. Two static metas which differ in any field describe different pipes,
/// even when their names are the same.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipeStaticMeta {
    pub name: String,
    pub creation_time: i64,
    /// Parameters of the collector stage, which pulls events out of the storage engine.
    pub collector_attributes: BTreeMap<String, String>,
    /// Parameters of the processor stage.
    pub processor_attributes: BTreeMap<String, String>,
    /// Parameters of the connector stage, which ships events to the sink.
    pub connector_attributes: BTreeMap<String, String>,
}

impl PipeStaticMeta {
    pub fn new(name: impl Into<String>, creation_time: i64) -> Self {
        Self { name: name.into(), creation_time, ..Default::default() }
    }

    pub fn identity(&self) -> PipeIdentity {
        PipeIdentity::new(self.name.clone(), self.creation_time)
    }
}

/// The status of a pipe.
///
/// `Dropped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipeStatus {
    Stopped,
    Running,
    Dropped,
}

impl fmt::Display for PipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Dropped => write!(f, "DROPPED"),
        }
    }
}

/// The assignment of a pipe partition to a node, along with the progress made on it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskAssignment {
    /// The node which owns the task of this partition.
    pub node_id: NodeId,
    /// The progress made on this partition so far.
    pub progress_index: ProgressIndex,
    /// Failure messages reported by the task of this partition, oldest first.
    pub exception_messages: Vec<String>,
}

impl TaskAssignment {
    pub fn new(node_id: NodeId, progress_index: ProgressIndex) -> Self {
        Self { node_id, progress_index, exception_messages: vec![] }
    }

    /// Join the given progress into the recorded progress of this partition.
    ///
    /// Progress is never overwritten, so reports arriving out of order can not move it backwards.
    pub fn update_progress_index(&mut self, progress_index: &ProgressIndex) {
        self.progress_index = self.progress_index.merge(progress_index);
    }

    /// Record a failure message, unless an identical message is already recorded.
    pub fn track_exception(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.exception_messages.contains(&message) {
            self.exception_messages.push(message);
        }
    }

    pub fn clear_exception_messages(&mut self) {
        self.exception_messages.clear();
    }
}

/// The mutable runtime state of a pipe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipeRuntimeMeta {
    pub status: PipeStatus,
    pub assignments: BTreeMap<PartitionId, TaskAssignment>,
    /// The latest fatal failure reported for this pipe.
    pub last_exception: Option<String>,
}

impl PipeRuntimeMeta {
    pub fn new(status: PipeStatus, assignments: BTreeMap<PartitionId, TaskAssignment>) -> Self {
        Self { status, assignments, last_exception: None }
    }
}

impl Default for PipeRuntimeMeta {
    fn default() -> Self {
        Self::new(PipeStatus::Stopped, BTreeMap::new())
    }
}

/// A pipe's static definition along with its runtime state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipeMeta {
    pub static_meta: PipeStaticMeta,
    pub runtime_meta: PipeRuntimeMeta,
}

impl PipeMeta {
    pub fn new(static_meta: PipeStaticMeta, runtime_meta: PipeRuntimeMeta) -> Self {
        Self { static_meta, runtime_meta }
    }

    pub fn name(&self) -> &str {
        &self.static_meta.name
    }

    pub fn creation_time(&self) -> i64 {
        self.static_meta.creation_time
    }

    pub fn identity(&self) -> PipeIdentity {
        self.static_meta.identity()
    }

    pub fn status(&self) -> PipeStatus {
        self.runtime_meta.status
    }

    /// Check if this pipe carries the given identity.
    pub fn has_identity(&self, identity: &PipeIdentity) -> bool {
        self.static_meta.name == identity.name && self.static_meta.creation_time == identity.creation_time
    }
}
