use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::agent::HeartbeatResponse;
use crate::error::PipeError;
use crate::task::{PipeTask, PipeTaskBuilder};
use pipe_core::proto::decode_pipe_meta;
use pipe_core::{NodeId, PartitionId, PipeIdentity, PipeMeta, PipeRuntimeMeta, PipeStaticMeta, PipeStatus, ProgressIndex, TaskAssignment};

/// A lifecycle call issued against a pipe task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskAction {
    Create,
    Start,
    Stop,
    Drop,
}

/// A lifecycle call recorded by a `RecordingTaskBuilder`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskCall {
    pub pipe: PipeIdentity,
    pub partition: PartitionId,
    pub action: TaskAction,
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<TaskCall>,
    /// Calls which should fail, a `None` partition matching every partition of the pipe.
    failures: HashSet<(PipeIdentity, Option<PartitionId>, TaskAction)>,
}

/// A task builder whose tasks record every lifecycle call made against them.
///
/// Calls are recorded even when they are configured to fail.
#[derive(Clone, Default)]
pub struct RecordingTaskBuilder {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingTaskBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls recorded so far, in call order.
    pub fn calls(&self) -> Vec<TaskCall> {
        self.state.lock().map(|state| state.calls.clone()).unwrap_or_default()
    }

    /// All calls recorded so far, clearing the record.
    pub fn take_calls(&self) -> Vec<TaskCall> {
        self.state.lock().map(|mut state| std::mem::take(&mut state.calls)).unwrap_or_default()
    }

    /// The number of recorded calls of the given action.
    pub fn count(&self, action: TaskAction) -> usize {
        self.calls().iter().filter(|call| call.action == action).count()
    }

    /// Make every call of the given action against the given pipe fail.
    pub fn fail_on(&self, pipe: &PipeIdentity, action: TaskAction) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert((pipe.clone(), None, action));
        }
    }

    /// Make every call of the given action against the given pipe partition fail.
    pub fn fail_on_partition(&self, pipe: &PipeIdentity, partition: PartitionId, action: TaskAction) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert((pipe.clone(), Some(partition), action));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.clear();
        }
    }

    fn record(&self, pipe: &PipeIdentity, partition: PartitionId, action: TaskAction) -> Result<()> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => bail!("recording task builder state poisoned"),
        };
        state.calls.push(TaskCall { pipe: pipe.clone(), partition, action });
        let fails = state.failures.contains(&(pipe.clone(), None, action)) || state.failures.contains(&(pipe.clone(), Some(partition), action));
        if fails {
            bail!("injected {:?} failure for {}/{}", action, pipe, partition);
        }
        Ok(())
    }
}

impl PipeTaskBuilder for RecordingTaskBuilder {
    fn build(&self, static_meta: &PipeStaticMeta, partition: PartitionId, _assignment: &TaskAssignment) -> Result<Box<dyn PipeTask>> {
        Ok(Box::new(RecordingTask {
            pipe: static_meta.identity(),
            partition,
            builder: self.clone(),
        }))
    }
}

struct RecordingTask {
    pipe: PipeIdentity,
    partition: PartitionId,
    builder: RecordingTaskBuilder,
}

impl PipeTask for RecordingTask {
    fn create(&mut self) -> Result<()> {
        self.builder.record(&self.pipe, self.partition, TaskAction::Create)
    }

    fn start(&mut self) -> Result<()> {
        self.builder.record(&self.pipe, self.partition, TaskAction::Start)
    }

    fn stop(&mut self) -> Result<()> {
        self.builder.record(&self.pipe, self.partition, TaskAction::Stop)
    }

    fn drop_task(&mut self) -> Result<()> {
        self.builder.record(&self.pipe, self.partition, TaskAction::Drop)
    }
}

/// Build a pipe meta with the given partition owners.
pub fn pipe_meta(name: &str, creation_time: i64, status: PipeStatus, owners: &[(i32, NodeId)]) -> PipeMeta {
    let assignments: BTreeMap<PartitionId, TaskAssignment> = owners
        .iter()
        .map(|(partition, node_id)| (PartitionId(*partition), TaskAssignment::new(*node_id, ProgressIndex::Minimum)))
        .collect();
    PipeMeta::new(PipeStaticMeta::new(name, creation_time), PipeRuntimeMeta::new(status, assignments))
}

/// Decode the pipe metas carried by the given heartbeat response.
pub fn decode_heartbeat(res: &HeartbeatResponse) -> Result<Vec<PipeMeta>, PipeError> {
    res.pipe_meta_list.iter().flatten().map(|record| decode_pipe_meta(record)).collect()
}
