use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::agent::AgentHandle;
use crate::assigner::ProgressIndexAssigner;
use pipe_core::{PartitionId, PipeIdentity, PipeStaticMeta, ProgressIndex, TaskAssignment};

use super::{PipeTask, PipeTaskBuilder};

/// The lifecycle state of a local pipe task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LocalTaskState {
    Built,
    Created,
    Running,
    Stopped,
    Dropped,
}

/// Builds tasks which drive the pipeline stages of this node.
pub struct LocalPipeTaskBuilder {
    assigner: Arc<ProgressIndexAssigner>,
    handle: AgentHandle,
}

impl LocalPipeTaskBuilder {
    pub fn new(assigner: Arc<ProgressIndexAssigner>, handle: AgentHandle) -> Self {
        Self { assigner, handle }
    }
}

impl PipeTaskBuilder for LocalPipeTaskBuilder {
    fn build(&self, static_meta: &PipeStaticMeta, partition: PartitionId, _assignment: &TaskAssignment) -> Result<Box<dyn PipeTask>> {
        Ok(Box::new(LocalPipeTask {
            identity: static_meta.identity(),
            partition,
            state: LocalTaskState::Built,
            assigner: self.assigner.clone(),
            handle: self.handle.clone(),
        }))
    }
}

/// A task driving the pipeline stages of one partition of a pipe on this node.
struct LocalPipeTask {
    identity: PipeIdentity,
    partition: PartitionId,
    state: LocalTaskState,
    assigner: Arc<ProgressIndexAssigner>,
    handle: AgentHandle,
}

impl LocalPipeTask {
    fn transition(&mut self, state: LocalTaskState) {
        tracing::debug!(pipe = %self.identity, partition = %self.partition, from = ?self.state, to = ?state, "pipe task transition");
        self.state = state;
    }

    fn report_progress(&self, index: ProgressIndex) {
        if let Err(err) = self.handle.report_progress(self.identity.clone(), self.partition, index) {
            tracing::warn!(pipe = %self.identity, partition = %self.partition, error = ?err, "error reporting progress of pipe task");
        }
    }

    /// Build the error of a rejected lifecycle call, reporting it to the agent as well.
    fn rejected(&self, reason: &str) -> anyhow::Error {
        let message = format!("pipe task {}/{} {}", self.identity, self.partition, reason);
        if let Err(err) = self.handle.report_exception(self.identity.clone(), Some(self.partition), message.clone()) {
            tracing::warn!(pipe = %self.identity, partition = %self.partition, error = ?err, "error reporting failure of pipe task");
        }
        anyhow!(message)
    }
}

impl PipeTask for LocalPipeTask {
    fn create(&mut self) -> Result<()> {
        match self.state {
            LocalTaskState::Built => (),
            LocalTaskState::Dropped => return Err(self.rejected("has already been dropped")),
            _ => return Ok(()),
        }
        self.transition(LocalTaskState::Created);

        // Data already on disk when the task comes up is tagged with a recover index, so that
        // its progress is tracked apart from live replication.
        self.report_progress(self.assigner.recover_index());
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        match self.state {
            LocalTaskState::Created | LocalTaskState::Stopped => self.transition(LocalTaskState::Running),
            LocalTaskState::Running => return Ok(()),
            LocalTaskState::Built => return Err(self.rejected("has not been created")),
            LocalTaskState::Dropped => return Err(self.rejected("has already been dropped")),
        }

        // Live replication picks up from a fresh simple index of this node.
        self.report_progress(self.assigner.next_simple_index());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        match self.state {
            LocalTaskState::Running => self.transition(LocalTaskState::Stopped),
            LocalTaskState::Created | LocalTaskState::Stopped => (),
            LocalTaskState::Built => return Err(self.rejected("has not been created")),
            LocalTaskState::Dropped => return Err(self.rejected("has already been dropped")),
        }
        Ok(())
    }

    fn drop_task(&mut self) -> Result<()> {
        if self.state != LocalTaskState::Dropped {
            self.transition(LocalTaskState::Dropped);
        }
        Ok(())
    }
}
