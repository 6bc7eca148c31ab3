//! Pipe task proxies.
//!
//! A pipe task drives the data pipeline stages of one partition of one pipe. The stages
//! themselves live behind the task; the controller only ever sees the four lifecycle calls.

mod local;
mod registry;
#[cfg(test)]
mod registry_test;

use anyhow::Result;

use pipe_core::{PartitionId, PipeStaticMeta, TaskAssignment};

pub use local::LocalPipeTaskBuilder;
pub use registry::{PipeMetaKeeper, PipeTaskRegistry, PipeTasks};

/// The lifecycle contract of a pipe partition task.
///
/// Every call is idempotent and may fail. Failures are surfaced to the reconciliation pass which
/// issued the call.
pub trait PipeTask: Send {
    /// Set up the pipeline stages of this task without starting them.
    fn create(&mut self) -> Result<()>;
    /// Start moving data.
    fn start(&mut self) -> Result<()>;
    /// Stop moving data, keeping the pipeline stages around.
    fn stop(&mut self) -> Result<()>;
    /// Tear down the pipeline stages of this task.
    fn drop_task(&mut self) -> Result<()>;
}

/// A factory of pipe partition tasks.
pub trait PipeTaskBuilder: Send + Sync {
    /// Build the task of the given partition of the given pipe.
    ///
    /// The returned task has not been created yet.
    fn build(&self, static_meta: &PipeStaticMeta, partition: PartitionId, assignment: &TaskAssignment) -> Result<Box<dyn PipeTask>>;
}
