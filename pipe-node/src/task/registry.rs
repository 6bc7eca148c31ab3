use std::collections::BTreeMap;

use pipe_core::{PartitionId, PipeIdentity, PipeMeta};

use super::PipeTask;

/// The tasks of one pipe, keyed by partition.
pub type PipeTasks = BTreeMap<PartitionId, Box<dyn PipeTask>>;

/// The tasks running on this node, keyed by pipe identity and then by partition.
///
/// This is plain storage; callers are expected to serialize access.
#[derive(Default)]
pub struct PipeTaskRegistry {
    tasks: BTreeMap<PipeIdentity, PipeTasks>,
}

impl PipeTaskRegistry {
    /// Register the tasks of a pipe, merging them into any tasks already registered for it.
    pub fn add_pipe_tasks(&mut self, identity: PipeIdentity, tasks: PipeTasks) {
        self.tasks.entry(identity).or_default().extend(tasks);
    }

    pub fn add_pipe_task(&mut self, identity: PipeIdentity, partition: PartitionId, task: Box<dyn PipeTask>) {
        self.tasks.entry(identity).or_default().insert(partition, task);
    }

    pub fn get_pipe_tasks_mut(&mut self, identity: &PipeIdentity) -> Option<&mut PipeTasks> {
        self.tasks.get_mut(identity)
    }

    pub fn get_pipe_task_mut(&mut self, identity: &PipeIdentity, partition: PartitionId) -> Option<&mut Box<dyn PipeTask>> {
        self.tasks.get_mut(identity).and_then(|tasks| tasks.get_mut(&partition))
    }

    pub fn remove_pipe_tasks(&mut self, identity: &PipeIdentity) -> Option<PipeTasks> {
        self.tasks.remove(identity)
    }

    pub fn remove_pipe_task(&mut self, identity: &PipeIdentity, partition: PartitionId) -> Option<Box<dyn PipeTask>> {
        self.tasks.get_mut(identity).and_then(|tasks| tasks.remove(&partition))
    }

    /// The partitions of the given pipe which have a task on this node.
    pub fn partitions(&self, identity: &PipeIdentity) -> Vec<PartitionId> {
        self.tasks.get(identity).map(|tasks| tasks.keys().copied().collect()).unwrap_or_default()
    }
}

/// The pipe metas known to this node, keyed by pipe name.
#[derive(Default)]
pub struct PipeMetaKeeper {
    metas: BTreeMap<String, PipeMeta>,
}

impl PipeMetaKeeper {
    pub fn add_pipe_meta(&mut self, meta: PipeMeta) {
        self.metas.insert(meta.name().to_string(), meta);
    }

    pub fn get_pipe_meta(&self, name: &str) -> Option<&PipeMeta> {
        self.metas.get(name)
    }

    pub fn get_pipe_meta_mut(&mut self, name: &str) -> Option<&mut PipeMeta> {
        self.metas.get_mut(name)
    }

    pub fn remove_pipe_meta(&mut self, name: &str) -> Option<PipeMeta> {
        self.metas.remove(name)
    }

    /// All pipe metas, ordered by pipe name.
    pub fn pipe_metas(&self) -> impl Iterator<Item = &PipeMeta> {
        self.metas.values()
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }
}
