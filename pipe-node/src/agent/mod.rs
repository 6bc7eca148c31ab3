//! Pipe task agent.
//!
//! The agent converges the pipes running on this node towards the desired pipe topology held by
//! the coordinator. Every reconciliation pass diffs the desired pipe metas against the local ones
//! and issues the create, start, stop and drop calls needed to close the gap.
//!
//! ## Pipe Lifecycle
//! A pipe is always created in the `STOPPED` status, whatever its desired status, and started
//! afterwards when its desired status is `RUNNING`. From there it moves between `STOPPED` and
//! `RUNNING` until it is dropped. A drop marks the pipe `DROPPED` before any of its tasks are torn
//! down, so a pipe which failed to tear down is still visible as `DROPPED` on the next pass.
//!
//! ## Staleness
//! Every primitive operation names the pipe by name and creation time. An operation naming a
//! creation time other than the one recorded locally is a stale request and is ignored.
//!
//! ## Failures
//! Failures of a single pipe never abort a pass. They are collected and returned as one aggregate
//! error once every pipe has been processed.

mod ctl;
mod heartbeat;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Context;

use crate::error::PipeError;
use crate::task::{PipeMetaKeeper, PipeTaskBuilder, PipeTaskRegistry, PipeTasks};
use pipe_core::proto::encode_pipe_meta;
use pipe_core::{NodeId, PartitionId, PipeIdentity, PipeMeta, PipeStaticMeta, PipeStatus, ProgressIndex, TaskAssignment};

pub use ctl::{AgentCtl, AgentCtlMsg, AgentHandle};
pub use heartbeat::{HeartbeatRequest, HeartbeatResponse};

/// The reconciliation controller of this node.
///
/// All methods take `&mut self`; the owner is responsible for serializing access, see `AgentCtl`.
pub struct PipeTaskAgent {
    /// The ID of this node.
    node_id: NodeId,
    /// The factory of partition tasks.
    builder: Arc<dyn PipeTaskBuilder>,
    /// The pipe metas known to this node.
    metas: PipeMetaKeeper,
    /// The partition tasks running on this node.
    tasks: PipeTaskRegistry,
    /// Set once the node has begun shutting down.
    is_shutdown: bool,
}

impl PipeTaskAgent {
    /// Create a new instance.
    pub fn new(node_id: NodeId, builder: Arc<dyn PipeTaskBuilder>) -> Self {
        Self {
            node_id,
            builder,
            metas: PipeMetaKeeper::default(),
            tasks: PipeTaskRegistry::default(),
            is_shutdown: false,
        }
    }

    /// Get the local meta of the given pipe.
    pub fn get_pipe_meta(&self, name: &str) -> Option<&PipeMeta> {
        self.metas.get_pipe_meta(name)
    }

    /// All local pipe metas, ordered by pipe name.
    pub fn pipe_metas(&self) -> impl Iterator<Item = &PipeMeta> {
        self.metas.pipe_metas()
    }

    /// The partitions of the given pipe which have a task on this node.
    pub fn local_partitions(&self, identity: &PipeIdentity) -> Vec<PartitionId> {
        self.tasks.partitions(identity)
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    /// Run a reconciliation pass against the given desired pipe metas.
    ///
    /// The given metas are never modified. Per-pipe failures are collected and returned as a
    /// single `PipeError::Aggregate` once every pipe has been processed.
    #[tracing::instrument(level = "debug", skip(self, desired), fields(pipes = desired.len()))]
    pub fn handle_pipe_meta_changes(&mut self, desired: &[PipeMeta]) -> Result<(), PipeError> {
        if self.is_shutdown() {
            tracing::info!("node is shutting down, skipping pipe meta changes");
            return Ok(());
        }

        let mut errors = vec![];
        for meta in desired {
            if let Err(err) = self.reconcile_pipe(meta) {
                tracing::warn!(pipe = %meta.name(), error = %err, "failed to handle pipe meta changes");
                errors.push(err);
            }
        }

        // Drop every local pipe which the coordinator no longer knows about.
        let desired_names: HashSet<&str> = desired.iter().map(PipeMeta::name).collect();
        let orphans: Vec<PipeIdentity> = self
            .pipe_metas()
            .filter(|meta| !desired_names.contains(meta.name()))
            .map(PipeMeta::identity)
            .collect();
        for orphan in orphans {
            if let Err(err) = self.drop_pipe(&orphan) {
                tracing::warn!(pipe = %orphan.name, error = %err, "failed to drop orphaned pipe");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PipeError::Aggregate(errors))
        }
    }

    /// Converge a single pipe towards its desired meta.
    fn reconcile_pipe(&mut self, desired: &PipeMeta) -> Result<(), PipeError> {
        let local = match self.get_pipe_meta(desired.name()) {
            Some(local) => local,
            None => return self.create_and_start_pipe(desired),
        };

        if local.static_meta != desired.static_meta {
            let identity = local.identity();
            self.drop_pipe(&identity)?;
            return self.create_and_start_pipe(desired);
        }
        if desired.status() == PipeStatus::Dropped {
            return self.drop_pipe(&desired.identity());
        }
        if local.status() == PipeStatus::Dropped {
            return Err(PipeError::illegal_state(
                desired.name(),
                format!("pipe is {} on this node but {} is desired", PipeStatus::Dropped, desired.status()),
            ));
        }

        self.reconcile_partitions(desired)?;
        self.reconcile_status(desired)
    }

    fn create_and_start_pipe(&mut self, desired: &PipeMeta) -> Result<(), PipeError> {
        if self.create_pipe(desired)? {
            self.start_pipe(&desired.identity())?;
        }
        Ok(())
    }

    /// Converge the partitions of a local pipe towards the desired partitions.
    ///
    /// New tasks are started right away when the local pipe is running. The local status may be
    /// about to change, which the status reconciliation that follows takes care of.
    fn reconcile_partitions(&mut self, desired: &PipeMeta) -> Result<(), PipeError> {
        let identity = desired.identity();
        let local_status = self.local_status(&identity)?;

        for (partition, desired_assignment) in desired.runtime_meta.assignments.iter() {
            let local_owner = self
                .metas
                .get_pipe_meta(&identity.name)
                .and_then(|meta| meta.runtime_meta.assignments.get(partition))
                .map(|assignment| assignment.node_id);
            match local_owner {
                Some(owner) if owner == desired_assignment.node_id => continue,
                Some(owner) => {
                    tracing::debug!(pipe = %identity, %partition, from = owner, to = desired_assignment.node_id, "pipe partition moved");
                    self.drop_partition_task(&identity, *partition)?;
                }
                None => (),
            }
            self.create_partition_task(&desired.static_meta, *partition, desired_assignment)?;
            if local_status == PipeStatus::Running {
                if let Err(err) = self.start_partition_task(&identity, *partition) {
                    self.rollback_partition_task(&identity, *partition);
                    return Err(err);
                }
            }
        }

        // Leftover tasks of failed rollbacks count as removed too.
        let mut removed: BTreeSet<PartitionId> = self
            .metas
            .get_pipe_meta(&identity.name)
            .map(|meta| meta.runtime_meta.assignments.keys().copied().collect())
            .unwrap_or_default();
        removed.extend(self.tasks.partitions(&identity));
        removed.retain(|partition| !desired.runtime_meta.assignments.contains_key(partition));
        for partition in removed {
            self.drop_partition_task(&identity, partition)?;
        }
        Ok(())
    }

    /// Converge the status of a local pipe towards the desired status.
    fn reconcile_status(&mut self, desired: &PipeMeta) -> Result<(), PipeError> {
        let identity = desired.identity();
        let (desired_status, local_status) = (desired.status(), self.local_status(&identity)?);
        if desired_status == local_status {
            return Ok(());
        }
        match (desired_status, local_status) {
            (PipeStatus::Running, PipeStatus::Stopped) => self.start_pipe(&identity),
            (PipeStatus::Stopped, PipeStatus::Running) => self.stop_pipe(&identity),
            (PipeStatus::Dropped, _) => self.drop_pipe(&identity),
            (desired_status, local_status) => Err(PipeError::illegal_state(
                &identity.name,
                format!("can not move pipe from {} to {}", local_status, desired_status),
            )),
        }
    }

    fn local_status(&self, identity: &PipeIdentity) -> Result<PipeStatus, PipeError> {
        self.metas
            .get_pipe_meta(&identity.name)
            .map(PipeMeta::status)
            .ok_or_else(|| PipeError::illegal_state(&identity.name, "pipe vanished during reconciliation"))
    }

    /// Create the given pipe along with its local partition tasks.
    ///
    /// The local pipe always starts out `STOPPED`. Returns `true` if the caller should go on to
    /// start the pipe.
    #[tracing::instrument(level = "debug", skip(self, desired), fields(pipe = %desired.name(), creation_time = desired.creation_time()))]
    pub fn create_pipe(&mut self, desired: &PipeMeta) -> Result<bool, PipeError> {
        let identity = desired.identity();
        if let Some(existing) = self.metas.get_pipe_meta(&identity.name) {
            let existing_identity = existing.identity();
            if existing_identity.creation_time == identity.creation_time {
                match existing.status() {
                    PipeStatus::Stopped | PipeStatus::Running => {
                        tracing::info!(status = %existing.status(), "pipe has already been created, skipping creation");
                        return Ok(false);
                    }
                    PipeStatus::Dropped => {
                        tracing::info!("pipe has been dropped but not cleaned up, dropping and recreating it");
                    }
                }
            }
            self.drop_pipe(&existing_identity)?;
        }
        if desired.status() == PipeStatus::Dropped {
            tracing::info!("pipe is desired to be dropped, skipping creation");
            return Ok(false);
        }

        let mut created = PipeTasks::new();
        for (partition, assignment) in desired.runtime_meta.assignments.iter() {
            if assignment.node_id != self.node_id {
                continue;
            }
            let res = self
                .builder
                .build(&desired.static_meta, *partition, assignment)
                .and_then(|mut task| task.create().map(|_| task))
                .with_context(|| format!("error creating task of partition {}", partition));
            match res {
                Ok(task) => {
                    created.insert(*partition, task);
                }
                Err(err) => {
                    for (partition, mut task) in created {
                        if let Err(err) = task.drop_task() {
                            tracing::warn!(%partition, error = ?err, "error rolling back pipe task creation");
                        }
                    }
                    return Err(PipeError::for_pipe(&identity.name, err));
                }
            }
        }

        let mut local = desired.clone();
        local.runtime_meta.status = PipeStatus::Stopped;
        self.tasks.add_pipe_tasks(identity.clone(), created);
        self.metas.add_pipe_meta(local);
        tracing::info!(local_partitions = ?self.local_partitions(&identity), "pipe created");
        Ok(desired.status() == PipeStatus::Running)
    }

    /// Start the given pipe along with all of its local partition tasks.
    #[tracing::instrument(level = "debug", skip(self, identity), fields(pipe = %identity.name, creation_time = identity.creation_time))]
    pub fn start_pipe(&mut self, identity: &PipeIdentity) -> Result<(), PipeError> {
        let meta = match self.metas.get_pipe_meta_mut(&identity.name) {
            Some(meta) => meta,
            None => {
                tracing::info!("pipe has already been dropped or has not been created, skipping start");
                return Ok(());
            }
        };
        if meta.creation_time() != identity.creation_time {
            tracing::info!(local_creation_time = meta.creation_time(), "stale start request, skipping start");
            return Ok(());
        }
        match meta.status() {
            PipeStatus::Stopped => (),
            status @ (PipeStatus::Running | PipeStatus::Dropped) => {
                tracing::info!(%status, "pipe is not stopped, skipping start");
                return Ok(());
            }
        }

        let tasks = match self.tasks.get_pipe_tasks_mut(identity) {
            Some(tasks) => tasks,
            None => {
                tracing::info!("pipe has no task entry, skipping start");
                return Ok(());
            }
        };
        for (partition, task) in tasks.iter_mut() {
            task.start()
                .with_context(|| format!("error starting task of partition {}", partition))
                .map_err(|err| PipeError::for_pipe(&identity.name, err))?;
        }

        meta.runtime_meta.status = PipeStatus::Running;
        meta.runtime_meta.assignments.values_mut().for_each(TaskAssignment::clear_exception_messages);
        tracing::info!("pipe started");
        Ok(())
    }

    /// Stop the given pipe along with all of its local partition tasks.
    #[tracing::instrument(level = "debug", skip(self, identity), fields(pipe = %identity.name, creation_time = identity.creation_time))]
    pub fn stop_pipe(&mut self, identity: &PipeIdentity) -> Result<(), PipeError> {
        let meta = match self.metas.get_pipe_meta_mut(&identity.name) {
            Some(meta) => meta,
            None => {
                tracing::info!("pipe has already been dropped or has not been created, skipping stop");
                return Ok(());
            }
        };
        if meta.creation_time() != identity.creation_time {
            tracing::info!(local_creation_time = meta.creation_time(), "stale stop request, skipping stop");
            return Ok(());
        }
        match meta.status() {
            PipeStatus::Running => (),
            status @ (PipeStatus::Stopped | PipeStatus::Dropped) => {
                tracing::info!(%status, "pipe is not running, skipping stop");
                return Ok(());
            }
        }

        let tasks = match self.tasks.get_pipe_tasks_mut(identity) {
            Some(tasks) => tasks,
            None => {
                tracing::info!("pipe has no task entry, skipping stop");
                return Ok(());
            }
        };
        for (partition, task) in tasks.iter_mut() {
            task.stop()
                .with_context(|| format!("error stopping task of partition {}", partition))
                .map_err(|err| PipeError::for_pipe(&identity.name, err))?;
        }

        meta.runtime_meta.status = PipeStatus::Stopped;
        tracing::info!("pipe stopped");
        Ok(())
    }

    /// Drop the given pipe, tearing down all of its local partition tasks.
    ///
    /// Teardown is attempted for every task. When any of them fails, the failed tasks are kept
    /// and the pipe stays `DROPPED` so that a later pass retries, and the first failure is
    /// returned.
    #[tracing::instrument(level = "debug", skip(self, identity), fields(pipe = %identity.name, creation_time = identity.creation_time))]
    pub fn drop_pipe(&mut self, identity: &PipeIdentity) -> Result<(), PipeError> {
        let meta = match self.metas.get_pipe_meta_mut(&identity.name) {
            Some(meta) => meta,
            None => {
                tracing::info!("pipe has already been dropped or has not been created, skipping drop");
                return Ok(());
            }
        };
        if meta.creation_time() != identity.creation_time {
            tracing::info!(local_creation_time = meta.creation_time(), "stale drop request, skipping drop");
            return Ok(());
        }
        meta.runtime_meta.status = PipeStatus::Dropped;

        let tasks = self.tasks.remove_pipe_tasks(identity).unwrap_or_default();
        let (mut failed, mut first_err) = (PipeTasks::new(), None);
        for (partition, mut task) in tasks {
            if let Err(err) = task.drop_task() {
                tracing::warn!(%partition, error = ?err, "error dropping pipe task");
                first_err.get_or_insert_with(|| err.context(format!("error dropping task of partition {}", partition)));
                failed.insert(partition, task);
            }
        }
        if let Some(err) = first_err {
            self.tasks.add_pipe_tasks(identity.clone(), failed);
            return Err(PipeError::for_pipe(&identity.name, err));
        }

        self.metas.remove_pipe_meta(&identity.name);
        tracing::info!("pipe dropped");
        Ok(())
    }

    /// Record the given partition assignment and create its task if it is owned by this node.
    ///
    /// A task left behind by a failed rollback of the same partition is torn down first.
    fn create_partition_task(&mut self, static_meta: &PipeStaticMeta, partition: PartitionId, assignment: &TaskAssignment) -> Result<(), PipeError> {
        let identity = static_meta.identity();
        if let Some(task) = self.tasks.get_pipe_task_mut(&identity, partition) {
            tracing::debug!(pipe = %identity, %partition, "tearing down leftover pipe task");
            task.drop_task()
                .with_context(|| format!("error dropping leftover task of partition {}", partition))
                .map_err(|err| PipeError::for_pipe(&identity.name, err))?;
            self.tasks.remove_pipe_task(&identity, partition);
        }

        let meta = self
            .metas
            .get_pipe_meta_mut(&static_meta.name)
            .ok_or_else(|| PipeError::illegal_state(&static_meta.name, "pipe vanished during reconciliation"))?;
        if assignment.node_id == self.node_id {
            let task = self
                .builder
                .build(static_meta, partition, assignment)
                .and_then(|mut task| task.create().map(|_| task))
                .with_context(|| format!("error creating task of partition {}", partition))
                .map_err(|err| PipeError::for_pipe(&static_meta.name, err))?;
            self.tasks.add_pipe_task(identity, partition, task);
        }
        meta.runtime_meta.assignments.insert(partition, assignment.clone());
        Ok(())
    }

    /// Tear down the task of the given partition, then forget its assignment.
    ///
    /// On failure both the task and the assignment are kept so that a later pass retries.
    fn drop_partition_task(&mut self, identity: &PipeIdentity, partition: PartitionId) -> Result<(), PipeError> {
        if let Some(task) = self.tasks.get_pipe_task_mut(identity, partition) {
            task.drop_task()
                .with_context(|| format!("error dropping task of partition {}", partition))
                .map_err(|err| PipeError::for_pipe(&identity.name, err))?;
        }
        self.tasks.remove_pipe_task(identity, partition);
        if let Some(meta) = self.metas.get_pipe_meta_mut(&identity.name) {
            meta.runtime_meta.assignments.remove(&partition);
        }
        Ok(())
    }

    /// Undo the creation of a partition task which failed to start.
    ///
    /// The assignment is always forgotten so that the next pass creates the partition again. A
    /// task whose teardown fails stays registered and is torn down by that next creation.
    fn rollback_partition_task(&mut self, identity: &PipeIdentity, partition: PartitionId) {
        if let Some(task) = self.tasks.get_pipe_task_mut(identity, partition) {
            match task.drop_task() {
                Ok(_) => {
                    self.tasks.remove_pipe_task(identity, partition);
                }
                Err(err) => tracing::warn!(%partition, error = ?err, "error rolling back pipe task start"),
            }
        }
        if let Some(meta) = self.metas.get_pipe_meta_mut(&identity.name) {
            meta.runtime_meta.assignments.remove(&partition);
        }
    }

    fn start_partition_task(&mut self, identity: &PipeIdentity, partition: PartitionId) -> Result<(), PipeError> {
        if let Some(task) = self.tasks.get_pipe_task_mut(identity, partition) {
            task.start()
                .with_context(|| format!("error starting task of partition {}", partition))
                .map_err(|err| PipeError::for_pipe(&identity.name, err))?;
        }
        Ok(())
    }

    /// Drop every pipe on this node and stop accepting reconciliation passes.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn drop_all(&mut self) {
        self.is_shutdown = true;
        let identities: Vec<PipeIdentity> = self.pipe_metas().map(PipeMeta::identity).collect();
        for identity in identities {
            if let Err(err) = self.drop_pipe(&identity) {
                tracing::warn!(pipe = %identity, error = %err, "failed to drop pipe during shutdown");
            }
        }
    }

    /// Join the given progress into the recorded progress of a pipe partition.
    ///
    /// Returns `false` if the report did not match any local pipe partition.
    pub fn report_progress(&mut self, identity: &PipeIdentity, partition: PartitionId, index: &ProgressIndex) -> bool {
        let assignment = self
            .metas
            .get_pipe_meta_mut(&identity.name)
            .filter(|meta| meta.has_identity(identity))
            .and_then(|meta| meta.runtime_meta.assignments.get_mut(&partition));
        match assignment {
            Some(assignment) => {
                assignment.update_progress_index(index);
                tracing::trace!(pipe = %identity, %partition, progress_index = %assignment.progress_index, "progress recorded");
                true
            }
            None => {
                tracing::warn!(pipe = %identity, %partition, "dropping progress report of unknown pipe partition");
                false
            }
        }
    }

    /// Record a failure reported by a pipe task.
    ///
    /// The message becomes the latest exception of the pipe, and is appended to the failure
    /// messages of the given partition when it is known. The pipe status is left untouched.
    /// Returns `false` if the report did not match any local pipe.
    pub fn report_exception(&mut self, identity: &PipeIdentity, partition: Option<PartitionId>, message: String) -> bool {
        let meta = match self.metas.get_pipe_meta_mut(&identity.name).filter(|meta| meta.has_identity(identity)) {
            Some(meta) => meta,
            None => {
                tracing::warn!(pipe = %identity, "dropping exception report of unknown pipe");
                return false;
            }
        };
        tracing::warn!(pipe = %identity, partition = ?partition, %message, "pipe task reported a failure");
        if let Some(assignment) = partition.and_then(|partition| meta.runtime_meta.assignments.get_mut(&partition)) {
            assignment.track_exception(message.clone());
        }
        meta.runtime_meta.last_exception = Some(message);
        true
    }

    /// Collect the local pipe metas in answer to a coordinator heartbeat.
    ///
    /// Nothing is collected while the node is shutting down or when the request does not ask for
    /// pipe metas.
    pub fn collect_pipe_meta_list(&self, request: &HeartbeatRequest) -> HeartbeatResponse {
        if self.is_shutdown() || !request.need_pipe_meta_list {
            return HeartbeatResponse::default();
        }
        let pipe_meta_list = self
            .pipe_metas()
            .map(|meta| {
                tracing::debug!(pipe = %meta.identity(), status = %meta.status(), "reporting pipe meta");
                encode_pipe_meta(meta)
            })
            .collect();
        HeartbeatResponse { pipe_meta_list: Some(pipe_meta_list) }
    }

    /// The number of local pipes, along with the number of them which are running.
    pub fn pipe_counts(&self) -> (usize, usize) {
        let running = self.pipe_metas().filter(|meta| meta.status() == PipeStatus::Running).count();
        (self.metas.len(), running)
    }
}
