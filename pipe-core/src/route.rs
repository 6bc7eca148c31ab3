//! Region leader route tracking.
//!
//! Partition tasks run on the node which leads the partition's consensus group. When leadership
//! moves, the owning node of every matching task assignment is rewritten so that the next
//! reconciliation pass moves the task along with it.

use std::collections::BTreeMap;

use crate::meta::{NodeId, PartitionId, PipeMeta, PipeStatus};

/// A batch of region leader changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteChangeEvent {
    /// A mapping of partition IDs to the ID of their new leader node.
    pub changes: BTreeMap<PartitionId, NodeId>,
}

impl RouteChangeEvent {
    pub fn new<I: IntoIterator<Item = (PartitionId, NodeId)>>(changes: I) -> Self {
        Self { changes: changes.into_iter().collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Rewrite the owning nodes of the given pipes according to the given leader changes.
///
/// Dropped pipes are left untouched. Returns `true` if any assignment was changed.
pub fn apply_leader_changes(metas: &mut [PipeMeta], event: &RouteChangeEvent) -> bool {
    let mut changed = false;
    for meta in metas.iter_mut().filter(|meta| meta.status() != PipeStatus::Dropped) {
        for (partition, leader) in event.changes.iter() {
            let assignment = match meta.runtime_meta.assignments.get_mut(partition) {
                Some(assignment) => assignment,
                None => continue,
            };
            if assignment.node_id != *leader {
                tracing::debug!(pipe = %meta.static_meta.name, %partition, from = assignment.node_id, to = leader, "moving pipe partition to new leader");
                assignment.node_id = *leader;
                changed = true;
            }
        }
    }
    changed
}
