use anyhow::Result;

use super::{PipeMetaKeeper, PipeTask, PipeTaskBuilder, PipeTaskRegistry, PipeTasks};
use crate::fixtures::{pipe_meta, RecordingTaskBuilder, TaskAction};
use pipe_core::{PartitionId, PipeIdentity, PipeStaticMeta, PipeStatus, TaskAssignment};

fn build_tasks(builder: &RecordingTaskBuilder, identity: &PipeIdentity, partitions: &[i32]) -> Result<PipeTasks> {
    let static_meta = PipeStaticMeta::new(identity.name.clone(), identity.creation_time);
    let mut tasks = PipeTasks::new();
    for partition in partitions {
        let task = builder.build(&static_meta, PartitionId(*partition), &TaskAssignment::default())?;
        tasks.insert(PartitionId(*partition), task);
    }
    Ok(tasks)
}

#[test]
fn registry_keeps_pipes_with_same_name_apart() -> Result<()> {
    let builder = RecordingTaskBuilder::new();
    let (old, new) = (PipeIdentity::new("p", 1), PipeIdentity::new("p", 2));
    let mut registry = PipeTaskRegistry::default();

    registry.add_pipe_tasks(old.clone(), build_tasks(&builder, &old, &[1, 2])?);
    registry.add_pipe_tasks(new.clone(), build_tasks(&builder, &new, &[3])?);

    let old_partitions = registry.partitions(&old);
    assert!(old_partitions == vec![PartitionId(1), PartitionId(2)], "expected old partitions [1, 2] got {:?}", old_partitions);
    let new_partitions = registry.partitions(&new);
    assert!(new_partitions == vec![PartitionId(3)], "expected new partitions [3] got {:?}", new_partitions);

    let removed = registry.remove_pipe_tasks(&old).map(|tasks| tasks.len());
    assert!(removed == Some(2), "expected 2 removed tasks got {:?}", removed);
    assert!(registry.partitions(&old).is_empty(), "expected old pipe to be gone");
    assert!(registry.remove_pipe_tasks(&old).is_none(), "expected second removal to find nothing");

    Ok(())
}

#[test]
fn registry_merges_tasks_of_same_pipe() -> Result<()> {
    let builder = RecordingTaskBuilder::new();
    let identity = PipeIdentity::new("p", 1);
    let mut registry = PipeTaskRegistry::default();

    registry.add_pipe_tasks(identity.clone(), build_tasks(&builder, &identity, &[1])?);
    registry.add_pipe_tasks(identity.clone(), build_tasks(&builder, &identity, &[2])?);
    let mut extra = build_tasks(&builder, &identity, &[3])?;
    if let Some(task) = extra.remove(&PartitionId(3)) {
        registry.add_pipe_task(identity.clone(), PartitionId(3), task);
    }

    let partitions = registry.partitions(&identity);
    assert!(partitions.len() == 3, "expected 3 partitions got {:?}", partitions);

    let task = registry.remove_pipe_task(&identity, PartitionId(2));
    assert!(task.is_some(), "expected partition 2 task to be removed");
    assert!(registry.remove_pipe_task(&identity, PartitionId(2)).is_none(), "expected partition 2 to be gone");

    Ok(())
}

#[test]
fn registry_hands_out_live_tasks() -> Result<()> {
    let builder = RecordingTaskBuilder::new();
    let identity = PipeIdentity::new("p", 1);
    let mut registry = PipeTaskRegistry::default();
    registry.add_pipe_tasks(identity.clone(), build_tasks(&builder, &identity, &[1, 2])?);

    if let Some(task) = registry.get_pipe_task_mut(&identity, PartitionId(2)) {
        task.start()?;
    }
    if let Some(tasks) = registry.get_pipe_tasks_mut(&identity) {
        for task in tasks.values_mut() {
            task.stop()?;
        }
    }

    let (starts, stops) = (builder.count(TaskAction::Start), builder.count(TaskAction::Stop));
    assert!(starts == 1, "expected 1 start call got {}", starts);
    assert!(stops == 2, "expected 2 stop calls got {}", stops);
    assert!(registry.get_pipe_task_mut(&identity, PartitionId(9)).is_none(), "expected no task for unknown partition");

    Ok(())
}

#[test]
fn meta_keeper_is_keyed_by_name() -> Result<()> {
    let mut keeper = PipeMetaKeeper::default();
    assert!(keeper.pipe_metas().next().is_none(), "expected new keeper to be empty");

    keeper.add_pipe_meta(pipe_meta("b", 1, PipeStatus::Stopped, &[]));
    keeper.add_pipe_meta(pipe_meta("a", 1, PipeStatus::Stopped, &[]));
    keeper.add_pipe_meta(pipe_meta("a", 2, PipeStatus::Running, &[]));

    assert!(keeper.len() == 2, "expected 2 pipe metas got {}", keeper.len());
    let names: Vec<&str> = keeper.pipe_metas().map(|meta| meta.name()).collect();
    assert!(names == vec!["a", "b"], "expected metas ordered by name got {:?}", names);
    let creation_time = keeper.get_pipe_meta("a").map(|meta| meta.creation_time());
    assert!(creation_time == Some(2), "expected later meta to replace earlier one got {:?}", creation_time);

    if let Some(meta) = keeper.get_pipe_meta_mut("b") {
        meta.runtime_meta.status = PipeStatus::Dropped;
    }
    let status = keeper.get_pipe_meta("b").map(|meta| meta.status());
    assert!(status == Some(PipeStatus::Dropped), "expected mutation to stick got {:?}", status);

    assert!(keeper.remove_pipe_meta("b").is_some(), "expected b to be removed");
    assert!(keeper.get_pipe_meta("b").is_none(), "expected b to be gone");
    assert!(keeper.get_pipe_meta("a").is_some(), "expected a to be kept");

    Ok(())
}
