//! The wire model of pipe meta records.
//!
//! Pipe metas are shipped between the coordinator and nodes as prost encoded `PipeMetaProto`
//! records. Conversion into the domain model is fallible: a record with an unknown status or a
//! missing progress index is rejected as a whole.

mod pipe;

use prost::Message;

use crate::error::PipeError;
use crate::index::{ConsensusProgressIndex, ProgressIndex, RecoverProgressIndex, SimpleProgressIndex};
use crate::meta::{PartitionId, PipeMeta, PipeRuntimeMeta, PipeStaticMeta, PipeStatus, TaskAssignment};
pub use pipe::*;

/// Encode the given pipe meta as a wire record.
pub fn encode_pipe_meta(meta: &PipeMeta) -> Vec<u8> {
    PipeMetaProto::from(meta).encode_to_vec()
}

/// Decode a pipe meta from the given wire record.
pub fn decode_pipe_meta(data: &[u8]) -> Result<PipeMeta, PipeError> {
    let proto = PipeMetaProto::decode(data).map_err(|err| PipeError::InvalidRecord(format!("error decoding pipe meta: {}", err)))?;
    PipeMeta::try_from(proto)
}

impl From<&PipeMeta> for PipeMetaProto {
    fn from(meta: &PipeMeta) -> Self {
        let static_meta = &meta.static_meta;
        let runtime_meta = &meta.runtime_meta;
        Self {
            static_meta: Some(PipeStaticMetaProto {
                name: static_meta.name.clone(),
                creation_time: static_meta.creation_time,
                collector_attributes: static_meta.collector_attributes.clone(),
                processor_attributes: static_meta.processor_attributes.clone(),
                connector_attributes: static_meta.connector_attributes.clone(),
            }),
            runtime_meta: Some(PipeRuntimeMetaProto {
                status: PipeStatusProto::from(runtime_meta.status) as i32,
                assignments: runtime_meta
                    .assignments
                    .iter()
                    .map(|(partition, assignment)| (partition.0, TaskAssignmentProto::from(assignment)))
                    .collect(),
                last_exception: runtime_meta.last_exception.clone(),
            }),
        }
    }
}

impl TryFrom<PipeMetaProto> for PipeMeta {
    type Error = PipeError;

    fn try_from(proto: PipeMetaProto) -> Result<Self, Self::Error> {
        let static_proto = proto
            .static_meta
            .ok_or_else(|| PipeError::InvalidRecord("pipe meta record has no static meta".into()))?;
        let runtime_proto = proto
            .runtime_meta
            .ok_or_else(|| PipeError::InvalidRecord(format!("pipe meta record for {} has no runtime meta", static_proto.name)))?;

        let status = PipeStatusProto::from_i32(runtime_proto.status)
            .map(PipeStatus::from)
            .ok_or_else(|| PipeError::InvalidRecord(format!("unknown status {} for pipe {}", runtime_proto.status, static_proto.name)))?;
        let assignments = runtime_proto
            .assignments
            .into_iter()
            .map(|(partition, assignment)| {
                TaskAssignment::try_from(assignment)
                    .map(|assignment| (PartitionId(partition), assignment))
                    .map_err(|err| match err {
                        PipeError::InvalidRecord(detail) => {
                            PipeError::InvalidRecord(format!("partition {} of pipe {}: {}", partition, static_proto.name, detail))
                        }
                        err => err,
                    })
            })
            .collect::<Result<_, _>>()?;

        Ok(PipeMeta::new(
            PipeStaticMeta {
                name: static_proto.name,
                creation_time: static_proto.creation_time,
                collector_attributes: static_proto.collector_attributes,
                processor_attributes: static_proto.processor_attributes,
                connector_attributes: static_proto.connector_attributes,
            },
            PipeRuntimeMeta { status, assignments, last_exception: runtime_proto.last_exception },
        ))
    }
}

impl From<PipeStatus> for PipeStatusProto {
    fn from(status: PipeStatus) -> Self {
        match status {
            PipeStatus::Stopped => Self::Stopped,
            PipeStatus::Running => Self::Running,
            PipeStatus::Dropped => Self::Dropped,
        }
    }
}

impl From<PipeStatusProto> for PipeStatus {
    fn from(status: PipeStatusProto) -> Self {
        match status {
            PipeStatusProto::Stopped => Self::Stopped,
            PipeStatusProto::Running => Self::Running,
            PipeStatusProto::Dropped => Self::Dropped,
        }
    }
}

impl From<&TaskAssignment> for TaskAssignmentProto {
    fn from(assignment: &TaskAssignment) -> Self {
        Self {
            node_id: assignment.node_id,
            progress_index: Some(ProgressIndexProto::from(&assignment.progress_index)),
            exception_messages: assignment.exception_messages.clone(),
        }
    }
}

impl TryFrom<TaskAssignmentProto> for TaskAssignment {
    type Error = PipeError;

    fn try_from(proto: TaskAssignmentProto) -> Result<Self, Self::Error> {
        let progress_index = proto
            .progress_index
            .ok_or_else(|| PipeError::InvalidRecord("task assignment has no progress index".into()))
            .and_then(ProgressIndex::try_from)?;
        Ok(Self { node_id: proto.node_id, progress_index, exception_messages: proto.exception_messages })
    }
}

impl From<&ProgressIndex> for ProgressIndexProto {
    fn from(index: &ProgressIndex) -> Self {
        use progress_index_proto::Index;
        let index = match index {
            ProgressIndex::Minimum => Index::Minimum(MinimumIndexProto {}),
            ProgressIndex::Simple(simple) => Index::Simple(SimpleIndexProto::from(simple)),
            ProgressIndex::Recover(recover) => Index::Recover(RecoverIndexProto {
                nodes: recover.nodes.iter().map(|(node, simple)| (*node, SimpleIndexProto::from(simple))).collect(),
            }),
            ProgressIndex::Consensus(consensus) => Index::Consensus(ConsensusIndexProto { peers: consensus.peers.clone() }),
            ProgressIndex::Hybrid(hybrid) => Index::Hybrid(HybridIndexProto {
                components: hybrid.components().values().map(ProgressIndexProto::from).collect(),
            }),
        };
        Self { index: Some(index) }
    }
}

impl TryFrom<ProgressIndexProto> for ProgressIndex {
    type Error = PipeError;

    fn try_from(proto: ProgressIndexProto) -> Result<Self, Self::Error> {
        use progress_index_proto::Index;
        Ok(match proto.index {
            None => return Err(PipeError::InvalidRecord("progress index record has no index".into())),
            Some(Index::Minimum(_)) => ProgressIndex::Minimum,
            Some(Index::Simple(simple)) => ProgressIndex::Simple(SimpleProgressIndex::from(&simple)),
            Some(Index::Recover(recover)) => ProgressIndex::Recover(RecoverProgressIndex {
                nodes: recover.nodes.iter().map(|(node, simple)| (*node, SimpleProgressIndex::from(simple))).collect(),
            }),
            Some(Index::Consensus(consensus)) => ProgressIndex::Consensus(ConsensusProgressIndex { peers: consensus.peers }),
            // Rebuilt through merge so that the decoded index is canonical.
            Some(Index::Hybrid(hybrid)) => ProgressIndex::hybrid(
                hybrid
                    .components
                    .into_iter()
                    .map(ProgressIndex::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        })
    }
}

impl From<&SimpleProgressIndex> for SimpleIndexProto {
    fn from(simple: &SimpleProgressIndex) -> Self {
        Self { reboot_times: simple.reboot_times, sequence: simple.sequence }
    }
}

impl From<&SimpleIndexProto> for SimpleProgressIndex {
    fn from(proto: &SimpleIndexProto) -> Self {
        SimpleProgressIndex::new(proto.reboot_times, proto.sequence)
    }
}
