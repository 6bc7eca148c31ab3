//! Core pipe models shared by the pipe node controller.
//!
//! This crate holds the progress index algebra used to track how much of a replication stream
//! has been durably processed, the pipe meta data model which is reconciled on every node, and
//! the wire model used to ship pipe meta snapshots between nodes and the coordinator.

pub mod error;
pub mod index;
pub mod meta;
pub mod proto;
pub mod route;

pub use error::PipeError;
pub use index::{ProgressIndex, ProgressIndexKind, TotalOrderSumTuple};
pub use meta::{NodeId, PartitionId, PipeIdentity, PipeMeta, PipeRuntimeMeta, PipeStaticMeta, PipeStatus, TaskAssignment};
