/// A pipe's static definition along with its runtime state.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PipeMetaProto {
    #[prost(message, optional, tag="1")]
    pub static_meta: ::core::option::Option<PipeStaticMetaProto>,
    #[prost(message, optional, tag="2")]
    pub runtime_meta: ::core::option::Option<PipeRuntimeMetaProto>,
}
/// The immutable definition of a pipe.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PipeStaticMetaProto {
    #[prost(string, tag="1")]
    pub name: ::prost::alloc::string::String,
    #[prost(int64, tag="2")]
    pub creation_time: i64,
    #[prost(btree_map="string, string", tag="3")]
    pub collector_attributes: ::prost::alloc::collections::BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    #[prost(btree_map="string, string", tag="4")]
    pub processor_attributes: ::prost::alloc::collections::BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    #[prost(btree_map="string, string", tag="5")]
    pub connector_attributes: ::prost::alloc::collections::BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}
/// The mutable runtime state of a pipe.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PipeRuntimeMetaProto {
    #[prost(enumeration="PipeStatusProto", tag="1")]
    pub status: i32,
    #[prost(btree_map="int32, message", tag="2")]
    pub assignments: ::prost::alloc::collections::BTreeMap<i32, TaskAssignmentProto>,
    #[prost(string, optional, tag="3")]
    pub last_exception: ::core::option::Option<::prost::alloc::string::String>,
}
/// The assignment of a pipe partition to a node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskAssignmentProto {
    #[prost(int32, tag="1")]
    pub node_id: i32,
    #[prost(message, optional, tag="2")]
    pub progress_index: ::core::option::Option<ProgressIndexProto>,
    #[prost(string, repeated, tag="3")]
    pub exception_messages: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}
/// A progress index of any kind.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProgressIndexProto {
    #[prost(oneof="progress_index_proto::Index", tags="1, 2, 3, 4, 5")]
    pub index: ::core::option::Option<progress_index_proto::Index>,
}
/// Nested message and enum types in `ProgressIndexProto`.
pub mod progress_index_proto {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Index {
        #[prost(message, tag="1")]
        Minimum(super::MinimumIndexProto),
        #[prost(message, tag="2")]
        Simple(super::SimpleIndexProto),
        #[prost(message, tag="3")]
        Recover(super::RecoverIndexProto),
        #[prost(message, tag="4")]
        Consensus(super::ConsensusIndexProto),
        #[prost(message, tag="5")]
        Hybrid(super::HybridIndexProto),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MinimumIndexProto {
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SimpleIndexProto {
    #[prost(uint64, tag="1")]
    pub reboot_times: u64,
    #[prost(uint64, tag="2")]
    pub sequence: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecoverIndexProto {
    #[prost(btree_map="int32, message", tag="1")]
    pub nodes: ::prost::alloc::collections::BTreeMap<i32, SimpleIndexProto>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConsensusIndexProto {
    #[prost(btree_map="int32, uint64", tag="1")]
    pub peers: ::prost::alloc::collections::BTreeMap<i32, u64>,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HybridIndexProto {
    #[prost(message, repeated, tag="1")]
    pub components: ::prost::alloc::vec::Vec<ProgressIndexProto>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PipeStatusProto {
    Stopped = 0,
    Running = 1,
    Dropped = 2,
}
