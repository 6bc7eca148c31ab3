/// A heartbeat issued by the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatRequest {
    /// Whether the coordinator wants this node's pipe metas.
    pub need_pipe_meta_list: bool,
}

/// This node's answer to a coordinator heartbeat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatResponse {
    /// The encoded pipe metas of this node, ordered by pipe name.
    ///
    /// This is `None` when the node is shutting down or when the request did not ask for it.
    pub pipe_meta_list: Option<Vec<Vec<u8>>>,
}
