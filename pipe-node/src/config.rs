//! Runtime configuration.

use anyhow::{Context, Result};
use serde::Deserialize;

use pipe_core::NodeId;

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The node's logging config, which uses Rust's `env_logger` directives.
    pub rust_log: String,
    /// The ID of this node.
    ///
    /// Partition tasks are only run on this node when their assignment names this ID as the
    /// owning node.
    pub node_id: NodeId,
    /// The port of the HTTP gateway used by the coordinator.
    pub http_port: u16,
    /// The port of the Prometheus metrics server.
    pub metrics_port: u16,

    /// The path to the database on disk.
    #[serde(default = "crate::database::default_data_path")]
    pub storage_data_path: String,
    /// The capacity of the agent controller's request queue.
    ///
    /// Task reports are enqueued without waiting, so a report arriving while the queue is full
    /// is dropped with a warning. Size this above the number of partitions a single pass may
    /// create on this node.
    #[serde(default = "default_agent_queue_capacity")]
    pub agent_queue_capacity: usize,
}

/// The default capacity of the agent controller's request queue.
pub const DEFAULT_AGENT_QUEUE_CAPACITY: usize = 1000;

fn default_agent_queue_capacity() -> usize {
    DEFAULT_AGENT_QUEUE_CAPACITY
}

impl Config {
    /// Create a new config instance from the runtime environment.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        envy::from_env().context("error building config from env")
    }

    /// Create a new config instance rooted at a fresh temporary directory.
    #[cfg(test)]
    pub fn new_test() -> Result<(std::sync::Arc<Self>, tempfile::TempDir)> {
        let tmpdir = tempfile::tempdir().context("error creating tmp dir for test config")?;
        let config = Self {
            rust_log: "error".into(),
            node_id: 1,
            http_port: 7000,
            metrics_port: 7002,
            storage_data_path: tmpdir.path().to_string_lossy().to_string(),
            agent_queue_capacity: 100,
        };
        Ok((std::sync::Arc::new(config), tmpdir))
    }
}
