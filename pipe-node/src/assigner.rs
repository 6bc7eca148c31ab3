//! Progress index assigner.
//!
//! Every node assigns simple progress indices to the events it collects. Sequence numbers are
//! kept in memory and restart from zero on every boot, so they are qualified by the number of
//! times this node has rebooted, which is persisted in the node's database.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::database::Database;
use crate::error::ERR_DB_FLUSH;
use crate::utils;
use pipe_core::index::SimpleProgressIndex;
use pipe_core::{NodeId, ProgressIndex};

/// The key under which the node's reboot counter is stored.
const KEY_REBOOT_TIMES: &[u8] = b"reboot_times";

/// Assigns progress indices to events collected on this node.
pub struct ProgressIndexAssigner {
    node_id: NodeId,
    reboot_times: u64,
    sequence: AtomicU64,
}

impl ProgressIndexAssigner {
    /// Create a new instance, bumping the persisted reboot counter of this node.
    pub async fn new(config: &Config, db: &Database) -> Result<Self> {
        let tree = db.get_assigner_tree().await?;
        let reboot_times = Database::spawn_blocking(move || -> Result<u64> {
            let reboot_times = tree
                .get(KEY_REBOOT_TIMES)
                .context("error fetching reboot counter")?
                .map(|val| utils::decode_u64(&val).context("error decoding reboot counter, data corrupted"))
                .transpose()?
                .map(|val| val + 1)
                .unwrap_or(0);
            tree.insert(KEY_REBOOT_TIMES, &utils::encode_u64(reboot_times))
                .context("error storing reboot counter")?;
            tree.flush().context(ERR_DB_FLUSH)?;
            Ok(reboot_times)
        })
        .await
        .context("error recovering reboot counter")
        .and_then(|res| res)?;

        tracing::debug!(node_id = config.node_id, reboot_times, "progress index assigner recovered");
        Ok(Self { node_id: config.node_id, reboot_times, sequence: AtomicU64::new(0) })
    }

    /// The number of times this node has rebooted.
    pub fn reboot_times(&self) -> u64 {
        self.reboot_times
    }

    /// Assign the next simple progress index of this node.
    pub fn next_simple_index(&self) -> ProgressIndex {
        ProgressIndex::Simple(self.next_simple())
    }

    /// Assign the next progress index for data recovered from disk on this node.
    pub fn recover_index(&self) -> ProgressIndex {
        ProgressIndex::recover([(self.node_id, self.next_simple())])
    }

    fn next_simple(&self) -> SimpleProgressIndex {
        SimpleProgressIndex::new(self.reboot_times, self.sequence.fetch_add(1, Ordering::SeqCst))
    }
}
