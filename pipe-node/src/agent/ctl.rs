use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::stream::StreamExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};

use super::{HeartbeatRequest, HeartbeatResponse, PipeTaskAgent};
use crate::config::Config;
use crate::error::PipeError;
use crate::task::PipeTaskBuilder;
use pipe_core::route::{apply_leader_changes, RouteChangeEvent};
use pipe_core::{PartitionId, PipeIdentity, PipeMeta, ProgressIndex};

const METRIC_RECONCILE_PASSES: &str = "pipe_node_reconcile_passes";
const METRIC_RECONCILE_FAILURES: &str = "pipe_node_reconcile_failures";
const METRIC_PIPES_KNOWN: &str = "pipe_node_pipes_known";
const METRIC_PIPES_RUNNING: &str = "pipe_node_pipes_running";

/// A message bound for the agent controller.
pub enum AgentCtlMsg {
    /// A desired pipe topology pushed by the coordinator.
    PipeMetaChanges {
        metas: Vec<PipeMeta>,
        tx: oneshot::Sender<Result<(), PipeError>>,
    },
    /// A heartbeat issued by the coordinator.
    Heartbeat {
        request: HeartbeatRequest,
        tx: oneshot::Sender<HeartbeatResponse>,
    },
    /// Progress made by a pipe partition task.
    ReportProgress {
        identity: PipeIdentity,
        partition: PartitionId,
        index: ProgressIndex,
    },
    /// A failure reported by a pipe task.
    ReportException {
        identity: PipeIdentity,
        partition: Option<PartitionId>,
        message: String,
    },
    /// A batch of region leader changes.
    RegionLeaderChanged {
        event: RouteChangeEvent,
        tx: oneshot::Sender<Result<(), PipeError>>,
    },
}

/// A handle for communicating with the agent controller.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentCtlMsg>,
}

impl AgentHandle {
    pub fn new(tx: mpsc::Sender<AgentCtlMsg>) -> Self {
        Self { tx }
    }

    /// Run a reconciliation pass against the given desired pipe metas.
    ///
    /// A failed pass surfaces as a `PipeError::Aggregate` within the returned error.
    pub async fn handle_pipe_meta_changes(&self, metas: Vec<PipeMeta>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(AgentCtlMsg::PipeMetaChanges { metas, tx }).await?;
        rx.await.context("error awaiting response from agent controller")??;
        Ok(())
    }

    /// Collect this node's pipe metas in answer to a coordinator heartbeat.
    pub async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatResponse> {
        let (tx, rx) = oneshot::channel();
        self.send(AgentCtlMsg::Heartbeat { request, tx }).await?;
        rx.await.context("error awaiting response from agent controller")
    }

    /// Apply the given region leader changes, reconciling again if they move any partition.
    pub async fn region_leader_changed(&self, event: RouteChangeEvent) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(AgentCtlMsg::RegionLeaderChanged { event, tx }).await?;
        rx.await.context("error awaiting response from agent controller")??;
        Ok(())
    }

    /// Report progress made by a pipe partition task.
    ///
    /// This never waits, so it is safe to call from within the controller's own task. The report
    /// is rejected when the controller's queue is full.
    pub fn report_progress(&self, identity: PipeIdentity, partition: PartitionId, index: ProgressIndex) -> Result<()> {
        self.tx
            .try_send(AgentCtlMsg::ReportProgress { identity, partition, index })
            .map_err(|err| anyhow!("error sending progress report to agent controller: {}", err))
    }

    /// Report a failure of a pipe task.
    ///
    /// This never waits, so it is safe to call from within the controller's own task.
    pub fn report_exception(&self, identity: PipeIdentity, partition: Option<PartitionId>, message: String) -> Result<()> {
        self.tx
            .try_send(AgentCtlMsg::ReportException { identity, partition, message })
            .map_err(|err| anyhow!("error sending exception report to agent controller: {}", err))
    }

    async fn send(&self, msg: AgentCtlMsg) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_err| anyhow!("error communicating with agent controller"))
    }
}

/// A controller owning the pipe task agent of this node.
///
/// Reconciliation passes, heartbeats and reports are all serialized through this controller's
/// channel, so none of them ever observes a partial pass.
pub struct AgentCtl {
    /// The reconciliation controller.
    agent: PipeTaskAgent,
    /// The last desired pipe topology received from the coordinator.
    ///
    /// Region leader changes are applied to this snapshot.
    last_desired: Option<Vec<PipeMeta>>,

    /// A channel of inbound requests.
    requests_rx: ReceiverStream<AgentCtlMsg>,
    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,
}

impl AgentCtl {
    /// Create a new instance.
    pub fn new(
        config: Arc<Config>, builder: Arc<dyn PipeTaskBuilder>, shutdown_tx: broadcast::Sender<()>, requests_rx: mpsc::Receiver<AgentCtlMsg>,
    ) -> Self {
        metrics::register_counter!(METRIC_RECONCILE_PASSES, metrics::Unit::Count, "the number of reconciliation passes run");
        metrics::register_counter!(METRIC_RECONCILE_FAILURES, metrics::Unit::Count, "the number of reconciliation passes which finished with errors");
        metrics::register_gauge!(METRIC_PIPES_KNOWN, metrics::Unit::Count, "the number of pipes known to this node");
        metrics::register_gauge!(METRIC_PIPES_RUNNING, metrics::Unit::Count, "the number of pipes running on this node");

        Self {
            agent: PipeTaskAgent::new(config.node_id, builder),
            last_desired: None,
            requests_rx: ReceiverStream::new(requests_rx),
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!("agent controller has started");

        loop {
            tokio::select! {
                msg_opt = self.requests_rx.next() => match msg_opt {
                    Some(msg) => self.handle_ctl_msg(msg),
                    None => {
                        let _res = self.shutdown_tx.send(());
                        break;
                    }
                },
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        self.agent.drop_all();
        self.record_pipe_counts();
        tracing::debug!("agent controller has shutdown");
        Ok(())
    }

    /// Handle an agent controller message.
    #[tracing::instrument(level = "trace", skip(self, msg))]
    fn handle_ctl_msg(&mut self, msg: AgentCtlMsg) {
        match msg {
            AgentCtlMsg::PipeMetaChanges { metas, tx } => {
                let res = self.reconcile(metas);
                let _res = tx.send(res);
            }
            AgentCtlMsg::Heartbeat { request, tx } => {
                let _res = tx.send(self.agent.collect_pipe_meta_list(&request));
            }
            AgentCtlMsg::ReportProgress { identity, partition, index } => {
                self.agent.report_progress(&identity, partition, &index);
            }
            AgentCtlMsg::ReportException { identity, partition, message } => {
                self.agent.report_exception(&identity, partition, message);
            }
            AgentCtlMsg::RegionLeaderChanged { event, tx } => {
                let _res = tx.send(self.handle_region_leader_changed(event));
            }
        }
    }

    /// Handle a batch of region leader changes.
    ///
    /// The changes are applied to the last desired topology, and a new pass is run against it when
    /// any partition moved.
    fn handle_region_leader_changed(&mut self, event: RouteChangeEvent) -> Result<(), PipeError> {
        let mut desired = match self.last_desired.take() {
            Some(desired) => desired,
            None => {
                tracing::debug!("no desired pipe topology received yet, ignoring region leader changes");
                return Ok(());
            }
        };
        if !apply_leader_changes(&mut desired, &event) {
            self.last_desired = Some(desired);
            return Ok(());
        }
        tracing::info!(changes = event.changes.len(), "region leaders changed, reconciling pipes");
        self.reconcile(desired)
    }

    /// Run a reconciliation pass, keeping the given desired topology for later route changes.
    fn reconcile(&mut self, desired: Vec<PipeMeta>) -> Result<(), PipeError> {
        metrics::increment_counter!(METRIC_RECONCILE_PASSES);
        let res = self.agent.handle_pipe_meta_changes(&desired);
        if let Err(err) = &res {
            metrics::increment_counter!(METRIC_RECONCILE_FAILURES);
            tracing::error!(error = %err, "reconciliation pass finished with errors");
        }
        self.last_desired = Some(desired);
        self.record_pipe_counts();
        res
    }

    fn record_pipe_counts(&self) {
        let (known, running) = self.agent.pipe_counts();
        metrics::gauge!(METRIC_PIPES_KNOWN, known as f64);
        metrics::gauge!(METRIC_PIPES_RUNNING, running as f64);
    }
}
