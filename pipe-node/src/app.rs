use std::sync::Arc;

use anyhow::{Context, Result};
use futures::stream::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{BroadcastStream, SignalStream};
use tokio_stream::StreamMap;

use crate::agent::{AgentCtl, AgentHandle};
use crate::assigner::ProgressIndexAssigner;
use crate::config::Config;
use crate::database::Database;
use crate::server::{spawn_prom_server, AppServer};
use crate::task::LocalPipeTaskBuilder;

/// The application object of a pipe node.
pub struct App {
    /// The application's runtime config.
    _config: Arc<Config>,
    /// The application's database system.
    _db: Database,
    /// A handle to the agent controller.
    _handle: AgentHandle,

    /// A channel used for triggering graceful shutdown.
    shutdown_tx: broadcast::Sender<()>,
    /// A channel used for triggering graceful shutdown.
    shutdown_rx: BroadcastStream<()>,

    /// The join handle of the agent controller.
    agent_handle: JoinHandle<Result<()>>,
    /// The join handle of the gateway server.
    gateway_server: JoinHandle<()>,
    /// The join handle of the metrics server.
    metrics_server: JoinHandle<Result<()>>,
}

impl App {
    /// Create a new instance.
    pub async fn new(config: Arc<Config>, prom_handle: PrometheusHandle) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(10);

        // Initialize this node's storage.
        let db = Database::new(config.clone()).await.context("error opening database")?;
        let assigner = Arc::new(
            ProgressIndexAssigner::new(&config, &db)
                .await
                .context("error recovering progress index assigner")?,
        );
        tracing::info!(reboot_times = assigner.reboot_times(), "progress index assigner ready");

        // Spawn various core tasks.
        // Task reports never wait on this queue, see `Config::agent_queue_capacity`.
        let (agent_tx, agent_rx) = mpsc::channel(config.agent_queue_capacity.max(1));
        let handle = AgentHandle::new(agent_tx);
        let builder = Arc::new(LocalPipeTaskBuilder::new(assigner, handle.clone()));
        let agent_handle = AgentCtl::new(config.clone(), builder, shutdown_tx.clone(), agent_rx).spawn();

        let gateway_server = AppServer::new(config.clone(), handle.clone(), shutdown_tx.clone()).spawn();
        let metrics_server = spawn_prom_server(&config, prom_handle, shutdown_tx.subscribe());

        Ok(Self {
            _config: config,
            _db: db,
            _handle: handle,
            shutdown_rx: BroadcastStream::new(shutdown_tx.subscribe()),
            shutdown_tx,
            agent_handle,
            gateway_server,
            metrics_server,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> Result<()> {
        let mut signals = StreamMap::new();
        signals.insert("sigterm", SignalStream::new(signal(SignalKind::terminate()).context("error building signal stream")?));
        signals.insert("sigint", SignalStream::new(signal(SignalKind::interrupt()).context("error building signal stream")?));

        loop {
            tokio::select! {
                Some((_, sig)) = signals.next() => {
                    tracing::debug!(signal = ?sig, "signal received, beginning graceful shutdown");
                    let _ = self.shutdown_tx.send(());
                    break;
                }
                _ = self.shutdown_rx.next() => break,
            }
        }

        // Begin shutdown routine.
        tracing::debug!("pipe node is shutting down");
        if let Err(err) = self.agent_handle.await.context("error joining agent controller handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down agent controller");
        }
        if let Err(err) = self.gateway_server.await {
            tracing::error!(error = ?err, "error joining gateway server task");
        }
        if let Err(err) = self.metrics_server.await.context("error joining metrics server handle").and_then(|res| res) {
            tracing::error!(error = ?err, "error shutting down metrics server");
        }

        tracing::debug!("pipe node shutdown complete");
        Ok(())
    }
}
