//! The HTTP gateway used by the coordinator.
//!
//! Pipe meta records travel as base64 encoded wire records within JSON bodies.

mod prom;

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Extension, Json};
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{AddExtensionLayer, Router};
use futures::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::agent::{AgentHandle, HeartbeatRequest};
use crate::config::Config;
use crate::error::PipeError;
use crate::utils;
use pipe_core::proto::decode_pipe_meta;
use pipe_core::route::RouteChangeEvent;
use pipe_core::{NodeId, PartitionId, PipeMeta};

pub use prom::spawn_prom_server;
#[cfg(test)]
pub use prom::{health, render_metrics, EXPOSITION_CONTENT_TYPE};

/// A result type used by the gateway's handlers.
pub type HandlerResult<T> = std::result::Result<T, (StatusCode, String)>;

/// The desired pipe topology pushed by the coordinator.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PipeMetaListBody {
    /// Base64 encoded pipe meta records.
    pub pipe_meta_list: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HeartbeatRequestBody {
    #[serde(default)]
    pub need_pipe_meta_list: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct HeartbeatResponseBody {
    /// Base64 encoded pipe meta records of this node, if they were asked for.
    pub pipe_meta_list: Option<Vec<String>>,
}

/// A batch of region leader changes.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RouteChangesBody {
    pub changes: Vec<RouteChange>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouteChange {
    pub partition: i32,
    pub leader: NodeId,
}

/// Application server.
pub struct AppServer {
    /// The application's runtime config.
    config: Arc<Config>,
    /// A handle to the agent controller.
    handle: AgentHandle,
    /// A channel used for triggering graceful shutdown.
    shutdown: broadcast::Sender<()>,
}

impl AppServer {
    /// Create a new instance.
    pub fn new(config: Arc<Config>, handle: AgentHandle, shutdown: broadcast::Sender<()>) -> Self {
        Self { config, handle, shutdown }
    }

    /// Spawn the HTTP gateway.
    ///
    /// A failure of the gateway triggers a shutdown of the whole node.
    pub fn spawn(self) -> JoinHandle<()> {
        let (shutdown, mut shutdown_rx) = (self.shutdown.clone(), self.shutdown.subscribe());
        let app = Router::new()
            .route("/v1/pipes", put(put_pipe_metas))
            .route("/v1/heartbeat", post(heartbeat))
            .route("/v1/routes", post(region_leader_changed))
            .layer(AddExtensionLayer::new(self.handle));
        let server = axum::Server::bind(&([0, 0, 0, 0], self.config.http_port).into())
            .serve(app.into_make_service())
            .with_graceful_shutdown(async move {
                let _res = shutdown_rx.recv().await;
            });
        tracing::info!("gateway is listening at 0.0.0.0:{}", self.config.http_port);
        tokio::spawn(async move {
            if let Err(err) = server.map_err(anyhow::Error::from).await {
                tracing::error!(error = ?err, "error from gateway server");
            }
            let _res = shutdown.send(());
        })
    }
}

/// Run a reconciliation pass against the pushed pipe topology.
pub async fn put_pipe_metas(Extension(handle): Extension<AgentHandle>, Json(body): Json<PipeMetaListBody>) -> HandlerResult<StatusCode> {
    let metas = decode_pipe_meta_list(&body.pipe_meta_list).map_err(|err| (StatusCode::BAD_REQUEST, err.to_string()))?;
    handle.handle_pipe_meta_changes(metas).await.map_err(map_agent_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Answer a coordinator heartbeat.
pub async fn heartbeat(Extension(handle): Extension<AgentHandle>, Json(body): Json<HeartbeatRequestBody>) -> HandlerResult<Json<HeartbeatResponseBody>> {
    let res = handle
        .heartbeat(HeartbeatRequest { need_pipe_meta_list: body.need_pipe_meta_list })
        .await
        .map_err(map_agent_error)?;
    let pipe_meta_list = res
        .pipe_meta_list
        .map(|records| records.iter().map(|record| utils::encode_record(record)).collect());
    Ok(Json(HeartbeatResponseBody { pipe_meta_list }))
}

/// Apply a batch of region leader changes.
pub async fn region_leader_changed(Extension(handle): Extension<AgentHandle>, Json(body): Json<RouteChangesBody>) -> HandlerResult<StatusCode> {
    let event = RouteChangeEvent::new(body.changes.into_iter().map(|change| (PartitionId(change.partition), change.leader)));
    if event.is_empty() {
        return Ok(StatusCode::NO_CONTENT);
    }
    handle.region_leader_changed(event).await.map_err(map_agent_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn decode_pipe_meta_list(records: &[String]) -> Result<Vec<PipeMeta>> {
    records
        .iter()
        .map(|record| -> Result<PipeMeta> {
            let data = utils::decode_record(record)?;
            Ok(decode_pipe_meta(&data)?)
        })
        .collect()
}

/// Pipe errors are the outcome of a pass, anything else means the agent controller is gone.
fn map_agent_error(err: anyhow::Error) -> (StatusCode, String) {
    match err.downcast_ref::<PipeError>() {
        Some(pipe_err) => (StatusCode::INTERNAL_SERVER_ERROR, pipe_err.to_string()),
        None => {
            tracing::error!(error = ?err, "error communicating with agent controller");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}
