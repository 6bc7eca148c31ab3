//! The Prometheus scrape endpoint of this node.
//!
//! Served on `METRICS_PORT`, apart from the coordinator gateway. Every series carries the `node`
//! label installed along with the recorder.

use std::net::SocketAddr;

use anyhow::Result;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::{extract::Extension, routing::get, AddExtensionLayer, Router};
use futures::prelude::*;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::Config;

/// The content type of the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Spawn the metrics server, rendering the given recorder handle on `/metrics`.
///
/// `/health` answers as long as the server is up, for use as a liveness check of the node.
pub fn spawn_prom_server(config: &Config, handle: PrometheusHandle, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<Result<()>> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(health))
        .layer(AddExtensionLayer::new(handle));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server = axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            let _res = shutdown.recv().await;
        });
    tracing::info!(%addr, node_id = config.node_id, "metrics server is listening");
    tokio::spawn(server.map_err(anyhow::Error::from))
}

/// Render every metric recorded on this node.
pub async fn render_metrics(Extension(handle): Extension<PrometheusHandle>) -> (StatusCode, HeaderMap, String) {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EXPOSITION_CONTENT_TYPE));
    (StatusCode::OK, headers, handle.render())
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
