//! The pipe node controller.

mod agent;
mod app;
mod assigner;
#[cfg(test)]
mod assigner_test;
mod config;
#[cfg(test)]
mod config_test;
mod database;
mod error;
#[cfg(test)]
mod fixtures;
mod server;
#[cfg(test)]
mod server_test;
mod task;
mod utils;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::prelude::*;

use crate::app::App;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup tracing/logging system.
    tracing_subscriber::registry()
        // Filter spans based on the RUST_LOG env var.
        .with(tracing_subscriber::EnvFilter::from_default_env())
        // Send a copy of all spans to stdout in compact form.
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true),
        )
        // Install this registry as the global tracing registry.
        .try_init()
        .context("error initializing logging/tracing system")?;

    let cfg = Arc::new(Config::new()?);
    let recorder = PrometheusBuilder::new().add_global_label("node", cfg.node_id.to_string()).build();
    let prom_handle = recorder.handle();
    metrics::set_boxed_recorder(Box::new(recorder)).context("error setting prometheus metrics recorder")?;

    tracing::info!(
        node_id = cfg.node_id,
        http_port = %cfg.http_port,
        metrics_port = %cfg.metrics_port,
        storage_data_path = %cfg.storage_data_path,
        "starting pipe node",
    );
    if let Err(err) = App::new(cfg, prom_handle).await?.spawn().await {
        tracing::error!(error = ?err);
    }

    // Ensure any pending output is flushed.
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    Ok(())
}
