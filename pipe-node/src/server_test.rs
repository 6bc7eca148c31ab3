use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Extension, Json};
use axum::http::{header, StatusCode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::{broadcast, mpsc};

use crate::agent::{AgentCtl, AgentHandle};
use crate::config::Config;
use crate::fixtures::{pipe_meta, RecordingTaskBuilder, TaskAction};
use crate::server::{
    health, heartbeat, put_pipe_metas, region_leader_changed, render_metrics, HeartbeatRequestBody, PipeMetaListBody, RouteChange, RouteChangesBody,
    EXPOSITION_CONTENT_TYPE,
};
use crate::utils;
use pipe_core::proto::{decode_pipe_meta, encode_pipe_meta};
use pipe_core::{PartitionId, PipeMeta, PipeStatus};

fn spawn_agent() -> Result<(AgentHandle, RecordingTaskBuilder, tempfile::TempDir)> {
    let (config, tmpdir) = Config::new_test()?;
    let builder = RecordingTaskBuilder::new();
    let (shutdown_tx, _) = broadcast::channel(1);
    let (tx, rx) = mpsc::channel(100);
    let _ctl = AgentCtl::new(config, Arc::new(builder.clone()), shutdown_tx, rx).spawn();
    Ok((AgentHandle::new(tx), builder, tmpdir))
}

fn body(metas: &[PipeMeta]) -> PipeMetaListBody {
    PipeMetaListBody {
        pipe_meta_list: metas.iter().map(|meta| utils::encode_record(&encode_pipe_meta(meta))).collect(),
    }
}

#[tokio::test]
async fn put_pipes_then_heartbeat() -> Result<()> {
    let (handle, builder, _tmpdir) = spawn_agent()?;
    let desired = pipe_meta("p", 1, PipeStatus::Running, &[(1, 1)]);

    let status = put_pipe_metas(Extension(handle.clone()), Json(body(&[desired.clone()])))
        .await
        .map_err(|(status, msg)| anyhow::anyhow!("{} {}", status, msg))?;
    assert!(status == StatusCode::NO_CONTENT, "expected 204 got {}", status);
    let creates = builder.count(TaskAction::Create);
    assert!(creates == 1, "expected 1 create call got {}", creates);

    let Json(res) = heartbeat(Extension(handle), Json(HeartbeatRequestBody { need_pipe_meta_list: true }))
        .await
        .map_err(|(status, msg)| anyhow::anyhow!("{} {}", status, msg))?;
    let records = res.pipe_meta_list.context("expected heartbeat to carry pipe metas")?;
    assert!(records.len() == 1, "expected 1 record got {}", records.len());
    let meta = decode_pipe_meta(&utils::decode_record(&records[0])?)?;
    assert!(meta.static_meta == desired.static_meta, "expected reported pipe to match pushed pipe");
    assert!(meta.status() == PipeStatus::Running, "expected reported pipe to be RUNNING got {}", meta.status());

    Ok(())
}

#[tokio::test]
async fn heartbeat_without_request_carries_nothing() -> Result<()> {
    let (handle, _builder, _tmpdir) = spawn_agent()?;

    let Json(res) = heartbeat(Extension(handle), Json(HeartbeatRequestBody::default()))
        .await
        .map_err(|(status, msg)| anyhow::anyhow!("{} {}", status, msg))?;

    assert!(res.pipe_meta_list.is_none(), "expected no pipe metas got {:?}", res.pipe_meta_list);

    Ok(())
}

#[tokio::test]
async fn undecodable_records_are_rejected() -> Result<()> {
    let (handle, builder, _tmpdir) = spawn_agent()?;

    let not_base64 = PipeMetaListBody { pipe_meta_list: vec!["%%%".into()] };
    let res = put_pipe_metas(Extension(handle.clone()), Json(not_base64)).await;
    assert!(matches!(res, Err((StatusCode::BAD_REQUEST, _))), "expected 400 for invalid base64 got {:?}", res);

    let not_a_record = PipeMetaListBody { pipe_meta_list: vec![utils::encode_record(&[0xff, 0xff, 0xff])] };
    let res = put_pipe_metas(Extension(handle), Json(not_a_record)).await;
    assert!(matches!(res, Err((StatusCode::BAD_REQUEST, _))), "expected 400 for invalid record got {:?}", res);

    let calls = builder.calls();
    assert!(calls.is_empty(), "expected no task calls got {:?}", calls);

    Ok(())
}

#[tokio::test]
async fn failed_pass_maps_to_server_error() -> Result<()> {
    let (handle, builder, _tmpdir) = spawn_agent()?;
    let desired = pipe_meta("p", 1, PipeStatus::Running, &[(1, 1)]);
    builder.fail_on(&desired.identity(), TaskAction::Create);

    let res = put_pipe_metas(Extension(handle), Json(body(&[desired]))).await;

    match res {
        Err((StatusCode::INTERNAL_SERVER_ERROR, msg)) => {
            assert!(msg.contains("failed to handle pipe meta changes"), "expected aggregate message got {}", msg)
        }
        other => panic!("expected 500 got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn route_changes_move_partitions() -> Result<()> {
    let (handle, builder, _tmpdir) = spawn_agent()?;
    let desired = pipe_meta("p", 1, PipeStatus::Stopped, &[(1, 2)]);
    put_pipe_metas(Extension(handle.clone()), Json(body(&[desired])))
        .await
        .map_err(|(status, msg)| anyhow::anyhow!("{} {}", status, msg))?;

    let changes = RouteChangesBody { changes: vec![RouteChange { partition: 1, leader: 1 }] };
    let status = region_leader_changed(Extension(handle.clone()), Json(changes))
        .await
        .map_err(|(status, msg)| anyhow::anyhow!("{} {}", status, msg))?;

    assert!(status == StatusCode::NO_CONTENT, "expected 204 got {}", status);
    let creates = builder.count(TaskAction::Create);
    assert!(creates == 1, "expected moved partition to be created got {} create calls", creates);

    let Json(res) = heartbeat(Extension(handle), Json(HeartbeatRequestBody { need_pipe_meta_list: true }))
        .await
        .map_err(|(status, msg)| anyhow::anyhow!("{} {}", status, msg))?;
    let records = res.pipe_meta_list.unwrap_or_default();
    let meta = decode_pipe_meta(&utils::decode_record(&records[0])?)?;
    let owner = meta.runtime_meta.assignments.get(&PartitionId(1)).map(|a| a.node_id);
    assert!(owner == Some(1), "expected partition 1 to be owned by node 1 got {:?}", owner);

    Ok(())
}

#[tokio::test]
async fn metrics_are_rendered_as_prometheus_text() -> Result<()> {
    let recorder = PrometheusBuilder::new().add_global_label("node", "1").build();

    let (status, headers, _body) = render_metrics(Extension(recorder.handle())).await;

    assert!(status == StatusCode::OK, "expected 200 got {}", status);
    let content_type = headers.get(header::CONTENT_TYPE).and_then(|val| val.to_str().ok());
    assert!(
        content_type == Some(EXPOSITION_CONTENT_TYPE),
        "expected exposition content type got {:?}",
        content_type
    );
    let status = health().await;
    assert!(status == StatusCode::OK, "expected healthy node got {}", status);

    Ok(())
}
