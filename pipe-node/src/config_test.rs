use anyhow::Result;

use super::*;

#[test]
fn config_deserializes_from_full_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("RUST_LOG".into(), "error".into()),
        ("NODE_ID".into(), "3".into()),
        ("HTTP_PORT".into(), "7000".into()),
        ("METRICS_PORT".into(), "7002".into()),
        ("STORAGE_DATA_PATH".into(), "/var/lib/pipe-node".into()),
        ("AGENT_QUEUE_CAPACITY".into(), "4096".into()),
    ])?;

    assert!(config.rust_log == "error", "unexpected value parsed for RUST_LOG, got {}, expected {}", config.rust_log, "error");
    assert!(config.node_id == 3, "unexpected value parsed for NODE_ID, got {}, expected {}", config.node_id, 3);
    assert!(config.http_port == 7000, "unexpected value parsed for HTTP_PORT, got {}, expected {}", config.http_port, 7000);
    assert!(config.metrics_port == 7002, "unexpected value parsed for METRICS_PORT, got {}, expected {}", config.metrics_port, 7002);
    assert!(
        config.storage_data_path == "/var/lib/pipe-node",
        "unexpected value parsed for STORAGE_DATA_PATH, got {}, expected {}",
        config.storage_data_path,
        "/var/lib/pipe-node"
    );
    assert!(
        config.agent_queue_capacity == 4096,
        "unexpected value parsed for AGENT_QUEUE_CAPACITY, got {}, expected {}",
        config.agent_queue_capacity,
        4096
    );

    Ok(())
}

#[test]
fn config_deserializes_from_sparse_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("RUST_LOG".into(), "info".into()),
        ("NODE_ID".into(), "0".into()),
        ("HTTP_PORT".into(), "7000".into()),
        ("METRICS_PORT".into(), "7002".into()),
    ])?;

    assert!(config.node_id == 0, "unexpected value parsed for NODE_ID, got {}, expected {}", config.node_id, 0);
    assert!(
        config.storage_data_path == crate::database::DEFAULT_DATA_PATH,
        "unexpected default for STORAGE_DATA_PATH, got {}, expected {}",
        config.storage_data_path,
        crate::database::DEFAULT_DATA_PATH
    );
    assert!(
        config.agent_queue_capacity == DEFAULT_AGENT_QUEUE_CAPACITY,
        "unexpected default for AGENT_QUEUE_CAPACITY, got {}, expected {}",
        config.agent_queue_capacity,
        DEFAULT_AGENT_QUEUE_CAPACITY
    );

    Ok(())
}

#[test]
fn config_requires_node_id() {
    let res: Result<Config, _> = envy::from_iter(vec![
        ("RUST_LOG".into(), "info".into()),
        ("HTTP_PORT".into(), "7000".into()),
        ("METRICS_PORT".into(), "7002".into()),
    ]);

    assert!(res.is_err(), "expected config without NODE_ID to be rejected, got {:?}", res);
}
