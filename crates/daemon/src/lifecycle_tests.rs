// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::GatewayConfig;

fn config_in(dir: &tempfile::TempDir) -> Config {
    Config {
        state_dir: dir.path().join("state"),
        runlist: String::new(),
        gateway: GatewayConfig::default(),
    }
}

#[tokio::test]
async fn startup_creates_layout_and_binds_socket() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let startup = startup(&config).await.unwrap();
    assert!(config.state_dir.is_dir());
    assert!(config.apps_dir().is_dir());
    assert!(config.socket_path().exists());
    assert!(config.lock_path().exists());
    assert!(startup.boot_report.started.is_empty());
    assert!(startup.gateway_tasks.is_empty());
    assert!(startup.node.list().is_empty());
}

#[tokio::test]
async fn second_instance_is_locked_out() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let _first = startup(&config).await.unwrap();
    let err = startup(&config).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
}

#[tokio::test]
async fn gateway_listeners_come_up_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.gateway.enabled = true;
    config.gateway.listen = "127.0.0.1:0".to_string();
    config.gateway.peer_listen = "127.0.0.1:0".to_string();

    let startup = startup(&config).await.unwrap();
    assert_eq!(startup.gateway_tasks.len(), 2);
}

#[tokio::test]
async fn boot_runlist_failures_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.runlist = "boot".to_string();

    // Seed a runlist whose single app has no manifest
    let store = dy_storage::Store::open(config.storage_dir()).unwrap();
    let runlist: dy_storage::Runlist = [("ghost".to_string(), "p0".to_string())]
        .into_iter()
        .collect();
    runlist.write(&store, "boot").unwrap();

    let startup = startup(&config).await.unwrap();
    assert!(startup.boot_report.started.is_empty());
    assert_eq!(startup.boot_report.failed.len(), 1);
    assert_eq!(startup.boot_report.failed[0].0, "ghost");
}
