// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::BTreeMap;
use tokio::io::AsyncReadExt;

#[tokio::test]
async fn spawn_captures_stdout() {
    let spawner = ProcessSpawner::new();
    let mut worker = spawner
        .spawn(
            Path::new("/bin/echo"),
            &BTreeMap::new(),
            &BTreeMap::new(),
        )
        .await
        .unwrap();

    let mut out = String::new();
    worker.stdout.read_to_string(&mut out).await.unwrap();
    // echo with our --key value arg shape and no args prints a newline
    assert_eq!(out, "\n");
    assert!(worker.handle.pid.is_some());

    spawner.terminate(&worker.handle).await.unwrap();
}

#[tokio::test]
async fn spawn_missing_executable_fails() {
    let spawner = ProcessSpawner::new();
    let err = spawner
        .spawn(
            Path::new("/nonexistent/worker-binary"),
            &BTreeMap::new(),
            &BTreeMap::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SpawnError::SpawnFailed(_)));
}

#[tokio::test]
async fn terminate_stops_long_running_process() {
    let spawner = ProcessSpawner::new();

    // `yes` runs until killed
    let worker = spawner
        .spawn(Path::new("/usr/bin/yes"), &BTreeMap::new(), &BTreeMap::new())
        .await
        .unwrap();

    spawner.terminate(&worker.handle).await.unwrap();

    // Terminating an already-reaped handle is a no-op
    spawner.terminate(&worker.handle).await.unwrap();
}
