// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dy_adapters::{AllowAllAuth, FakeSpawner};
use dy_core::{Frame, Invocation, Manifest, Profile, WorkerId};
use dy_engine::test_support::{spawned_uuid, wait_until};
use dy_engine::Engine;
use tokio::sync::mpsc;

async fn engine_with_acceptor(
    dir: &tempfile::TempDir,
) -> (Engine<FakeSpawner, AllowAllAuth>, FakeSpawner) {
    let spawner = FakeSpawner::new();
    let endpoint = dir.path().join("echo.sock");
    let engine = Engine::new(
        Manifest::new("echo", "/apps/echo"),
        Profile::default(),
        endpoint.clone(),
        spawner.clone(),
        AllowAllAuth,
    );
    let _task = spawn(engine.clone(), &endpoint).unwrap();
    (engine, spawner)
}

#[tokio::test]
async fn worker_session_over_the_socket() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, spawner) = engine_with_acceptor(&dir).await;

    engine.failover(1);
    let uuid = spawned_uuid(&spawner, 0).await.unwrap();

    let stream = UnixStream::connect(dir.path().join("echo.sock"))
        .await
        .unwrap();
    let (mut reader, mut writer) = stream.into_split();

    wire::send(&mut writer, &WorkerMessage::Handshake { uuid: uuid.clone() })
        .await
        .unwrap();
    wire::send(&mut writer, &WorkerMessage::Heartbeat)
        .await
        .unwrap();

    assert!(wait_until(|| engine.active_workers() == 1).await);

    // Run one channel end to end over the wire
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = engine
        .enqueue(Invocation::new("ping"), tx, None)
        .await
        .unwrap();
    sink.send(Frame::chunk(b"hi".to_vec()));
    sink.send(Frame::choke());

    let mut channel = None;
    let mut got_chunk = false;
    loop {
        match wire::recv::<WorkerMessage, _>(&mut reader).await.unwrap() {
            WorkerMessage::Heartbeat => continue,
            WorkerMessage::Invoke { channel: n, event, .. } => {
                assert_eq!(event, "ping");
                channel = Some(n);
            }
            WorkerMessage::Data { frame: Frame::Chunk { bytes, .. }, .. } => {
                assert_eq!(bytes, b"hi");
                got_chunk = true;
            }
            WorkerMessage::Data { frame: Frame::Choke { .. }, .. } => break,
            other => panic!("unexpected message: {other:?}"),
        }
    }
    assert!(got_chunk);
    let channel = channel.unwrap();

    // Respond and verify the backward path
    wire::send(
        &mut writer,
        &WorkerMessage::Data {
            channel,
            frame: Frame::chunk(b"hi".to_vec()),
        },
    )
    .await
    .unwrap();
    wire::send(
        &mut writer,
        &WorkerMessage::Data {
            channel,
            frame: Frame::choke(),
        },
    )
    .await
    .unwrap();

    assert!(matches!(rx.recv().await, Some(Frame::Chunk { bytes, .. }) if bytes == b"hi"));
    assert!(matches!(rx.recv().await, Some(Frame::Choke { .. })));
}

#[tokio::test]
async fn connection_without_handshake_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, spawner) = engine_with_acceptor(&dir).await;
    engine.failover(1);
    let _uuid = spawned_uuid(&spawner, 0).await.unwrap();

    let stream = UnixStream::connect(dir.path().join("echo.sock"))
        .await
        .unwrap();
    let (mut reader, mut writer) = stream.into_split();

    // Heartbeat before handshake is a protocol violation
    wire::send(&mut writer, &WorkerMessage::Heartbeat)
        .await
        .unwrap();

    // The daemon hangs up without a session; the read sees EOF
    let err = wire::recv::<WorkerMessage, _>(&mut reader).await.unwrap_err();
    assert!(matches!(err, wire::WireError::ConnectionClosed));
    assert_eq!(engine.active_workers(), 0);
}

#[tokio::test]
async fn connection_with_unknown_uuid_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, _spawner) = engine_with_acceptor(&dir).await;

    let stream = UnixStream::connect(dir.path().join("echo.sock"))
        .await
        .unwrap();
    let (mut reader, mut writer) = stream.into_split();

    wire::send(
        &mut writer,
        &WorkerMessage::Handshake {
            uuid: WorkerId::new("impostor"),
        },
    )
    .await
    .unwrap();

    let err = wire::recv::<WorkerMessage, _>(&mut reader).await.unwrap_err();
    assert!(matches!(err, wire::WireError::ConnectionClosed));
    assert_eq!(engine.active_workers(), 0);
}

#[tokio::test]
async fn worker_disconnect_is_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let (engine, spawner) = engine_with_acceptor(&dir).await;
    engine.failover(1);
    let uuid = spawned_uuid(&spawner, 0).await.unwrap();

    let stream = UnixStream::connect(dir.path().join("echo.sock"))
        .await
        .unwrap();
    let (_reader, mut writer) = stream.into_split();
    wire::send(&mut writer, &WorkerMessage::Handshake { uuid })
        .await
        .unwrap();
    wire::send(&mut writer, &WorkerMessage::Heartbeat)
        .await
        .unwrap();
    assert!(wait_until(|| engine.active_workers() == 1).await);

    drop(writer);
    drop(_reader);

    assert!(
        wait_until(|| engine
            .stats()
            .crashed
            .load(std::sync::atomic::Ordering::Relaxed)
            == 1)
        .await
    );
    // The replacement spawn follows from the rebalance
    assert!(wait_until(|| spawner.spawn_count() == 2).await);
}
