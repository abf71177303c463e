// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dy_adapters::{AllowAllAuth, FakeSpawner};
use dy_core::{Manifest, Profile};
use dy_engine::test_support::{spawned_uuid, FakeWorker};
use dy_gateway::test_support::FakeConnector;
use dy_gateway::{PeerPool, RoundRobin};
use dy_storage::{Store, MANIFESTS, PROFILES};
use std::sync::Arc;

struct Fixture {
    _dir: tempfile::TempDir,
    node: NodeService<FakeSpawner, AllowAllAuth>,
    spawner: FakeSpawner,
}

async fn started_node() -> (Fixture, FakeWorker<FakeSpawner>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("storage")).unwrap();
    store
        .put(MANIFESTS, "echo", &Manifest::new("echo", "/apps/echo"))
        .unwrap();
    store.put(PROFILES, "p0", &Profile::default()).unwrap();

    let spawner = FakeSpawner::new();
    let node = NodeService::new(
        store,
        spawner.clone(),
        AllowAllAuth,
        dir.path().join("apps"),
    );

    let start = {
        let node = node.clone();
        tokio::spawn(async move { node.start_app("echo", "p0").await })
    };
    let uuid = spawned_uuid(&spawner, 0).await.unwrap();
    let engine = node.engine("echo").unwrap();
    let worker = FakeWorker::activate(&engine, &uuid).await.unwrap();
    start.await.unwrap().unwrap();

    (
        Fixture {
            _dir: dir,
            node,
            spawner,
        },
        worker,
    )
}

#[tokio::test]
async fn peer_acceptor_bridges_into_the_local_engine() {
    let (f, mut worker) = started_node().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _task = spawn_peer_acceptor(f.node.clone(), listener);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();

    wire::send(
        &mut writer,
        &PeerRequest::Invoke {
            channel: 7,
            app: "echo".to_string(),
            event: "ping".to_string(),
            headers: vec![],
        },
    )
    .await
    .unwrap();
    wire::send(
        &mut writer,
        &PeerRequest::Data {
            channel: 7,
            frame: Frame::chunk(b"hi".to_vec()),
        },
    )
    .await
    .unwrap();

    // The local worker sees the bridged channel
    let (number, event) = worker.expect_invoke().await;
    assert_eq!(event, "ping");
    let (_, frame) = worker.expect_data().await;
    assert!(matches!(frame, Frame::Chunk { bytes, .. } if bytes == b"hi"));

    worker.send_chunk(number, b"hi");
    worker.send_choke(number);

    // Backward frames come back tagged with the remote channel id
    match wire::recv::<PeerResponse, _>(&mut reader).await.unwrap() {
        PeerResponse::Data {
            channel: 7,
            frame: Frame::Chunk { bytes, .. },
        } => assert_eq!(bytes, b"hi"),
        other => panic!("unexpected response: {other:?}"),
    }
    assert!(matches!(
        wire::recv::<PeerResponse, _>(&mut reader).await.unwrap(),
        PeerResponse::Data {
            channel: 7,
            frame: Frame::Choke { .. }
        }
    ));

    // The bridge used the already-running worker; nothing new was spawned
    assert_eq!(f.spawner.spawn_count(), 1);
}

#[tokio::test]
async fn peer_acceptor_reports_unknown_apps_as_error_frames() {
    let (f, _worker) = started_node().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _task = spawn_peer_acceptor(f.node.clone(), listener);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();

    wire::send(
        &mut writer,
        &PeerRequest::Invoke {
            channel: 1,
            app: "ghost".to_string(),
            event: "ping".to_string(),
            headers: vec![],
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        wire::recv::<PeerResponse, _>(&mut reader).await.unwrap(),
        PeerResponse::Data {
            channel: 1,
            frame: Frame::Error { code, .. }
        } if code == dy_core::code::APP_NOT_FOUND
    ));
}

#[tokio::test]
async fn front_door_forwards_an_enqueue_through_the_gateway() {
    let connector = FakeConnector::new();
    let pool = Arc::new(PeerPool::new(connector.clone()));
    pool.register_real(
        "remote",
        vec!["remote:10055".to_string()],
        false,
        vec!["echo".to_string()],
    );
    let gateway = dy_gateway::Gateway::new(pool, RoundRobin::new(), 4);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _task = spawn_front_door(gateway, listener);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();

    wire::send(
        &mut writer,
        &Request::Enqueue {
            app: "echo".to_string(),
            event: "ping".to_string(),
            headers: vec![],
            worker: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(
        wire::recv::<Response, _>(&mut reader).await.unwrap(),
        Response::EnqueueAccepted
    );

    wire::send(&mut writer, &Frame::chunk(b"hi".to_vec()))
        .await
        .unwrap();

    // The scripted remote node answers
    let mut backend = connector.take_backend().await;
    let (channel, app, event) = backend.expect_invoke().await;
    assert_eq!((app.as_str(), event.as_str()), ("echo", "ping"));
    let (_, frame) = backend.expect_data().await;
    assert!(matches!(frame, Frame::Chunk { bytes, .. } if bytes == b"hi"));

    backend.respond(channel, Frame::chunk(b"hi".to_vec()));
    backend.respond(channel, Frame::choke());

    assert!(matches!(
        wire::recv::<Frame, _>(&mut reader).await.unwrap(),
        Frame::Chunk { bytes, .. } if bytes == b"hi"
    ));
    assert!(matches!(
        wire::recv::<Frame, _>(&mut reader).await.unwrap(),
        Frame::Choke { .. }
    ));
}

#[tokio::test]
async fn front_door_rejects_non_enqueue_requests() {
    let connector = FakeConnector::new();
    let pool = Arc::new(PeerPool::new(connector.clone()));
    let gateway = dy_gateway::Gateway::new(pool, RoundRobin::new(), 4);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _task = spawn_front_door(gateway, listener);

    let stream = TcpStream::connect(addr).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    wire::send(&mut writer, &Request::List).await.unwrap();

    assert!(matches!(
        wire::recv::<Response, _>(&mut reader).await.unwrap(),
        Response::Error { .. }
    ));
}
