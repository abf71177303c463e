//! Gateway forwarding: replay on recoverable failure, and its limits.

use dy_core::{code, Frame};
use dy_gateway::test_support::FakeConnector;
use dy_gateway::{Gateway, PeerPool, RoundRobin};
use std::sync::Arc;
use tokio::sync::mpsc;

fn gateway_with_two_peers(connector: &FakeConnector) -> Gateway<FakeConnector, RoundRobin> {
    let pool = Arc::new(PeerPool::new(connector.clone()));
    pool.register_real("p1", vec!["h1:1".to_string()], false, vec!["x".to_string()]);
    pool.register_real("p2", vec!["h2:1".to_string()], false, vec!["x".to_string()]);
    Gateway::new(pool, RoundRobin::new(), 4)
}

/// S6: a recoverable failure before any backward frame replays the whole
/// forward prefix on the other peer and the client sees only the answer.
#[tokio::test]
async fn recoverable_failure_replays_on_second_peer() {
    let connector = FakeConnector::new();
    let gateway = gateway_with_two_peers(&connector);

    let (forward_tx, forward_rx) = mpsc::unbounded_channel();
    let (backward_tx, mut backward_rx) = mpsc::unbounded_channel();
    let dispatch = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .dispatch("x", "invoke", Vec::new(), forward_rx, backward_tx)
                .await;
        })
    };

    forward_tx.send(Frame::chunk(b"one chunk".to_vec())).unwrap();

    // First peer takes the invocation and fails recoverably
    let mut first = connector.take_backend().await;
    let (channel, _, _) = first.expect_invoke().await;
    let (_, frame) = first.expect_data().await;
    assert!(matches!(frame, Frame::Chunk { ref bytes, .. } if bytes == b"one chunk"));
    first.respond(channel, Frame::error(code::TRANSPORT, "lost backend"));

    // Second peer sees the identical prefix and answers
    let mut second = connector.take_backend().await;
    let (channel, app, event) = second.expect_invoke().await;
    assert_eq!((app.as_str(), event.as_str()), ("x", "invoke"));
    let (_, frame) = second.expect_data().await;
    assert!(matches!(frame, Frame::Chunk { ref bytes, .. } if bytes == b"one chunk"));

    second.respond(channel, Frame::chunk(b"pong".to_vec()));
    second.respond(channel, Frame::choke());

    assert!(matches!(
        backward_rx.recv().await,
        Some(Frame::Chunk { bytes, .. }) if bytes == b"pong"
    ));
    assert!(matches!(backward_rx.recv().await, Some(Frame::Choke { .. })));
    dispatch.await.unwrap();
}

/// S7: once a backward chunk was delivered, a later recoverable error
/// surfaces instead of retrying.
#[tokio::test]
async fn no_retry_once_the_backend_answered() {
    let connector = FakeConnector::new();
    let gateway = gateway_with_two_peers(&connector);

    let (forward_tx, forward_rx) = mpsc::unbounded_channel();
    let (backward_tx, mut backward_rx) = mpsc::unbounded_channel();
    let dispatch = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway
                .dispatch("x", "invoke", Vec::new(), forward_rx, backward_tx)
                .await;
        })
    };

    forward_tx.send(Frame::chunk(b"one chunk".to_vec())).unwrap();

    let mut first = connector.take_backend().await;
    let (channel, _, _) = first.expect_invoke().await;
    let _ = first.expect_data().await;

    first.respond(channel, Frame::chunk(b"partial".to_vec()));
    first.respond(channel, Frame::error(code::TRANSPORT, "mid-stream failure"));

    assert!(matches!(
        backward_rx.recv().await,
        Some(Frame::Chunk { bytes, .. }) if bytes == b"partial"
    ));
    assert!(matches!(
        backward_rx.recv().await,
        Some(Frame::Error { code: c, .. }) if c == code::TRANSPORT
    ));
    dispatch.await.unwrap();

    // No second connection was ever opened
    assert_eq!(connector.connect_count(), 1);
}
