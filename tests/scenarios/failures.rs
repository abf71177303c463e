//! Worker-death handling: silent reassignment vs surfaced errors.

use crate::prelude::*;
use dy_core::{code, Frame, Invocation, Profile};

/// S4: a worker dies before anything was delivered; the channel silently
/// moves to the other worker and the client never notices.
#[tokio::test]
async fn undelivered_channel_is_reassigned_silently() {
    let cluster = cluster(Profile {
        pool: 2,
        concurrency: 1,
        queue_limit: 8,
        ..Profile::default()
    });
    cluster.engine.failover(2);
    let worker_a = cluster.activate_worker(0).await;
    let mut worker_b = cluster.activate_worker(1).await;
    assert!(wait_until(|| cluster.engine.active_workers() == 2).await);

    // Pin the channel to worker A so we know who dies
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _sink = cluster
        .engine
        .enqueue(Invocation::new("e1"), tx, Some(worker_a.worker_id()))
        .await
        .unwrap();

    // Kill A before any chunk flows
    worker_a.disconnect(Some("killed"));

    // The channel reappears on worker B
    let (number, event) = worker_b.expect_invoke().await;
    assert_eq!(event, "e1");

    // No client-visible error
    assert!(rx.try_recv().is_err());

    worker_b.send_chunk(number, b"answer");
    worker_b.send_choke(number);
    expect_chunk(&mut rx, b"answer").await;
    expect_choke(&mut rx).await;
}

/// S5: after a chunk was delivered the death must surface as a transport
/// error, and the pool heals with a replacement spawn.
#[tokio::test]
async fn delivered_channel_surfaces_transport_error() {
    let cluster = cluster(Profile {
        pool: 2,
        concurrency: 1,
        queue_limit: 8,
        ..Profile::default()
    });
    cluster.engine.failover(2);
    let mut worker_a = cluster.activate_worker(0).await;
    let _worker_b = cluster.activate_worker(1).await;
    assert!(wait_until(|| cluster.engine.active_workers() == 2).await);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = cluster
        .engine
        .enqueue(Invocation::new("e1"), tx, Some(worker_a.worker_id()))
        .await
        .unwrap();

    let (number, _) = worker_a.expect_invoke().await;
    sink.send(Frame::chunk(b"payload".to_vec()));
    let (n, _) = worker_a.expect_data().await;
    assert_eq!(n, number);

    worker_a.disconnect(Some("killed"));

    expect_error(&mut rx, code::WORKER_DIED).await;
    assert!(wait_until(|| cluster.counter(|s| &s.crashed) == 1).await);

    // Rebalance replaces the dead worker
    assert!(wait_until(|| cluster.spawner.spawn_count() == 3).await);
}

/// Spawn failures count as crashes and reject the start deferred.
#[tokio::test]
async fn spawn_failure_rejects_first_active() {
    let cluster = cluster(Profile::default());
    cluster.spawner.fail_next_spawn("binary missing");
    cluster.engine.failover(1);

    let result = cluster.engine.first_active().await;
    assert!(result.is_err());
    assert!(wait_until(|| cluster.counter(|s| &s.crashed) >= 1).await);
}
