//! Normal dispatch: direct assignment, queueing, rejection, sealing.

use crate::prelude::*;
use dy_core::{code, Frame, Profile};
use std::sync::atomic::Ordering;

/// S1: one worker, one invocation, clean round trip.
#[tokio::test]
async fn normal_round_trip() {
    let cluster = cluster(Profile {
        pool: 1,
        concurrency: 2,
        queue_limit: 8,
        ..Profile::default()
    });
    cluster.engine.failover(1);
    let mut worker = cluster.activate_worker(0).await;
    cluster.engine.first_active().await.unwrap();

    let (sink, mut rx) = cluster.enqueue("ping").await;
    sink.send(Frame::chunk(b"hi".to_vec()));
    sink.send(Frame::choke());

    let (number, event) = worker.expect_invoke().await;
    assert_eq!(event, "ping");
    let (_, frame) = worker.expect_data().await;
    assert!(matches!(frame, Frame::Chunk { bytes, .. } if bytes == b"hi"));
    let (_, frame) = worker.expect_data().await;
    assert!(frame.is_terminal());

    worker.send_chunk(number, b"hi");
    worker.send_choke(number);

    expect_chunk(&mut rx, b"hi").await;
    expect_choke(&mut rx).await;

    assert_eq!(cluster.counter(|s| &s.accepted), 1);
    assert_eq!(cluster.counter(|s| &s.rejected), 0);
    assert_eq!(cluster.counter(|s| &s.spawned), 1);
    assert_eq!(cluster.counter(|s| &s.crashed), 0);
}

/// S2: a saturated worker queues arrivals and serves them in FIFO order.
#[tokio::test]
async fn fifo_queueing_under_saturation() {
    let cluster = cluster(Profile {
        pool: 1,
        concurrency: 1,
        queue_limit: 2,
        ..Profile::default()
    });
    cluster.engine.failover(1);
    let mut worker = cluster.activate_worker(0).await;
    cluster.engine.first_active().await.unwrap();

    let (_s1, mut rx1) = cluster.enqueue("e1").await;
    let (n1, event) = worker.expect_invoke().await;
    assert_eq!(event, "e1");

    let (_s2, mut rx2) = cluster.enqueue("e2").await;
    let (_s3, mut rx3) = cluster.enqueue("e3").await;
    assert_eq!(cluster.engine.queue_depth(), 2);

    // Completing e1 frees the slot; e2 must be assigned before e3
    worker.send_choke(n1);
    expect_choke(&mut rx1).await;
    let (n2, event) = worker.expect_invoke().await;
    assert_eq!(event, "e2");

    worker.send_choke(n2);
    expect_choke(&mut rx2).await;
    let (n3, event) = worker.expect_invoke().await;
    assert_eq!(event, "e3");

    worker.send_choke(n3);
    expect_choke(&mut rx3).await;
    assert_eq!(cluster.counter(|s| &s.accepted), 3);
}

/// S3: the queue limit rejects the overflowing enqueue synchronously.
#[tokio::test]
async fn queue_overflow_is_rejected() {
    let cluster = cluster(Profile {
        pool: 1,
        concurrency: 1,
        queue_limit: 2,
        ..Profile::default()
    });
    cluster.engine.failover(1);
    let mut worker = cluster.activate_worker(0).await;
    cluster.engine.first_active().await.unwrap();

    let (_s1, _rx1) = cluster.enqueue("e1").await;
    let _ = worker.expect_invoke().await;
    let (_s2, _rx2) = cluster.enqueue("e2").await;
    let (_s3, _rx3) = cluster.enqueue("e3").await;

    let (tx, _rx4) = tokio::sync::mpsc::unbounded_channel();
    let err = cluster
        .engine
        .enqueue(dy_core::Invocation::new("e4"), tx, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), code::QUEUE_FULL);
    assert_eq!(cluster.counter(|s| &s.rejected), 1);
    assert_eq!(cluster.counter(|s| &s.accepted), 3);
}

/// S8: failover(0) seals; open channels finish, new ones are not taken.
#[tokio::test]
async fn seal_drains_and_retires() {
    let cluster = cluster(Profile {
        pool: 1,
        concurrency: 2,
        queue_limit: 8,
        ..Profile::default()
    });
    cluster.engine.failover(1);
    let mut worker = cluster.activate_worker(0).await;
    cluster.engine.first_active().await.unwrap();

    let (_sink, mut rx) = cluster.enqueue("long").await;
    let (number, _) = worker.expect_invoke().await;

    cluster.engine.failover(0);
    assert!(wait_until(|| cluster.engine.active_workers() == 0).await);

    // A new enqueue cannot land on the sealing worker
    let (_late_sink, _late_rx) = cluster.enqueue("late").await;
    assert_eq!(cluster.engine.queue_depth(), 1);

    // The open channel runs to completion, then the worker retires
    worker.send_chunk(number, b"done");
    worker.send_choke(number);
    expect_chunk(&mut rx, b"done").await;
    expect_choke(&mut rx).await;

    // Drained: the engine asks the worker to terminate; it complies
    let reason = worker.expect_terminate().await;
    assert!(!reason.is_crash());
    worker.announce_terminated(0);

    assert!(wait_until(|| cluster.engine.pool_size() == 0).await);
    assert_eq!(cluster.counter(|s| &s.crashed), 0);
    assert_eq!(
        cluster.engine.stats().spawned.load(Ordering::Relaxed),
        1,
        "no replacement may spawn for a sealed worker"
    );
}
