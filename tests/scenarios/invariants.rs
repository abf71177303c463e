//! Quantified invariants: stats conservation, pool bound, no double
//! assignment.

use crate::prelude::*;
use dy_core::Profile;

/// accepted = ever assigned + still queued + cancelled while queued.
#[tokio::test]
async fn stats_conservation() {
    let cluster = cluster(Profile {
        pool: 1,
        concurrency: 8,
        queue_limit: 16,
        ..Profile::default()
    });

    // Three enqueues with no workers: all queued
    let (s1, _rx1) = cluster.enqueue("a").await;
    let (_s2, _rx2) = cluster.enqueue("b").await;
    let (_s3, _rx3) = cluster.enqueue("c").await;
    assert_eq!(cluster.counter(|s| &s.accepted), 3);
    assert_eq!(cluster.engine.queue_depth(), 3);

    // Cancel one while queued
    drop(s1);
    assert_eq!(cluster.counter(|s| &s.cancelled), 1);

    // Bring a worker up; the two live channels get assigned
    cluster.engine.failover(1);
    let mut worker = cluster.activate_worker(0).await;
    let _ = worker.expect_invoke().await;
    let _ = worker.expect_invoke().await;
    assert!(wait_until(|| cluster.engine.queue_depth() == 0).await);

    let accepted = cluster.counter(|s| &s.accepted);
    let assigned = cluster.counter(|s| &s.assigned);
    let cancelled = cluster.counter(|s| &s.cancelled);
    let queued = cluster.engine.queue_depth() as u64;
    assert_eq!(accepted, assigned + queued + cancelled);
}

/// Active workers never exceed the target, and spawns minus deaths equal
/// the pool size.
#[tokio::test]
async fn pool_bound_holds_across_resizes() {
    let cluster = cluster(Profile {
        pool: 2,
        ..Profile::default()
    });
    cluster.engine.failover(2);
    let mut worker_a = cluster.activate_worker(0).await;
    let mut worker_b = cluster.activate_worker(1).await;
    assert!(wait_until(|| cluster.engine.active_workers() == 2).await);
    assert!(cluster.engine.active_workers() <= 2);

    // Shrink: one worker is sealed and asked to terminate; it complies
    cluster.engine.failover(1);
    let a_retires = tokio::select! {
        msg = worker_a.recv() => {
            assert!(matches!(msg, Some(dy_engine::WorkerMessage::Terminate { .. })));
            true
        }
        msg = worker_b.recv() => {
            assert!(matches!(msg, Some(dy_engine::WorkerMessage::Terminate { .. })));
            false
        }
    };
    if a_retires {
        worker_a.announce_terminated(0);
    } else {
        worker_b.announce_terminated(0);
    }

    assert!(wait_until(|| cluster.engine.pool_size() == 1).await);
    assert_eq!(cluster.counter(|s| &s.spawned), 2, "shrink must not respawn");

    // Grow again: exactly one more spawn
    cluster.engine.failover(2);
    assert!(wait_until(|| cluster.counter(|s| &s.spawned) == 3).await);
}

/// A channel lands on exactly one worker.
#[tokio::test]
async fn no_double_assignment() {
    let cluster = cluster(Profile {
        pool: 2,
        concurrency: 4,
        ..Profile::default()
    });
    cluster.engine.failover(2);
    let mut worker_a = cluster.activate_worker(0).await;
    let mut worker_b = cluster.activate_worker(1).await;
    assert!(wait_until(|| cluster.engine.active_workers() == 2).await);

    let (_sink, _rx) = cluster.enqueue("only-once").await;

    // Exactly one of the two workers sees the invoke
    let winner = tokio::select! {
        msg = worker_a.recv() => { assert!(msg.is_some()); "a" }
        msg = worker_b.recv() => { assert!(msg.is_some()); "b" }
    };

    // The loser stays silent
    let silent = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        true
    };
    match winner {
        "a" => assert!(tokio::select! {
            _ = worker_b.recv() => false,
            ok = silent => ok,
        }),
        _ => assert!(tokio::select! {
            _ = worker_a.recv() => false,
            ok = silent => ok,
        }),
    }
}
