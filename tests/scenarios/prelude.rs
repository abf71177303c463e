//! Shared fixtures for the scenario tests.

use dy_adapters::{AllowAllAuth, FakeSpawner};
use dy_core::{Frame, Invocation, Manifest, Profile};
use dy_engine::test_support::{spawned_uuid, FakeWorker};
use dy_engine::{BackwardSink, Engine, EnqueueSink};
use std::path::PathBuf;
use tokio::sync::mpsc;

pub use dy_engine::test_support::wait_until;

pub type TestEngine = Engine<FakeSpawner, AllowAllAuth>;
pub type TestSink = EnqueueSink<FakeSpawner, AllowAllAuth>;

pub struct Cluster {
    pub engine: TestEngine,
    pub spawner: FakeSpawner,
}

/// Engine for app "echo" with the given profile; pool target not yet set.
pub fn cluster(profile: Profile) -> Cluster {
    let spawner = FakeSpawner::new();
    let engine = Engine::new(
        Manifest::new("echo", "/apps/echo"),
        profile,
        PathBuf::from("/tmp/echo.sock"),
        spawner.clone(),
        AllowAllAuth,
    );
    Cluster { engine, spawner }
}

impl Cluster {
    /// Wait for the `index`-th spawn and drive that worker to active.
    pub async fn activate_worker(&self, index: usize) -> FakeWorker<FakeSpawner> {
        let uuid = spawned_uuid(&self.spawner, index)
            .await
            .expect("worker was never spawned");
        FakeWorker::activate(&self.engine, &uuid)
            .await
            .expect("handshake refused")
    }

    pub async fn enqueue(
        &self,
        event: &str,
    ) -> (TestSink, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx): (BackwardSink, _) = mpsc::unbounded_channel();
        let sink = self
            .engine
            .enqueue(Invocation::new(event), tx, None)
            .await
            .expect("enqueue failed");
        (sink, rx)
    }

    pub fn counter(&self, pick: fn(&dy_engine::Stats) -> &std::sync::atomic::AtomicU64) -> u64 {
        pick(self.engine.stats()).load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Read one frame, asserting it is a chunk with this payload.
pub async fn expect_chunk(rx: &mut mpsc::UnboundedReceiver<Frame>, payload: &[u8]) {
    match rx.recv().await {
        Some(Frame::Chunk { bytes, .. }) => assert_eq!(bytes, payload),
        other => panic!("expected chunk, got {other:?}"),
    }
}

pub async fn expect_choke(rx: &mut mpsc::UnboundedReceiver<Frame>) {
    match rx.recv().await {
        Some(Frame::Choke { .. }) => {}
        other => panic!("expected choke, got {other:?}"),
    }
}

pub async fn expect_error(rx: &mut mpsc::UnboundedReceiver<Frame>, code: u32) {
    match rx.recv().await {
        Some(Frame::Error { code: c, .. }) => assert_eq!(c, code),
        other => panic!("expected error {code}, got {other:?}"),
    }
}
