// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory worker harness for tests.
//!
//! Plays the role of a worker process attached over a session: hands the
//! engine a handshake, answers with heartbeats, and lets tests script the
//! data-plane exchange without sockets or real processes.
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::engine::Engine;
use crate::error::EngineError;
use crate::protocol::WorkerMessage;
use crate::session::{WorkerPort, WorkerSession};
use dy_adapters::{AuthAdapter, FakeSpawner, SpawnAdapter};
use dy_core::{code, Frame, WorkerId};
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll until `cond` holds, with a bounded number of scheduler turns.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F) -> bool {
    for _ in 0..1000 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// Wait for the `index`-th spawn and return the UUID it was given.
pub async fn spawned_uuid(spawner: &FakeSpawner, index: usize) -> Option<WorkerId> {
    if !wait_until(|| spawner.spawn_count() > index).await {
        return None;
    }
    spawner
        .spawn_args()
        .get(index)
        .and_then(|args| args.get("uuid"))
        .map(WorkerId::new)
}

/// A scripted worker attached to an engine.
pub struct FakeWorker<S: SpawnAdapter> {
    port: WorkerPort<S>,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl<S: SpawnAdapter> std::fmt::Debug for FakeWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeWorker").finish_non_exhaustive()
    }
}

impl<S: SpawnAdapter> FakeWorker<S> {
    /// Handshake `uuid` against the engine and keep the resulting port.
    pub fn attach<A: AuthAdapter>(
        engine: &Engine<S, A>,
        uuid: &WorkerId,
    ) -> Result<Self, EngineError> {
        let (session, rx) = WorkerSession::pair();
        let port = engine.handshake(uuid, session)?;
        Ok(Self { port, rx })
    }

    /// Handshake and immediately heartbeat to reach active.
    pub async fn activate<A: AuthAdapter>(
        engine: &Engine<S, A>,
        uuid: &WorkerId,
    ) -> Result<Self, EngineError> {
        let worker = Self::attach(engine, uuid)?;
        worker.heartbeat();
        Ok(worker)
    }

    pub fn worker_id(&self) -> WorkerId {
        self.port.worker_id().clone()
    }

    pub fn heartbeat(&self) {
        self.port.heartbeat();
    }

    /// Backward frames toward the client.
    pub fn send_chunk(&self, channel: u64, bytes: &[u8]) {
        self.port.data(channel, Frame::chunk(bytes.to_vec()));
    }

    pub fn send_choke(&self, channel: u64) {
        self.port.data(channel, Frame::choke());
    }

    pub fn send_error(&self, channel: u64, message: &str) {
        self.port
            .data(channel, Frame::error(code::TRANSPORT, message));
    }

    /// Announce a clean exit.
    pub fn announce_terminated(self, exit_code: i32) {
        self.port.terminated(exit_code);
    }

    /// Tear the connection down, as a crash (`Some(err)`) or silent EOF.
    pub fn disconnect(self, error: Option<&str>) {
        self.port.closed(error.map(str::to_string));
    }

    /// Next engine-to-worker message, heartbeats skipped.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        loop {
            match self.rx.recv().await {
                Some(WorkerMessage::Heartbeat) => continue,
                other => return other,
            }
        }
    }

    /// Expect the next message to open a channel; returns (number, event).
    pub async fn expect_invoke(&mut self) -> (u64, String) {
        match self.recv().await {
            Some(WorkerMessage::Invoke { channel, event, .. }) => (channel, event),
            other => unreachable_message("invoke", other),
        }
    }

    /// Expect a data frame; returns (number, frame).
    pub async fn expect_data(&mut self) -> (u64, Frame) {
        match self.recv().await {
            Some(WorkerMessage::Data { channel, frame }) => (channel, frame),
            other => unreachable_message("data", other),
        }
    }

    /// Expect the terminate control frame.
    pub async fn expect_terminate(&mut self) -> dy_core::TerminateReason {
        match self.recv().await {
            Some(WorkerMessage::Terminate { reason }) => reason,
            other => unreachable_message("terminate", other),
        }
    }
}

fn unreachable_message(expected: &str, got: Option<WorkerMessage>) -> ! {
    // Test-only diagnostic path
    #[allow(clippy::panic)]
    {
        panic!("expected {expected} message, got {got:?}")
    }
}
