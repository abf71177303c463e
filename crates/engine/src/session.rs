// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker session plumbing.
//!
//! A [`WorkerSession`] is the outbound half of a worker connection: the
//! engine pushes [`WorkerMessage`]s into it and a transport task (the
//! daemon's acceptor, or a test harness) drains them to the socket. The
//! inbound half is a [`WorkerPort`]: the surface the transport drives as it
//! decodes messages off the wire.

use crate::control::ControlHandle;
use crate::machine::Machine;
use crate::protocol::WorkerMessage;
use dy_adapters::SpawnAdapter;
use dy_core::{Frame, WorkerId};
use tokio::sync::mpsc;

/// Outbound message stream to one worker.
#[derive(Debug, Clone)]
pub struct WorkerSession {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerSession {
    /// Create a session and the receiver its transport task drains.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a message for the worker. Returns false once the transport is
    /// gone; callers treat that the same as a dead worker and let the
    /// machine's session-closed path clean up.
    pub fn send(&self, msg: WorkerMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Inbound surface of an attached worker connection.
///
/// Returned by the engine when a handshake is accepted. The transport task
/// calls these methods as messages arrive and [`WorkerPort::closed`] when
/// the connection ends. Dropping the port without `closed` tears down the
/// control binding, which requests graceful sealing.
pub struct WorkerPort<S: SpawnAdapter> {
    machine: Machine<S>,
    control: ControlHandle<S>,
}

impl<S: SpawnAdapter> WorkerPort<S> {
    pub(crate) fn new(machine: Machine<S>, control: ControlHandle<S>) -> Self {
        Self { machine, control }
    }

    pub fn worker_id(&self) -> &WorkerId {
        self.machine.id()
    }

    /// Inbound heartbeat.
    pub fn heartbeat(&self) {
        self.machine.on_heartbeat();
    }

    /// Inbound data frame on an open channel.
    pub fn data(&self, channel: u64, frame: Frame) {
        self.machine.on_data_frame(channel, frame);
    }

    /// Worker announced its exit code.
    pub fn terminated(&self, code: i32) {
        self.machine.on_terminated(code);
    }

    /// Worker sent something that is not legal at this point.
    pub fn protocol_violation(&self, message: impl Into<String>) {
        self.machine.on_protocol_violation(message.into());
    }

    /// The connection ended; `error` carries the transport error if any.
    pub fn closed(self, error: Option<String>) {
        // The machine decides whether this is a crash; sealing on control
        // teardown must not fire for a connection that is already gone.
        self.control.disarm();
        self.machine.on_session_closed(error);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
