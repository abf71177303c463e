// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker termination reasons and crash classification.

use serde::{Deserialize, Serialize};

/// Why a worker was (or is being) terminated.
///
/// Recorded on the worker when termination is requested and carried in the
/// `terminate` control frame so the worker can log it. [`Self::is_crash`]
/// decides whether the death feeds the crash counter: operator-driven
/// shutdown and seal drains do not, everything unexpected does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminateReason {
    /// Normal retirement: app shutdown or pool shrink.
    Shutdown,
    /// The spawner failed to start the process.
    SpawnError { message: String },
    /// The process did not connect back within `spawn_timeout`.
    SpawnTimeout,
    /// Connected but never produced a heartbeat in time.
    HandshakeTimeout,
    /// Heartbeats stopped while the worker was active.
    HeartbeatTimeout,
    /// Sealing did not drain within `seal_timeout`.
    SealTimeout,
    /// The process exited (or its session closed) without being asked to.
    WorkerGone { message: String },
    /// The worker violated the wire protocol.
    Protocol { message: String },
    /// Operator requested termination.
    Requested,
}

impl TerminateReason {
    /// Whether this death counts against the engine's crash counter.
    pub fn is_crash(&self) -> bool {
        match self {
            TerminateReason::Shutdown
            | TerminateReason::SealTimeout
            | TerminateReason::Requested => false,
            TerminateReason::SpawnError { .. }
            | TerminateReason::SpawnTimeout
            | TerminateReason::HandshakeTimeout
            | TerminateReason::HeartbeatTimeout
            | TerminateReason::WorkerGone { .. }
            | TerminateReason::Protocol { .. } => true,
        }
    }
}

impl std::fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminateReason::Shutdown => write!(f, "shutdown"),
            TerminateReason::SpawnError { message } => write!(f, "spawn error: {message}"),
            TerminateReason::SpawnTimeout => write!(f, "spawn timeout"),
            TerminateReason::HandshakeTimeout => write!(f, "handshake timeout"),
            TerminateReason::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            TerminateReason::SealTimeout => write!(f, "seal timeout"),
            TerminateReason::WorkerGone { message } => write!(f, "worker gone: {message}"),
            TerminateReason::Protocol { message } => write!(f, "protocol violation: {message}"),
            TerminateReason::Requested => write!(f, "terminate requested"),
        }
    }
}

#[cfg(test)]
#[path = "reason_tests.rs"]
mod tests;
