// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker wire protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, shared
//! with the other Dockyard protocols via `dy_core::wire`.
//!
//! The first inbound message on a worker connection must be `Handshake`
//! with the UUID the worker was spawned with; every later message is either
//! control (heartbeat / terminate / terminated) or a channel-tagged data
//! frame.

use dy_core::{Frame, Headers, TerminateReason, WorkerId};
use serde::{Deserialize, Serialize};

/// Messages exchanged between the engine and a worker, both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// First message from a freshly spawned worker.
    Handshake { uuid: WorkerId },
    /// Liveness beacon, sent by both sides every heartbeat interval.
    Heartbeat,
    /// Engine tells the worker to drain and exit.
    Terminate { reason: TerminateReason },
    /// Worker's final message before exiting.
    Terminated { code: i32 },
    /// Engine opens channel `channel` with an invocation event.
    Invoke {
        channel: u64,
        event: String,
        #[serde(default)]
        headers: Headers,
    },
    /// Data frame on an open channel.
    Data { channel: u64, frame: Frame },
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
