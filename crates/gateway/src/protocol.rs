// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer wire protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, shared
//! with the other Dockyard protocols via `dy_core::wire`. Channels are
//! multiplexed over one peer connection by an explicit channel id chosen
//! by the forwarding side.

use dy_core::{Frame, Headers};
use serde::{Deserialize, Serialize};

/// Gateway to remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerRequest {
    /// Open channel `channel` for `event` on `app`.
    Invoke {
        channel: u64,
        app: String,
        event: String,
        #[serde(default)]
        headers: Headers,
    },
    /// Forward frame on an open channel.
    Data { channel: u64, frame: Frame },
}

/// Remote node back to gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerResponse {
    Data { channel: u64, frame: Frame },
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
