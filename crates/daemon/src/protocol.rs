// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client IPC protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload, shared
//! with the other Dockyard protocols via `dy_core::wire`. Most requests
//! are one-shot request/response; `Enqueue` upgrades the connection to a
//! frame stream: the client writes [`dy_core::Frame`]s forward, the daemon
//! writes backward frames, and the connection ends with the backward
//! terminal frame.

use dy_core::{Headers, WorkerId};
use serde::{Deserialize, Serialize};

/// Default IPC timeout for the request/response phase.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Start an app under a named profile
    StartApp { name: String, profile: String },

    /// Stop an app and drain its pool
    PauseApp { name: String },

    /// List running apps
    List,

    /// Inspect one app; `verbose` adds per-worker stats
    Info {
        name: String,
        #[serde(default)]
        verbose: bool,
    },

    /// Open an invocation channel against an app
    Enqueue {
        app: String,
        event: String,
        #[serde(default)]
        headers: Headers,
        /// Pin the channel to one specific worker
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker: Option<WorkerId>,
    },
}

/// Response from the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong { version: String },

    Ok,

    /// App started and its first worker is active
    Started { app: String },

    AppList { apps: Vec<String> },

    AppInfo { info: serde_json::Value },

    /// The enqueue was accepted; the connection is now a frame stream
    EnqueueAccepted,

    Error { code: u32, message: String },
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
