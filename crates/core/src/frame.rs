// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming RPC frames.
//!
//! A channel carries an [`Invocation`] followed by zero or more [`Frame`]s
//! in each direction: chunks, then a terminal choke or error. Headers ride
//! on every frame and carry the tracing context end to end.

use serde::{Deserialize, Serialize};

/// Ordered header list attached to invocations and frames.
pub type Headers = Vec<(String, String)>;

/// Well-known error codes carried in [`Frame::Error`].
pub mod code {
    /// Pending queue at capacity.
    pub const QUEUE_FULL: u32 = 1;
    /// Requested app is not running.
    pub const APP_NOT_FOUND: u32 = 2;
    /// Requested worker does not exist.
    pub const WORKER_NOT_FOUND: u32 = 3;
    /// Requested worker exists but is not accepting channels.
    pub const WORKER_NOT_ACTIVE: u32 = 4;
    /// Worker died while the channel was in flight.
    pub const WORKER_DIED: u32 = 5;
    /// Client went away; propagated to the worker as a synthetic error.
    pub const CLIENT_DISCONNECTED: u32 = 6;
    /// Authorization collaborator denied the invocation.
    pub const UNAUTHORIZED: u32 = 7;
    /// Transport-level failure (peer unreachable, session torn down).
    pub const TRANSPORT: u32 = 8;
    /// No peer advertises the requested app.
    pub const SERVICE_NOT_AVAILABLE: u32 = 9;
    /// Malformed or out-of-order protocol message.
    pub const PROTOCOL: u32 = 10;
}

/// An invocation event: the entry frame of every channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Application event name, e.g. `"ping"`.
    pub event: String,
    #[serde(default)]
    pub headers: Headers,
}

impl Invocation {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_headers(event: impl Into<String>, headers: Headers) -> Self {
        Self {
            event: event.into(),
            headers,
        }
    }
}

/// A single frame on an open channel, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Payload bytes.
    Chunk {
        #[serde(with = "bytes_base64")]
        bytes: Vec<u8>,
        #[serde(default)]
        headers: Headers,
    },
    /// Clean end of stream.
    Choke {
        #[serde(default)]
        headers: Headers,
    },
    /// Abnormal end of stream.
    Error {
        code: u32,
        message: String,
        #[serde(default)]
        headers: Headers,
    },
}

impl Frame {
    pub fn chunk(bytes: impl Into<Vec<u8>>) -> Self {
        Frame::Chunk {
            bytes: bytes.into(),
            headers: Vec::new(),
        }
    }

    pub fn choke() -> Self {
        Frame::Choke {
            headers: Vec::new(),
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
            headers: Vec::new(),
        }
    }

    /// True for the terminal frames of a channel direction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Choke { .. } | Frame::Error { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error { .. })
    }
}

mod bytes_base64 {
    //! Chunk payloads are arbitrary bytes; JSON carries them base64-encoded.

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
