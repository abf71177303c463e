// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dy-engine: the per-app worker engine
//!
//! One [`Engine`] runs one app: it keeps a pool of worker processes at a
//! target size, dispatches streaming RPC channels onto active workers,
//! queues what cannot be dispatched yet, and reclaims workers as they die.
//! Workers are external processes reached through a message session; their
//! lifecycle is driven by the per-worker state machine in [`machine`].

pub mod channel;
pub mod control;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod handle;
pub mod machine;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod splitter;
pub mod stats;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use channel::{BackwardSink, ClientChannel};
pub use engine::{Engine, EngineInfo, EnqueueSink};
pub use error::EngineError;
pub use fetcher::OutputRing;
pub use machine::{DeathNotice, Machine, WorkerStats};
pub use protocol::WorkerMessage;
pub use session::{WorkerPort, WorkerSession};
pub use splitter::Splitter;
pub use stats::{Stats, StatsSnapshot};
