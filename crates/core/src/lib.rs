// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dy-core: shared types for the Dockyard runtime
//!
//! Identifiers, clock abstraction, RPC frames, the wire codec, and the
//! app profile/manifest types used by every other crate in the workspace.

pub mod clock;
pub mod frame;
pub mod id;
pub mod manifest;
pub mod profile;
pub mod reason;
pub mod wire;
pub mod worker;

pub use clock::{Clock, FakeClock, SystemClock};
pub use frame::{code, Frame, Headers, Invocation};
pub use manifest::Manifest;
pub use profile::{Profile, ProfileError};
pub use reason::TerminateReason;
pub use wire::{WireError, MAX_MESSAGE_SIZE};
pub use worker::WorkerId;
