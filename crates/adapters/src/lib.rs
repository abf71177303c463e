// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dy-adapters: external collaborators behind traits
//!
//! The runtime core never talks to the OS or to an authorizer directly; it
//! goes through the adapters here. Each adapter has a production
//! implementation and a recording fake behind the `test-support` feature.

pub mod auth;
pub mod spawn;

pub use auth::{AllowAllAuth, AuthAdapter, AuthError, AuthVerdict};
pub use spawn::{ProcessSpawner, SpawnAdapter, SpawnError, SpawnHandle, SpawnedWorker};

#[cfg(any(test, feature = "test-support"))]
pub use auth::FakeAuth;
#[cfg(any(test, feature = "test-support"))]
pub use spawn::{FakeSpawner, SpawnCall};
