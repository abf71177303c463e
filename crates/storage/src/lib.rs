// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for Dockyard
//!
//! A small JSON document store over a directory tree. The runtime keeps
//! almost nothing on disk: runlists (what to boot), profiles, and app
//! manifests. Collections are directories, documents are pretty-printed
//! JSON files wrapped in an envelope carrying the save timestamp.

mod runlist;
mod store;

pub use runlist::Runlist;
pub use store::{Store, StoreError};

/// Collection holding boot runlists (`name -> profile name` maps).
pub const RUNLISTS: &str = "runlists";
/// Collection holding app profiles.
pub const PROFILES: &str = "profiles";
/// Collection holding app manifests.
pub const MANIFESTS: &str = "manifests";
