//! End-to-end scenarios for the Dockyard runtime.
//!
//! These run the real engine and gateway against fake collaborators: a
//! scripted spawner standing in for the process isolate and in-memory
//! worker sessions standing in for worker processes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "scenarios/prelude.rs"]
mod prelude;

#[path = "scenarios/dispatch.rs"]
mod dispatch;

#[path = "scenarios/failures.rs"]
mod failures;

#[path = "scenarios/forwarding.rs"]
mod forwarding;

#[path = "scenarios/invariants.rs"]
mod invariants;
