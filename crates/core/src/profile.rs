// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App profile: tunables applied to new workers.
//!
//! Profiles are mutable for a running app; readers always take a snapshot
//! (the type is `Clone` and cheap to copy). All timeouts have finite
//! defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Profile validation errors
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("output ring capacity must be at least 1")]
    ZeroRingCapacity,
}

/// Tunable parameters applied to new workers of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    /// Target pool size.
    #[serde(default = "defaults::pool")]
    pub pool: u64,
    /// Maximum concurrent channels per worker.
    #[serde(default = "defaults::concurrency")]
    pub concurrency: u64,
    /// Pending queue capacity; enqueues past it are rejected.
    #[serde(default = "defaults::queue_limit")]
    pub queue_limit: u64,
    #[serde(default = "defaults::spawn_timeout_ms")]
    pub spawn_timeout_ms: u64,
    #[serde(default = "defaults::heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "defaults::heartbeat_grace_ms")]
    pub heartbeat_grace_ms: u64,
    #[serde(default = "defaults::seal_timeout_ms")]
    pub seal_timeout_ms: u64,
    #[serde(default = "defaults::terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// Capacity of the worker stdout ring buffer.
    #[serde(default = "defaults::output_ring_capacity")]
    pub output_ring_capacity: u64,
}

mod defaults {
    pub fn pool() -> u64 {
        1
    }
    pub fn concurrency() -> u64 {
        10
    }
    pub fn queue_limit() -> u64 {
        100
    }
    pub fn spawn_timeout_ms() -> u64 {
        10_000
    }
    pub fn heartbeat_interval_ms() -> u64 {
        10_000
    }
    pub fn heartbeat_grace_ms() -> u64 {
        5_000
    }
    pub fn seal_timeout_ms() -> u64 {
        30_000
    }
    pub fn terminate_grace_ms() -> u64 {
        5_000
    }
    pub fn output_ring_capacity() -> u64 {
        100
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            pool: defaults::pool(),
            concurrency: defaults::concurrency(),
            queue_limit: defaults::queue_limit(),
            spawn_timeout_ms: defaults::spawn_timeout_ms(),
            heartbeat_interval_ms: defaults::heartbeat_interval_ms(),
            heartbeat_grace_ms: defaults::heartbeat_grace_ms(),
            seal_timeout_ms: defaults::seal_timeout_ms(),
            terminate_grace_ms: defaults::terminate_grace_ms(),
            output_ring_capacity: defaults::output_ring_capacity(),
        }
    }
}

impl Profile {
    /// Check invariants that serde defaults cannot enforce.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.concurrency == 0 {
            return Err(ProfileError::ZeroConcurrency);
        }
        if self.output_ring_capacity == 0 {
            return Err(ProfileError::ZeroRingCapacity);
        }
        Ok(())
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_millis(self.spawn_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Watchdog deadline: interval plus grace.
    pub fn heartbeat_deadline(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms + self.heartbeat_grace_ms)
    }

    pub fn seal_timeout(&self) -> Duration {
        Duration::from_millis(self.seal_timeout_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
