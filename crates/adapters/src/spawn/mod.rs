// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process spawning adapter.
//!
//! The engine asks this adapter to start worker processes and to terminate
//! them; everything else about process isolation lives behind it. The
//! contract is intentionally narrow: `spawn(path, args, env)` yields an
//! opaque handle plus the child's stdout, and `terminate(handle)` is
//! best-effort graceful then forceful.

mod process;

pub use process::ProcessSpawner;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSpawner, SpawnCall};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Errors from spawn operations
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("terminate failed: {0}")]
    TerminateFailed(String),
}

/// Opaque handle to a spawned worker process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpawnHandle {
    /// OS pid when known; fakes leave it unset.
    pub pid: Option<u32>,
    /// Adapter-internal token identifying the process.
    pub token: String,
}

/// A freshly spawned worker: its handle and captured stdout.
pub struct SpawnedWorker {
    pub handle: SpawnHandle,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
}

impl std::fmt::Debug for SpawnedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedWorker")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Adapter for spawning and terminating worker processes
#[async_trait]
pub trait SpawnAdapter: Clone + Send + Sync + 'static {
    /// Spawn a worker process.
    ///
    /// `args` are passed as `--key value` pairs; `env` extends the child
    /// environment. The child's stdout is captured for the output fetcher.
    async fn spawn(
        &self,
        executable: &Path,
        args: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Result<SpawnedWorker, SpawnError>;

    /// Terminate a previously spawned process: graceful first, then forced.
    async fn terminate(&self, handle: &SpawnHandle) -> Result<(), SpawnError>;
}
