// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake spawner for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SpawnAdapter, SpawnError, SpawnHandle, SpawnedWorker};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::DuplexStream;

/// Recorded spawn call
#[derive(Debug, Clone)]
pub enum SpawnCall {
    Spawn {
        executable: PathBuf,
        args: BTreeMap<String, String>,
        env: BTreeMap<String, String>,
    },
    Terminate {
        token: String,
    },
}

struct FakeSpawnerState {
    calls: Vec<SpawnCall>,
    stdout_writers: HashMap<String, DuplexStream>,
    terminated: Vec<String>,
    fail_next: Option<String>,
    next_id: u64,
}

/// Fake spawn adapter for testing.
///
/// Records every call, hands out an in-memory stdout pipe per spawned
/// worker, and can be told to fail the next spawn.
#[derive(Clone)]
pub struct FakeSpawner {
    inner: Arc<Mutex<FakeSpawnerState>>,
}

impl Default for FakeSpawner {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeSpawnerState {
                calls: Vec::new(),
                stdout_writers: HashMap::new(),
                terminated: Vec::new(),
                fail_next: None,
                next_id: 0,
            })),
        }
    }
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<SpawnCall> {
        self.inner.lock().calls.clone()
    }

    /// Args of every recorded spawn, in order.
    pub fn spawn_args(&self) -> Vec<BTreeMap<String, String>> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SpawnCall::Spawn { args, .. } => Some(args.clone()),
                SpawnCall::Terminate { .. } => None,
            })
            .collect()
    }

    /// Number of spawns recorded so far.
    pub fn spawn_count(&self) -> usize {
        self.spawn_args().len()
    }

    /// Fail the next `spawn` call with the given message.
    pub fn fail_next_spawn(&self, message: impl Into<String>) {
        self.inner.lock().fail_next = Some(message.into());
    }

    /// Take the write end of a spawned worker's stdout pipe.
    pub fn take_stdout_writer(&self, token: &str) -> Option<DuplexStream> {
        self.inner.lock().stdout_writers.remove(token)
    }

    /// Tokens passed to `terminate`, in order.
    pub fn terminated(&self) -> Vec<String> {
        self.inner.lock().terminated.clone()
    }
}

#[async_trait]
impl SpawnAdapter for FakeSpawner {
    async fn spawn(
        &self,
        executable: &Path,
        args: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Result<SpawnedWorker, SpawnError> {
        let mut inner = self.inner.lock();

        inner.calls.push(SpawnCall::Spawn {
            executable: executable.to_path_buf(),
            args: args.clone(),
            env: env.clone(),
        });

        if let Some(message) = inner.fail_next.take() {
            return Err(SpawnError::SpawnFailed(message));
        }

        inner.next_id += 1;
        let token = format!("fake-{}", inner.next_id);

        let (writer, reader) = tokio::io::duplex(64 * 1024);
        inner.stdout_writers.insert(token.clone(), writer);

        Ok(SpawnedWorker {
            handle: SpawnHandle { pid: None, token },
            stdout: Box::new(reader),
        })
    }

    async fn terminate(&self, handle: &SpawnHandle) -> Result<(), SpawnError> {
        let mut inner = self.inner.lock();

        inner.calls.push(SpawnCall::Terminate {
            token: handle.token.clone(),
        });
        inner.terminated.push(handle.token.clone());

        // Dropping the writer closes the worker's stdout
        inner.stdout_writers.remove(&handle.token);

        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
