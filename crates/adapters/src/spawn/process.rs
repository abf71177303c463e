// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker spawning via `tokio::process`.

use super::{SpawnAdapter, SpawnError, SpawnHandle, SpawnedWorker};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};

/// How long to wait after a graceful signal before force-killing.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Spawns real worker processes with piped stdout.
#[derive(Clone, Default)]
pub struct ProcessSpawner {
    children: Arc<Mutex<HashMap<String, Child>>>,
    next_token: Arc<Mutex<u64>>,
}

impl ProcessSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_child(&self, token: &str) -> Option<Child> {
        self.children.lock().remove(token)
    }
}

#[async_trait]
impl SpawnAdapter for ProcessSpawner {
    async fn spawn(
        &self,
        executable: &Path,
        args: &BTreeMap<String, String>,
        env: &BTreeMap<String, String>,
    ) -> Result<SpawnedWorker, SpawnError> {
        let mut cmd = Command::new(executable);
        for (key, value) in args {
            cmd.arg(format!("--{key}")).arg(value);
        }
        cmd.envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::SpawnFailed(format!("{}: {e}", executable.display())))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpawnError::SpawnFailed("stdout was not captured".to_string()))?;

        let pid = child.id();
        let token = {
            let mut next = self.next_token.lock();
            *next += 1;
            format!("proc-{}", *next)
        };

        tracing::debug!(
            executable = %executable.display(),
            pid = ?pid,
            token = %token,
            "spawned worker process"
        );

        self.children.lock().insert(token.clone(), child);

        Ok(SpawnedWorker {
            handle: SpawnHandle { pid, token },
            stdout: Box::new(stdout),
        })
    }

    async fn terminate(&self, handle: &SpawnHandle) -> Result<(), SpawnError> {
        let Some(mut child) = self.take_child(&handle.token) else {
            // Already reaped or never ours
            return Ok(());
        };

        // Graceful first: SIGTERM through the shell, matching how the rest
        // of the process tooling shells out rather than linking libc.
        if let Some(pid) = handle.pid {
            let _ = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await;

            if let Ok(Ok(status)) = tokio::time::timeout(TERM_GRACE, child.wait()).await {
                tracing::debug!(pid, token = %handle.token, exit = ?status.code(), "worker exited on SIGTERM");
                return Ok(());
            }
        }

        child
            .kill()
            .await
            .map_err(|e| SpawnError::TerminateFailed(e.to_string()))?;
        tracing::debug!(token = %handle.token, "worker force-killed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
