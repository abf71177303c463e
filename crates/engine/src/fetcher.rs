// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker stdout capture.
//!
//! Each worker gets one fetcher task that owns its stdout descriptor, feeds
//! the [`Splitter`](crate::splitter::Splitter), and publishes complete lines
//! into a bounded drop-oldest ring. The ring snapshot is exposed for
//! diagnostics and dumped to the log when a worker crashes.

use crate::splitter::Splitter;
use dy_core::WorkerId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// Cap on a single captured line; the splitter truncates past it.
const MAX_LINE_BYTES: usize = 4096;

/// Read buffer size for the stdout descriptor.
const READ_CHUNK: usize = 4096;

/// Bounded ring of captured output lines; oldest lines fall off.
#[derive(Debug)]
pub struct OutputRing {
    capacity: usize,
    lines: VecDeque<String>,
}

impl OutputRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Read-only copy of the ring contents, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// Last `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Spawn the fetcher task for a worker's stdout.
///
/// `on_closed` fires exactly once, with the read error if there was one,
/// when the descriptor reaches EOF or fails.
pub(crate) fn spawn_fetcher<R, F>(
    id: WorkerId,
    mut stdout: R,
    ring: Arc<Mutex<OutputRing>>,
    on_closed: F,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
    F: FnOnce(Option<std::io::Error>) + Send + 'static,
{
    tokio::spawn(async move {
        let mut splitter = Splitter::new(MAX_LINE_BYTES);
        let mut buf = vec![0u8; READ_CHUNK];

        let error = loop {
            match stdout.read(&mut buf).await {
                Ok(0) => break None,
                Ok(n) => {
                    splitter.consume(&buf[..n]);
                    while let Some(line) = splitter.next() {
                        tracing::trace!(worker_id = %id, line = %line, "worker output");
                        ring.lock().push(line);
                    }
                }
                Err(e) => break Some(e),
            }
        };

        tracing::debug!(worker_id = %id, error = ?error, "worker stdout closed");
        on_closed(error);
    })
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;
