// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client channel state.
//!
//! A channel is born when a client enqueues an invocation and dies when the
//! worker closes it (choke/error), the client cancels it, or its worker
//! dies. Until a worker is assigned, client frames buffer in the channel;
//! on assignment the buffer drains in order, after which frames flow
//! straight to the worker session.
//!
//! Invariants: once assigned a channel never migrates, except the silent
//! re-queue after a worker death that happened before anything was
//! delivered and before any backward frame; ordering within the channel is
//! preserved in both directions.

use crate::protocol::WorkerMessage;
use crate::session::WorkerSession;
use dy_core::{code, Frame, Invocation, WorkerId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Where backward frames for one channel are written.
pub type BackwardSink = mpsc::UnboundedSender<Frame>;

/// Why an assignment attempt did not happen.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AssignError {
    /// Client cancelled while the channel sat in the queue.
    Cancelled,
    /// Already bound to a worker; assigning twice is a logic error upstream.
    AlreadyAssigned,
}

/// What a cancel found, and what the engine still has to do about it.
#[derive(Debug)]
pub(crate) enum CancelOutcome {
    /// Channel already ran to completion.
    AlreadyDone,
    /// Was still queued; queue entry is dropped lazily at assignment time.
    WhileQueued,
    /// Worker already saw payload; a synthetic error was sent so it can
    /// abort cleanly.
    SyntheticSent,
    /// Nothing was delivered yet; the engine must revoke it from the worker.
    Revoke { worker: WorkerId, number: u64 },
}

#[derive(Debug)]
enum ChannelState {
    Queued {
        buffer: Vec<Frame>,
        cancelled: bool,
    },
    Assigned {
        worker: WorkerId,
        number: u64,
        session: WorkerSession,
        tx_frames: Arc<AtomicU64>,
        delivered: bool,
        backward_seen: bool,
    },
    Done,
}

/// Shared per-channel cell; the enqueue sink, the queue, and the owning
/// worker machine all hold the same `Arc`.
pub struct ClientChannel {
    invocation: Invocation,
    backward: BackwardSink,
    created: Instant,
    state: Mutex<ChannelState>,
    /// Set when the worker closed the channel with choke or error; stays
    /// false for cancellations and engine-side failures.
    completed: AtomicBool,
}

impl ClientChannel {
    pub fn new(invocation: Invocation, backward: BackwardSink) -> Arc<Self> {
        Arc::new(Self {
            invocation,
            backward,
            created: Instant::now(),
            state: Mutex::new(ChannelState::Queued {
                buffer: Vec::new(),
                cancelled: false,
            }),
            completed: AtomicBool::new(false),
        })
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Accept a frame from the client.
    ///
    /// Queued channels buffer it; assigned channels forward it immediately,
    /// marking the channel delivered. Frames after completion are dropped.
    pub fn push_forward(&self, frame: Frame) {
        let mut state = self.state.lock();
        match &mut *state {
            ChannelState::Queued { cancelled: true, .. } | ChannelState::Done => {}
            ChannelState::Queued { buffer, .. } => buffer.push(frame),
            ChannelState::Assigned {
                number,
                session,
                tx_frames,
                delivered,
                ..
            } => {
                if session.send(WorkerMessage::Data {
                    channel: *number,
                    frame,
                }) {
                    tx_frames.fetch_add(1, Ordering::Relaxed);
                }
                *delivered = true;
            }
        }
    }

    /// Bind the channel to a worker: send the invoke frame, then drain
    /// anything the client sent while it was queued, in order.
    pub(crate) fn assign(
        &self,
        worker: WorkerId,
        number: u64,
        session: WorkerSession,
        tx_frames: Arc<AtomicU64>,
    ) -> Result<(), AssignError> {
        let mut state = self.state.lock();
        match &mut *state {
            ChannelState::Queued { cancelled: true, .. } => Err(AssignError::Cancelled),
            ChannelState::Queued { buffer, .. } => {
                if session.send(WorkerMessage::Invoke {
                    channel: number,
                    event: self.invocation.event.clone(),
                    headers: self.invocation.headers.clone(),
                }) {
                    tx_frames.fetch_add(1, Ordering::Relaxed);
                }
                let buffered = std::mem::take(buffer);
                let delivered = !buffered.is_empty();
                for frame in buffered {
                    if session.send(WorkerMessage::Data {
                        channel: number,
                        frame,
                    }) {
                        tx_frames.fetch_add(1, Ordering::Relaxed);
                    }
                }
                *state = ChannelState::Assigned {
                    worker,
                    number,
                    session,
                    tx_frames,
                    delivered,
                    backward_seen: false,
                };
                Ok(())
            }
            ChannelState::Assigned { .. } => Err(AssignError::AlreadyAssigned),
            ChannelState::Done => Err(AssignError::Cancelled),
        }
    }

    /// Forward a worker frame to the client. Returns true if the frame was
    /// terminal and the channel is now done.
    pub(crate) fn deliver_backward(&self, frame: Frame) -> bool {
        let mut state = self.state.lock();
        let terminal = frame.is_terminal();
        if let ChannelState::Assigned { backward_seen, .. } = &mut *state {
            *backward_seen = true;
        }
        // Client may already be gone; cancellation arrives via sink drop
        let _ = self.backward.send(frame);
        if terminal {
            *state = ChannelState::Done;
            self.completed.store(true, Ordering::Relaxed);
        }
        terminal
    }

    /// True when the worker closed the channel itself (choke or error).
    pub fn finished_normally(&self) -> bool {
        self.completed.load(Ordering::Relaxed)
    }

    /// Surface an error to the client and finish the channel.
    pub(crate) fn fail(&self, error_code: u32, message: impl Into<String>) {
        let mut state = self.state.lock();
        if matches!(*state, ChannelState::Done) {
            return;
        }
        let _ = self.backward.send(Frame::error(error_code, message));
        *state = ChannelState::Done;
    }

    /// Called when the owning worker died: decide between silent re-queue
    /// and client-visible failure.
    ///
    /// Returns true if the channel went back to the queued state (nothing
    /// was delivered and nothing came back); the caller re-queues it.
    pub(crate) fn orphan(&self) -> bool {
        let mut state = self.state.lock();
        match &*state {
            ChannelState::Assigned {
                delivered: false,
                backward_seen: false,
                ..
            } => {
                *state = ChannelState::Queued {
                    buffer: Vec::new(),
                    cancelled: false,
                };
                true
            }
            _ => false,
        }
    }

    /// Client went away.
    pub(crate) fn cancel(&self) -> CancelOutcome {
        let mut state = self.state.lock();
        match &mut *state {
            ChannelState::Done => CancelOutcome::AlreadyDone,
            ChannelState::Queued { cancelled, buffer } => {
                *cancelled = true;
                buffer.clear();
                CancelOutcome::WhileQueued
            }
            ChannelState::Assigned {
                worker,
                number,
                session,
                delivered,
                ..
            } => {
                if *delivered {
                    session.send(WorkerMessage::Data {
                        channel: *number,
                        frame: Frame::error(code::CLIENT_DISCONNECTED, "client disconnected"),
                    });
                    CancelOutcome::SyntheticSent
                } else {
                    let outcome = CancelOutcome::Revoke {
                        worker: worker.clone(),
                        number: *number,
                    };
                    *state = ChannelState::Done;
                    outcome
                }
            }
        }
    }

    /// Queue-side check for lazily dropping cancelled entries.
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(
            *self.state.lock(),
            ChannelState::Queued { cancelled: true, .. }
        )
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.state.lock(), ChannelState::Done)
    }

    /// Current binding, if any.
    pub fn assigned_to(&self) -> Option<(WorkerId, u64)> {
        match &*self.state.lock() {
            ChannelState::Assigned { worker, number, .. } => Some((worker.clone(), *number)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientChannel")
            .field("event", &self.invocation.event)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
