// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker state machine.
//!
//! Drives one worker process through
//! spawning -> handshaking -> active -> sealing -> terminating, owns its
//! spawn handle, stdout fetcher, session, and open-channel table. All
//! transitions are serialized under the machine mutex and bump a generation
//! counter; timers are detached tasks holding a weak handle plus the
//! generation they were armed for, so a stale timer upgrades, compares, and
//! drops silently.

use crate::channel::ClientChannel;
use crate::control::ControlHandle;
use crate::error::EngineError;
use crate::fetcher::{spawn_fetcher, OutputRing};
use crate::protocol::WorkerMessage;
use crate::session::WorkerSession;
use dy_adapters::{SpawnAdapter, SpawnHandle, SpawnedWorker};
use dy_core::{code, Frame, Manifest, Profile, TerminateReason, WorkerId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ring lines dumped to the log when a worker crashes.
const CRASH_DUMP_LINES: usize = 10;

/// Callbacks from a machine into its owning engine.
///
/// Invoked outside every machine lock; the engine is free to take its own
/// locks in them.
#[derive(Clone)]
pub(crate) struct MachineHooks {
    pub on_spawned: Arc<dyn Fn(&WorkerId) + Send + Sync>,
    pub on_activated: Arc<dyn Fn(&WorkerId) + Send + Sync>,
    pub on_channel_done: Arc<dyn Fn(&WorkerId, &Arc<ClientChannel>) + Send + Sync>,
    pub on_death: Arc<dyn Fn(DeathNotice) + Send + Sync>,
}

impl MachineHooks {
    /// Hooks that do nothing; for tests that drive a machine directly.
    #[cfg(any(test, feature = "test-support"))]
    pub fn noop() -> Self {
        Self {
            on_spawned: Arc::new(|_| {}),
            on_activated: Arc::new(|_| {}),
            on_channel_done: Arc::new(|_, _| {}),
            on_death: Arc::new(|_| {}),
        }
    }
}

/// Everything the engine needs to know about a finished worker.
pub struct DeathNotice {
    pub id: WorkerId,
    pub reason: TerminateReason,
    /// Channels to silently re-queue, in original injection order.
    pub requeue: Vec<Arc<ClientChannel>>,
    /// Channels that had to surface a transport error to their clients.
    pub errored: u64,
}

/// Read-only worker stats snapshot, reported by verbose `info`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub state: &'static str,
    pub age_secs: u64,
    pub load: u64,
    pub lifetime_channels: u64,
    pub tx_frames: u64,
    pub rx_frames: u64,
    pub output_tail: Vec<String>,
}

enum MachineState {
    Spawning {
        handle: Option<SpawnHandle>,
    },
    Handshaking {
        session: WorkerSession,
        handle: Option<SpawnHandle>,
    },
    Active {
        session: WorkerSession,
        handle: Option<SpawnHandle>,
    },
    Sealing {
        session: WorkerSession,
        handle: Option<SpawnHandle>,
    },
    Terminating {
        handle: Option<SpawnHandle>,
    },
    Closed,
}

impl MachineState {
    fn name(&self) -> &'static str {
        match self {
            MachineState::Spawning { .. } => "spawning",
            MachineState::Handshaking { .. } => "handshaking",
            MachineState::Active { .. } => "active",
            MachineState::Sealing { .. } => "sealing",
            MachineState::Terminating { .. } => "terminating",
            MachineState::Closed => "closed",
        }
    }

    fn take_handle(&mut self) -> Option<SpawnHandle> {
        match self {
            MachineState::Spawning { handle }
            | MachineState::Handshaking { handle, .. }
            | MachineState::Active { handle, .. }
            | MachineState::Sealing { handle, .. }
            | MachineState::Terminating { handle } => handle.take(),
            MachineState::Closed => None,
        }
    }

    fn session(&self) -> Option<WorkerSession> {
        match self {
            MachineState::Handshaking { session, .. }
            | MachineState::Active { session, .. }
            | MachineState::Sealing { session, .. } => Some(session.clone()),
            _ => None,
        }
    }
}

pub(crate) struct MachineInner<S: SpawnAdapter> {
    id: WorkerId,
    manifest: Manifest,
    profile: Profile,
    endpoint: PathBuf,
    spawner: S,
    hooks: MachineHooks,

    state: Mutex<MachineState>,
    generation: AtomicU64,
    finished: AtomicBool,

    counter: AtomicU64,
    channels: Mutex<HashMap<u64, Arc<ClientChannel>>>,

    output: Arc<Mutex<OutputRing>>,
    last_heartbeat: Mutex<Instant>,
    reason: Mutex<TerminateReason>,

    tx_frames: Arc<AtomicU64>,
    rx_frames: AtomicU64,
    lifetime: AtomicU64,
    birth: Instant,
}

/// Cloneable facade over one worker's state machine.
pub struct Machine<S: SpawnAdapter> {
    inner: Arc<MachineInner<S>>,
}

impl<S: SpawnAdapter> Clone for Machine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SpawnAdapter> Machine<S> {
    /// Create the machine and immediately start spawning its process.
    pub(crate) fn create(
        id: WorkerId,
        manifest: Manifest,
        profile: Profile,
        endpoint: PathBuf,
        spawner: S,
        hooks: MachineHooks,
    ) -> Self {
        let ring_capacity = profile.output_ring_capacity as usize;
        let machine = Self {
            inner: Arc::new(MachineInner {
                id,
                manifest,
                profile,
                endpoint,
                spawner,
                hooks,
                state: Mutex::new(MachineState::Spawning { handle: None }),
                generation: AtomicU64::new(0),
                finished: AtomicBool::new(false),
                counter: AtomicU64::new(0),
                channels: Mutex::new(HashMap::new()),
                output: Arc::new(Mutex::new(OutputRing::new(ring_capacity))),
                last_heartbeat: Mutex::new(Instant::now()),
                reason: Mutex::new(TerminateReason::Shutdown),
                tx_frames: Arc::new(AtomicU64::new(0)),
                rx_frames: AtomicU64::new(0),
                lifetime: AtomicU64::new(0),
                birth: Instant::now(),
            }),
        };

        tracing::debug!(worker_id = %machine.inner.id, "spawning worker");
        machine.arm_timer(0, machine.inner.profile.spawn_timeout(), |m| {
            m.terminate(TerminateReason::SpawnTimeout);
        });

        let spawn_task = machine.clone();
        tokio::spawn(async move {
            let inner = &spawn_task.inner;
            let mut args = inner.manifest.args.clone();
            args.insert("app".to_string(), inner.manifest.name.clone());
            args.insert("uuid".to_string(), inner.id.to_string());
            args.insert(
                "endpoint".to_string(),
                inner.endpoint.display().to_string(),
            );

            let spawned = inner
                .spawner
                .spawn(&inner.manifest.executable, &args, &inner.manifest.env)
                .await;
            match spawned {
                Ok(worker) => spawn_task.on_spawned(worker),
                Err(e) => spawn_task.on_spawn_error(e.to_string()),
            }
        });

        machine
    }

    pub(crate) fn from_inner(inner: Arc<MachineInner<S>>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> &WorkerId {
        &self.inner.id
    }

    pub fn state_name(&self) -> &'static str {
        self.inner.state.lock().name()
    }

    pub fn active(&self) -> bool {
        matches!(*self.inner.state.lock(), MachineState::Active { .. })
    }

    /// Count of currently open channels.
    pub fn load(&self) -> u64 {
        self.inner.channels.lock().len() as u64
    }

    /// True while the worker still counts toward the pool target.
    pub fn counts_toward_pool(&self) -> bool {
        matches!(
            *self.inner.state.lock(),
            MachineState::Spawning { .. }
                | MachineState::Handshaking { .. }
                | MachineState::Active { .. }
        )
    }

    pub(crate) fn recorded_reason(&self) -> TerminateReason {
        self.inner.reason.lock().clone()
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            state: self.state_name(),
            age_secs: self.inner.birth.elapsed().as_secs(),
            load: self.load(),
            lifetime_channels: self.inner.lifetime.load(Ordering::Relaxed),
            tx_frames: self.inner.tx_frames.load(Ordering::Relaxed),
            rx_frames: self.inner.rx_frames.load(Ordering::Relaxed),
            output_tail: self.inner.output.lock().tail(CRASH_DUMP_LINES),
        }
    }

    /// Read-only snapshot of captured stdout.
    pub fn output_snapshot(&self) -> Vec<String> {
        self.inner.output.lock().snapshot()
    }

    // Transitions

    /// A connection presented this worker's UUID: bind its session.
    ///
    /// Only legal while spawning; the returned control handle requests
    /// sealing when dropped.
    pub(crate) fn on_handshake(
        &self,
        session: WorkerSession,
    ) -> Result<ControlHandle<S>, EngineError> {
        let gen = {
            let mut state = self.inner.state.lock();
            match &*state {
                MachineState::Spawning { .. } => {}
                _ => return Err(EngineError::WorkerNotActive(self.inner.id.clone())),
            }
            let handle = state.take_handle();
            *state = MachineState::Handshaking {
                session: session.clone(),
                handle,
            };
            *self.inner.last_heartbeat.lock() = Instant::now();
            self.bump_generation()
        };

        tracing::debug!(worker_id = %self.inner.id, "worker handshake accepted");

        // The worker must produce its first heartbeat within the deadline
        self.arm_timer(gen, self.inner.profile.heartbeat_deadline(), |m| {
            m.terminate(TerminateReason::HandshakeTimeout);
        });
        self.start_heartbeat_sender(gen, session);

        Ok(ControlHandle::new(Arc::downgrade(&self.inner)))
    }

    /// Inbound heartbeat: first one activates, later ones feed the watchdog.
    pub(crate) fn on_heartbeat(&self) {
        *self.inner.last_heartbeat.lock() = Instant::now();

        let activated = {
            let mut state = self.inner.state.lock();
            match &*state {
                MachineState::Handshaking { .. } => {}
                _ => return,
            }
            let handle = state.take_handle();
            let Some(session) = state.session() else {
                return;
            };
            *state = MachineState::Active { session: session.clone(), handle };
            let gen = self.bump_generation();
            (gen, session)
        };

        let (gen, session) = activated;
        tracing::info!(worker_id = %self.inner.id, "worker active");
        self.start_heartbeat_sender(gen, session);
        self.start_heartbeat_watchdog(gen);
        (self.inner.hooks.on_activated)(&self.inner.id);
    }

    /// Open a channel on this worker. Active only.
    pub(crate) fn inject(&self, chan: &Arc<ClientChannel>) -> Result<u64, EngineError> {
        let session = {
            let state = self.inner.state.lock();
            match &*state {
                MachineState::Active { session, .. } => session.clone(),
                _ => return Err(EngineError::WorkerNotActive(self.inner.id.clone())),
            }
        };

        let number = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .channels
            .lock()
            .insert(number, Arc::clone(chan));

        // The assign sends the invoke under the channel lock, so a channel
        // cancelled in the pop-to-assign window leaks nothing to the worker
        if chan
            .assign(
                self.inner.id.clone(),
                number,
                session,
                Arc::clone(&self.inner.tx_frames),
            )
            .is_err()
        {
            self.inner.channels.lock().remove(&number);
            return Err(EngineError::WorkerNotActive(self.inner.id.clone()));
        }
        self.inner.lifetime.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            worker_id = %self.inner.id,
            channel = number,
            event = %chan.invocation().event,
            "channel injected"
        );
        Ok(number)
    }

    /// Stop accepting channels and drain the open ones. Idempotent.
    pub fn seal(&self) {
        let sealed = {
            let mut state = self.inner.state.lock();
            match &*state {
                MachineState::Active { .. } => {}
                _ => return,
            }
            let handle = state.take_handle();
            let Some(session) = state.session() else {
                return;
            };
            *state = MachineState::Sealing { session: session.clone(), handle };
            let gen = self.bump_generation();
            (gen, session)
        };

        let (gen, session) = sealed;
        tracing::info!(worker_id = %self.inner.id, "worker sealing");
        self.arm_timer(gen, self.inner.profile.seal_timeout(), |m| {
            m.terminate(TerminateReason::SealTimeout);
        });
        self.start_heartbeat_sender(gen, session);
        self.start_heartbeat_watchdog(gen);

        if self.inner.channels.lock().is_empty() {
            self.terminate(TerminateReason::Shutdown);
        }
    }

    /// Record a reason and move to terminating: send the terminate frame,
    /// give the worker `terminate_grace` to exit, then force-kill.
    pub fn terminate(&self, reason: TerminateReason) {
        self.shutdown(reason, true);
    }

    /// Record a termination reason without transitioning; the owning
    /// handle applies it when it drops.
    pub fn terminate_later(&self, reason: TerminateReason) {
        *self.inner.reason.lock() = reason;
    }

    /// Terminating without the grace window, for paths where the worker is
    /// already gone (session closed, stdout EOF, spawn failure).
    fn terminate_now(&self, reason: TerminateReason) {
        self.shutdown(reason, false);
    }

    fn shutdown(&self, reason: TerminateReason, graceful: bool) {
        if self.inner.finished.load(Ordering::SeqCst) {
            return;
        }

        let (gen, session, handle) = {
            let mut state = self.inner.state.lock();
            match &*state {
                MachineState::Terminating { .. } | MachineState::Closed => return,
                _ => {}
            }
            *self.inner.reason.lock() = reason.clone();
            let session = state.session();
            let handle = state.take_handle();
            *state = MachineState::Terminating { handle: None };
            (self.bump_generation(), session, handle)
        };

        tracing::info!(worker_id = %self.inner.id, reason = %reason, "worker terminating");

        // With no session there is nothing to drain gracefully
        let graceful = graceful && session.is_some();

        if graceful {
            if let Some(session) = session {
                if session.send(WorkerMessage::Terminate {
                    reason: reason.clone(),
                }) {
                    self.inner.tx_frames.fetch_add(1, Ordering::Relaxed);
                }
            }

            // Put the handle back so the kill timer can reach it
            if let Some(handle) = handle {
                let mut state = self.inner.state.lock();
                if let MachineState::Terminating { handle: slot } = &mut *state {
                    *slot = Some(handle);
                }
            }

            self.arm_timer(gen, self.inner.profile.terminate_grace(), |m| {
                tracing::warn!(worker_id = %m.inner.id, "terminate grace expired, force-killing");
                m.finish();
            });
        } else {
            // Reap whatever the spawner still holds, then close out
            if let Some(handle) = handle {
                let spawner = self.inner.spawner.clone();
                tokio::spawn(async move {
                    let _ = spawner.terminate(&handle).await;
                });
            }
            self.finish();
        }
    }

    /// Final cleanup: reap the process, settle channels, notify the engine.
    fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let reason = self.recorded_reason();
        let handle = {
            let mut state = self.inner.state.lock();
            let handle = state.take_handle();
            *state = MachineState::Closed;
            self.bump_generation();
            handle
        };

        if let Some(handle) = handle {
            let spawner = self.inner.spawner.clone();
            tokio::spawn(async move {
                let _ = spawner.terminate(&handle).await;
            });
        }

        // Settle open channels: silently re-queue the untouched ones (in
        // injection order), error the rest to their clients.
        let mut open: Vec<(u64, Arc<ClientChannel>)> =
            self.inner.channels.lock().drain().collect();
        open.sort_by_key(|&(number, _)| number);

        let mut requeue = Vec::new();
        let mut errored = 0u64;
        for (_, chan) in open {
            if chan.orphan() {
                requeue.push(chan);
            } else if !chan.is_done() {
                chan.fail(code::WORKER_DIED, format!("worker died: {reason}"));
                errored += 1;
            }
        }

        if reason.is_crash() {
            let tail = self.inner.output.lock().tail(CRASH_DUMP_LINES);
            tracing::warn!(
                worker_id = %self.inner.id,
                reason = %reason,
                output_tail = ?tail,
                "worker crashed"
            );
        } else {
            tracing::info!(worker_id = %self.inner.id, reason = %reason, "worker closed");
        }

        (self.inner.hooks.on_death)(DeathNotice {
            id: self.inner.id.clone(),
            reason,
            requeue,
            errored,
        });
    }

    // Inbound events from the session and the fetcher

    pub(crate) fn on_data_frame(&self, number: u64, frame: Frame) {
        self.inner.rx_frames.fetch_add(1, Ordering::Relaxed);

        let Some(chan) = self.inner.channels.lock().get(&number).cloned() else {
            tracing::warn!(worker_id = %self.inner.id, channel = number, "frame for unknown channel");
            return;
        };

        if chan.deliver_backward(frame) {
            self.inner.channels.lock().remove(&number);
            self.after_channel_removed(&chan);
        }
    }

    /// Drop a channel the client walked away from before delivery.
    pub(crate) fn revoke(&self, number: u64) {
        let Some(chan) = self.inner.channels.lock().remove(&number) else {
            return;
        };
        tracing::debug!(worker_id = %self.inner.id, channel = number, "channel revoked");
        self.after_channel_removed(&chan);
    }

    fn after_channel_removed(&self, chan: &Arc<ClientChannel>) {
        (self.inner.hooks.on_channel_done)(&self.inner.id, chan);

        let drained = self.inner.channels.lock().is_empty()
            && matches!(*self.inner.state.lock(), MachineState::Sealing { .. });
        if drained {
            self.terminate(TerminateReason::Shutdown);
        }
    }

    pub(crate) fn on_terminated(&self, exit_code: i32) {
        let terminating = matches!(
            *self.inner.state.lock(),
            MachineState::Terminating { .. } | MachineState::Closed
        );
        if terminating {
            // Graceful response to our terminate frame
            self.finish();
        } else {
            self.terminate_now(TerminateReason::WorkerGone {
                message: format!("announced exit with code {exit_code}"),
            });
        }
    }

    pub(crate) fn on_session_closed(&self, error: Option<String>) {
        let terminating = matches!(
            *self.inner.state.lock(),
            MachineState::Terminating { .. } | MachineState::Closed
        );
        if terminating {
            self.finish();
        } else {
            let message = error.unwrap_or_else(|| "session closed".to_string());
            self.terminate_now(TerminateReason::WorkerGone { message });
        }
    }

    pub(crate) fn on_protocol_violation(&self, message: String) {
        tracing::warn!(worker_id = %self.inner.id, message = %message, "protocol violation");
        self.terminate_now(TerminateReason::Protocol { message });
    }

    fn on_spawned(&self, worker: SpawnedWorker) {
        let start_fetcher = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                MachineState::Spawning { handle }
                | MachineState::Handshaking { handle, .. }
                | MachineState::Active { handle, .. }
                | MachineState::Sealing { handle, .. } => {
                    *handle = Some(worker.handle.clone());
                    true
                }
                MachineState::Terminating { .. } | MachineState::Closed => false,
            }
        };

        if !start_fetcher {
            // Terminated while the spawn was in flight
            let spawner = self.inner.spawner.clone();
            let handle = worker.handle;
            tokio::spawn(async move {
                let _ = spawner.terminate(&handle).await;
            });
            return;
        }

        let machine = self.clone();
        spawn_fetcher(
            self.inner.id.clone(),
            worker.stdout,
            Arc::clone(&self.inner.output),
            move |err| machine.on_stdout_closed(err),
        );

        (self.inner.hooks.on_spawned)(&self.inner.id);
    }

    fn on_spawn_error(&self, message: String) {
        tracing::warn!(worker_id = %self.inner.id, message = %message, "spawn failed");
        self.terminate_now(TerminateReason::SpawnError { message });
    }

    fn on_stdout_closed(&self, error: Option<std::io::Error>) {
        let terminating = matches!(
            *self.inner.state.lock(),
            MachineState::Terminating { .. } | MachineState::Closed
        );
        if terminating {
            self.finish();
        } else {
            let message = match error {
                Some(e) => format!("stdout error: {e}"),
                None => "process exited".to_string(),
            };
            self.terminate_now(TerminateReason::WorkerGone { message });
        }
    }

    // Timer plumbing

    fn bump_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// One-shot timer bound to a generation; fires only if no transition
    /// happened in between and the machine is still alive.
    fn arm_timer<F>(&self, gen: u64, delay: Duration, f: F)
    where
        F: FnOnce(Machine<S>) + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.generation.load(Ordering::SeqCst) != gen {
                return;
            }
            f(Machine { inner });
        });
    }

    fn start_heartbeat_sender(&self, gen: u64, session: WorkerSession) {
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.profile.heartbeat_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.generation.load(Ordering::SeqCst) != gen {
                    return;
                }
                if session.send(WorkerMessage::Heartbeat) {
                    inner.tx_frames.fetch_add(1, Ordering::Relaxed);
                } else {
                    return;
                }
            }
        });
    }

    fn start_heartbeat_watchdog(&self, gen: u64) {
        let weak = Arc::downgrade(&self.inner);
        let deadline = self.inner.profile.heartbeat_deadline();
        tokio::spawn(async move {
            loop {
                let wait = {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    if inner.generation.load(Ordering::SeqCst) != gen {
                        return;
                    }
                    let due = *inner.last_heartbeat.lock() + deadline;
                    due.checked_duration_since(Instant::now())
                };
                match wait {
                    Some(remaining) => tokio::time::sleep(remaining).await,
                    None => {
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        if inner.generation.load(Ordering::SeqCst) != gen {
                            return;
                        }
                        Machine { inner }.terminate(TerminateReason::HeartbeatTimeout);
                        return;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
