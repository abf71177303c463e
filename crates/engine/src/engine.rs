// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-app engine: worker pool, pending queue, and the rebalancer.
//!
//! The engine keeps the pool at its target size, assigns channels to the
//! least-loaded active worker under the concurrency cap, and queues the
//! rest. Rebalance passes coalesce through a dirty bit so concurrent
//! triggers collapse into one runner. Lock order, top-down: pool, then
//! queue, then a channel's own lock; nothing here holds two of them across
//! a loop.

use crate::channel::{CancelOutcome, ClientChannel};
use crate::error::EngineError;
use crate::handle::WorkerHandle;
use crate::machine::{DeathNotice, Machine, MachineHooks, WorkerStats};
use crate::queue::PendingQueue;
use crate::session::{WorkerPort, WorkerSession};
use crate::stats::{Stats, StatsSnapshot};
use dy_adapters::{AuthAdapter, AuthVerdict, SpawnAdapter};
use dy_core::{Frame, Invocation, Manifest, Profile, WorkerId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::oneshot;

/// Where backward frames for a channel should be sent.
pub use crate::channel::BackwardSink;

/// Complete picture of a running engine, as returned by `info`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub app: String,
    pub uptime_secs: u64,
    pub profile: Profile,
    pub pool_target: i64,
    pub pool_size: usize,
    pub active_workers: usize,
    pub queue_depth: usize,
    pub queue_limit: u64,
    pub stats: StatsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<BTreeMap<String, WorkerStats>>,
}

#[derive(Default)]
struct RebalanceFlags {
    running: bool,
    dirty: bool,
}

#[derive(Default)]
struct FirstActive {
    result: Option<Result<(), String>>,
    waiters: Vec<oneshot::Sender<Result<(), String>>>,
}

impl FirstActive {
    /// First resolution wins; later calls are ignored.
    fn resolve(&mut self, result: Result<(), String>) {
        if self.result.is_some() {
            return;
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }
        self.result = Some(result);
    }
}

pub(crate) struct EngineInner<S: SpawnAdapter, A: AuthAdapter> {
    manifest: Manifest,
    profile: Mutex<Profile>,
    endpoint: PathBuf,
    spawner: S,
    auth: A,
    birth: Instant,

    pool: Mutex<HashMap<WorkerId, WorkerHandle<S>>>,
    pool_target: AtomicI64,
    queue: Mutex<PendingQueue>,

    stats: Arc<Stats>,
    rebalance: Mutex<RebalanceFlags>,
    first_active: Mutex<FirstActive>,
    hooks: MachineHooks,
}

/// Cloneable facade over one app's engine.
pub struct Engine<S: SpawnAdapter, A: AuthAdapter> {
    inner: Arc<EngineInner<S, A>>,
}

impl<S: SpawnAdapter, A: AuthAdapter> Clone for Engine<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SpawnAdapter, A: AuthAdapter> Engine<S, A> {
    /// Create an engine for `manifest` with an initial pool target of zero.
    ///
    /// `endpoint` is the socket path workers are told to connect back to.
    /// Call [`Engine::failover`] to start spawning.
    pub fn new(
        manifest: Manifest,
        profile: Profile,
        endpoint: PathBuf,
        spawner: S,
        auth: A,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner<S, A>>| {
            let hooks = MachineHooks {
                on_spawned: {
                    let weak = weak.clone();
                    Arc::new(move |_id| {
                        if let Some(inner) = weak.upgrade() {
                            inner.stats.spawned.fetch_add(1, Ordering::Relaxed);
                        }
                    })
                },
                on_activated: {
                    let weak = weak.clone();
                    Arc::new(move |id| {
                        if let Some(inner) = weak.upgrade() {
                            Engine { inner }.on_worker_activated(id);
                        }
                    })
                },
                on_channel_done: {
                    let weak = weak.clone();
                    Arc::new(move |_id, chan| {
                        if let Some(inner) = weak.upgrade() {
                            Engine { inner }.on_channel_done(chan);
                        }
                    })
                },
                on_death: {
                    let weak = weak.clone();
                    Arc::new(move |notice| {
                        if let Some(inner) = weak.upgrade() {
                            Engine { inner }.on_worker_death(notice);
                        }
                    })
                },
            };

            EngineInner {
                manifest,
                profile: Mutex::new(profile),
                endpoint,
                spawner,
                auth,
                birth: Instant::now(),
                pool: Mutex::new(HashMap::new()),
                pool_target: AtomicI64::new(0),
                queue: Mutex::new(PendingQueue::new()),
                stats: Arc::new(Stats::new(Instant::now())),
                rebalance: Mutex::new(RebalanceFlags::default()),
                first_active: Mutex::new(FirstActive::default()),
                hooks,
            }
        });
        Self { inner }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.inner.manifest
    }

    pub fn endpoint(&self) -> &PathBuf {
        &self.inner.endpoint
    }

    /// Snapshot of the current profile.
    pub fn profile(&self) -> Profile {
        self.inner.profile.lock().clone()
    }

    /// Swap the profile; applies to new workers only.
    pub fn update_profile(&self, profile: Profile) {
        *self.inner.profile.lock() = profile;
    }

    pub fn stats(&self) -> &Stats {
        &self.inner.stats
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.birth.elapsed().as_secs()
    }

    /// Resolves when the first worker reaches active; errs on the first
    /// crash observed before that.
    pub async fn first_active(&self) -> Result<(), String> {
        let rx = {
            let mut first = self.inner.first_active.lock();
            if let Some(result) = &first.result {
                return result.clone();
            }
            let (tx, rx) = oneshot::channel();
            first.waiters.push(tx);
            rx
        };
        match rx.await {
            Ok(result) => result,
            Err(_) => Err("engine stopped".to_string()),
        }
    }

    /// Set the pool target and rebalance toward it.
    pub fn failover(&self, target: i64) {
        tracing::info!(app = %self.inner.manifest.name, target, "pool target changed");
        self.inner.pool_target.store(target, Ordering::SeqCst);
        self.schedule_rebalance();
    }

    /// Enqueue an invocation.
    ///
    /// With `wanted` set, the channel bypasses the queue and must land on
    /// that exact worker. Otherwise the least-loaded active worker under
    /// the concurrency cap takes it directly, or it joins the queue.
    pub async fn enqueue(
        &self,
        invocation: Invocation,
        backward: BackwardSink,
        wanted: Option<WorkerId>,
    ) -> Result<EnqueueSink<S, A>, EngineError> {
        match self
            .inner
            .auth
            .check(
                &self.inner.manifest.name,
                &invocation.event,
                &invocation.headers,
            )
            .await
        {
            Ok(AuthVerdict::Allow) => {}
            Ok(AuthVerdict::Deny { reason }) => {
                return Err(EngineError::Unauthorized(reason));
            }
            Err(e) => return Err(EngineError::AuthUnavailable(e.to_string())),
        }

        let chan = ClientChannel::new(invocation, backward);

        if let Some(id) = wanted {
            let machine = {
                let pool = self.inner.pool.lock();
                match pool.get(&id) {
                    Some(handle) => handle.machine().clone(),
                    None => return Err(EngineError::WorkerNotFound(id)),
                }
            };
            machine.inject(&chan)?;
            self.inner.stats.mark_accepted(Instant::now());
            self.inner.stats.assigned.fetch_add(1, Ordering::Relaxed);
            return Ok(self.sink(chan));
        }

        // Direct assignment if an active worker has a free slot
        if let Some(machine) = self.pick_worker() {
            if machine.inject(&chan).is_ok() {
                self.inner.stats.mark_accepted(Instant::now());
                self.inner.stats.assigned.fetch_add(1, Ordering::Relaxed);
                return Ok(self.sink(chan));
            }
        }

        // Queue, subject to the profile's limit
        let queue_limit = self.inner.profile.lock().queue_limit;
        {
            let mut queue = self.inner.queue.lock();
            if queue.len() as u64 >= queue_limit {
                self.inner.stats.mark_rejected();
                return Err(EngineError::QueueFull);
            }
            queue.push_back(Arc::clone(&chan));
            self.inner.stats.mark_accepted(Instant::now());
            self.inner
                .stats
                .sample_queue_depth(queue.len(), Instant::now());
        }

        // A worker may have freed up while we queued
        self.schedule_rebalance();
        Ok(self.sink(chan))
    }

    fn sink(&self, chan: Arc<ClientChannel>) -> EnqueueSink<S, A> {
        EnqueueSink {
            chan,
            engine: self.clone(),
        }
    }

    /// Least-loaded active worker with a free concurrency slot.
    fn pick_worker(&self) -> Option<Machine<S>> {
        let concurrency = self.inner.profile.lock().concurrency;
        let pool = self.inner.pool.lock();
        pool.values()
            .map(|handle| handle.machine())
            .filter(|m| m.active() && m.load() < concurrency)
            .min_by_key(|m| m.load())
            .cloned()
    }

    /// Bind an inbound worker connection claiming `uuid`.
    ///
    /// The first message on a worker socket must carry the UUID of a worker
    /// this engine actually spawned; anything else is refused and the
    /// acceptor drops the connection.
    pub fn handshake(
        &self,
        uuid: &WorkerId,
        session: WorkerSession,
    ) -> Result<WorkerPort<S>, EngineError> {
        let machine = {
            let pool = self.inner.pool.lock();
            match pool.get(uuid) {
                Some(handle) => handle.machine().clone(),
                None => return Err(EngineError::WorkerNotFound(uuid.clone())),
            }
        };
        let control = machine.on_handshake(session)?;
        Ok(WorkerPort::new(machine, control))
    }

    /// Stop the app: fail queued channels, retire every worker.
    pub fn stop(&self) {
        tracing::info!(app = %self.inner.manifest.name, "engine stopping");
        self.inner.pool_target.store(0, Ordering::SeqCst);
        self.inner
            .first_active
            .lock()
            .resolve(Err("app is stopping".to_string()));

        let drained: Vec<Arc<ClientChannel>> = {
            let mut queue = self.inner.queue.lock();
            let mut drained = Vec::new();
            while let Some(chan) = queue.pop_live() {
                drained.push(chan);
            }
            drained
        };
        for chan in drained {
            chan.fail(dy_core::code::APP_NOT_FOUND, "app is stopping");
        }

        let handles: Vec<WorkerHandle<S>> = {
            let mut pool = self.inner.pool.lock();
            pool.drain().map(|(_, handle)| handle).collect()
        };
        // Dropping each handle terminates its machine with the recorded
        // (shutdown) reason, outside any engine lock
        drop(handles);
    }

    // Snapshots

    pub fn pool_size(&self) -> usize {
        self.inner.pool.lock().len()
    }

    pub fn active_workers(&self) -> usize {
        self.inner
            .pool
            .lock()
            .values()
            .filter(|h| h.machine().active())
            .count()
    }

    pub fn queue_depth(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub fn info(&self, verbose: bool) -> EngineInfo {
        let profile = self.profile();
        let (pool_size, active_workers, workers) = {
            let pool = self.inner.pool.lock();
            let active = pool.values().filter(|h| h.machine().active()).count();
            let workers = verbose.then(|| {
                pool.iter()
                    .map(|(id, handle)| (id.to_string(), handle.machine().stats()))
                    .collect::<BTreeMap<_, _>>()
            });
            (pool.len(), active, workers)
        };
        let queue_depth = self.inner.queue.lock().len();

        EngineInfo {
            app: self.inner.manifest.name.clone(),
            uptime_secs: self.uptime_secs(),
            pool_target: self.inner.pool_target.load(Ordering::SeqCst),
            pool_size,
            active_workers,
            queue_depth,
            queue_limit: profile.queue_limit,
            profile,
            stats: self.inner.stats.snapshot(Instant::now()),
            workers,
        }
    }

    // Machine hooks

    fn on_worker_activated(&self, id: &WorkerId) {
        tracing::debug!(app = %self.inner.manifest.name, worker_id = %id, "worker activated");
        self.inner.first_active.lock().resolve(Ok(()));
        self.schedule_rebalance();
    }

    fn on_channel_done(&self, chan: &Arc<ClientChannel>) {
        if chan.finished_normally() {
            self.inner
                .stats
                .record_latency(chan.created().elapsed(), Instant::now());
        }
        self.schedule_rebalance();
    }

    fn on_worker_death(&self, notice: DeathNotice) {
        tracing::debug!(
            app = %self.inner.manifest.name,
            worker_id = %notice.id,
            reason = %notice.reason,
            requeued = notice.requeue.len(),
            errored = notice.errored,
            "worker death"
        );

        let handle = self.inner.pool.lock().remove(&notice.id);

        if notice.reason.is_crash() {
            self.inner.stats.crashed.fetch_add(1, Ordering::Relaxed);
            self.inner
                .first_active
                .lock()
                .resolve(Err(notice.reason.to_string()));
        }

        if !notice.requeue.is_empty() {
            let mut queue = self.inner.queue.lock();
            // Reverse push keeps the original injection order at the front
            for chan in notice.requeue.into_iter().rev() {
                queue.push_front(chan);
            }
            self.inner
                .stats
                .sample_queue_depth(queue.len(), Instant::now());
        }

        drop(handle);
        self.schedule_rebalance();
    }

    // Client-cancellation path, from the sink's drop

    fn cancel_channel(&self, chan: &Arc<ClientChannel>) {
        match chan.cancel() {
            CancelOutcome::AlreadyDone | CancelOutcome::SyntheticSent => {}
            CancelOutcome::WhileQueued => {
                self.inner.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            CancelOutcome::Revoke { worker, number } => {
                let machine = {
                    let pool = self.inner.pool.lock();
                    pool.get(&worker).map(|h| h.machine().clone())
                };
                if let Some(machine) = machine {
                    machine.revoke(number);
                }
            }
        }
    }

    // Rebalancer

    /// Request a rebalance; concurrent requests coalesce into one runner.
    pub fn schedule_rebalance(&self) {
        {
            let mut flags = self.inner.rebalance.lock();
            if flags.running {
                flags.dirty = true;
                return;
            }
            flags.running = true;
        }

        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                engine.rebalance_workers();
                engine.rebalance_events();

                let again = {
                    let mut flags = engine.inner.rebalance.lock();
                    if flags.dirty {
                        flags.dirty = false;
                        true
                    } else {
                        flags.running = false;
                        false
                    }
                };
                if !again {
                    break;
                }
            }
        });
    }

    /// Grow toward the target; shrink by sealing the least-loaded workers.
    fn rebalance_workers(&self) {
        let target = self.inner.pool_target.load(Ordering::SeqCst).max(0) as usize;
        let profile = self.profile();

        let mut spawn_count = 0;
        let mut to_seal: Vec<Machine<S>> = Vec::new();
        let mut to_drop: Vec<WorkerHandle<S>> = Vec::new();
        {
            let mut pool = self.inner.pool.lock();
            let live: Vec<WorkerId> = pool
                .iter()
                .filter(|(_, h)| h.machine().counts_toward_pool())
                .map(|(id, _)| id.clone())
                .collect();

            if live.len() < target {
                spawn_count = target - live.len();
            } else if live.len() > target {
                let excess = live.len() - target;

                let mut actives: Vec<(u64, WorkerId)> = live
                    .iter()
                    .filter_map(|id| {
                        let machine = pool.get(id)?.machine();
                        machine.active().then(|| (machine.load(), id.clone()))
                    })
                    .collect();
                actives.sort_by_key(|&(load, _)| load);

                for (_, id) in actives.into_iter().take(excess) {
                    if let Some(handle) = pool.get(&id) {
                        to_seal.push(handle.machine().clone());
                    }
                }

                // Not enough active ones: retire workers that never got there
                let remaining = excess.saturating_sub(to_seal.len());
                if remaining > 0 {
                    let not_active: Vec<WorkerId> = live
                        .iter()
                        .filter(|id| {
                            pool.get(id)
                                .map(|h| !h.machine().active())
                                .unwrap_or(false)
                        })
                        .take(remaining)
                        .cloned()
                        .collect();
                    for id in not_active {
                        if let Some(handle) = pool.remove(&id) {
                            to_drop.push(handle);
                        }
                    }
                }
            }
        }

        for machine in to_seal {
            machine.seal();
        }
        drop(to_drop);

        for _ in 0..spawn_count {
            let id = WorkerId::random();
            let machine = Machine::create(
                id.clone(),
                self.inner.manifest.clone(),
                profile.clone(),
                self.inner.endpoint.clone(),
                self.inner.spawner.clone(),
                self.inner.hooks.clone(),
            );
            self.inner
                .pool
                .lock()
                .insert(id, WorkerHandle::new(machine));
        }
    }

    /// Pair queued channels with free workers, FIFO, stopping at the first
    /// assignment failure.
    fn rebalance_events(&self) {
        loop {
            let Some(machine) = self.pick_worker() else {
                break;
            };

            let chan = {
                let mut queue = self.inner.queue.lock();
                let chan = queue.pop_live();
                self.inner
                    .stats
                    .sample_queue_depth(queue.len(), Instant::now());
                chan
            };
            let Some(chan) = chan else {
                break;
            };

            match machine.inject(&chan) {
                Ok(_) => {
                    self.inner.stats.assigned.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    self.inner.queue.lock().push_front(chan);
                    break;
                }
            }
        }
    }
}

/// Client-side sink for one enqueued channel.
///
/// Frames pushed here flow to the worker (or the queue buffer); dropping
/// the sink cancels the channel if it has not completed.
pub struct EnqueueSink<S: SpawnAdapter, A: AuthAdapter> {
    chan: Arc<ClientChannel>,
    engine: Engine<S, A>,
}

impl<S: SpawnAdapter, A: AuthAdapter> std::fmt::Debug for EnqueueSink<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueueSink").finish_non_exhaustive()
    }
}

impl<S: SpawnAdapter, A: AuthAdapter> EnqueueSink<S, A> {
    pub fn send(&self, frame: Frame) {
        self.chan.push_forward(frame);
    }

    pub fn channel(&self) -> &Arc<ClientChannel> {
        &self.chan
    }
}

impl<S: SpawnAdapter, A: AuthAdapter> Drop for EnqueueSink<S, A> {
    fn drop(&mut self) {
        self.engine.cancel_channel(&self.chan);
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
