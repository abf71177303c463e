// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peers and the peer pool.
//!
//! A peer is one remote host, reusable across many concurrent channels.
//! Connection is lazy: the first send kicks off an async connect and
//! queues frames, which flush in order on success. The pool is keyed by
//! the peer UUID and driven by an external service-discovery callback via
//! `register_real` / `unregister_real`.

use crate::balancer::Balancer;
use crate::connector::PeerConnector;
use crate::error::GatewayError;
use crate::protocol::{PeerRequest, PeerResponse};
use dy_core::{Frame, Headers};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a channel's owner hears back from its peer.
#[derive(Debug)]
pub enum PeerEvent {
    /// Backward frame from the remote worker.
    Frame(Frame),
    /// The peer connection is gone; the channel will hear nothing more.
    Lost,
}

enum ConnState {
    Idle,
    Connecting { pending: Vec<PeerRequest> },
    Connected { tx: mpsc::UnboundedSender<PeerRequest> },
}

struct PeerInner<C: PeerConnector> {
    uuid: String,
    endpoints: Vec<String>,
    local: bool,
    connector: C,
    state: Mutex<ConnState>,
    routes: Mutex<HashMap<u64, mpsc::UnboundedSender<PeerEvent>>>,
    next_channel: AtomicU64,
}

/// One remote host.
pub struct Peer<C: PeerConnector> {
    inner: Arc<PeerInner<C>>,
}

impl<C: PeerConnector> std::fmt::Debug for Peer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").finish_non_exhaustive()
    }
}

impl<C: PeerConnector> Clone for Peer<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: PeerConnector> Peer<C> {
    pub fn new(uuid: String, endpoints: Vec<String>, local: bool, connector: C) -> Self {
        Self {
            inner: Arc::new(PeerInner {
                uuid,
                endpoints,
                local,
                connector,
                state: Mutex::new(ConnState::Idle),
                routes: Mutex::new(HashMap::new()),
                next_channel: AtomicU64::new(0),
            }),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.inner.uuid
    }

    pub fn is_local(&self) -> bool {
        self.inner.local
    }

    /// Open a logical channel over this peer; backward events arrive on
    /// `events`.
    pub fn open_channel(&self, events: mpsc::UnboundedSender<PeerEvent>) -> PeerChannel<C> {
        let number = self.inner.next_channel.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.routes.lock().insert(number, events);
        PeerChannel {
            peer: self.clone(),
            number,
        }
    }

    /// Queue a request, connecting lazily on first use.
    fn send(&self, msg: PeerRequest) {
        let connect_now = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                ConnState::Connected { tx } => {
                    match tx.send(msg) {
                        Ok(()) => return,
                        Err(undelivered) => {
                            // Writer is gone; reconnect with the message
                            // queued so nothing is lost
                            *state = ConnState::Connecting {
                                pending: vec![undelivered.0],
                            };
                            true
                        }
                    }
                }
                ConnState::Connecting { pending } => {
                    pending.push(msg);
                    return;
                }
                ConnState::Idle => {
                    *state = ConnState::Connecting {
                        pending: vec![msg],
                    };
                    true
                }
            }
        };

        if connect_now {
            let peer = self.clone();
            tokio::spawn(async move {
                peer.run_connect().await;
            });
        }
    }

    async fn run_connect(&self) {
        let result = self
            .inner
            .connector
            .connect(&self.inner.endpoints)
            .await;

        match result {
            Ok(conn) => {
                // Flush the backlog before publishing the connection, under
                // the state lock, so frames queued while connecting cannot
                // be overtaken by concurrent sends (sends are non-blocking)
                let flushed = {
                    let mut state = self.inner.state.lock();
                    let pending = match &mut *state {
                        ConnState::Connecting { pending } => std::mem::take(pending),
                        _ => Vec::new(),
                    };
                    let flushed = pending.len();
                    for msg in pending {
                        if conn.tx.send(msg).is_err() {
                            break;
                        }
                    }
                    *state = ConnState::Connected {
                        tx: conn.tx.clone(),
                    };
                    flushed
                };

                tracing::debug!(peer = %self.inner.uuid, flushed, "peer session up");

                let peer = self.clone();
                let mut rx = conn.rx;
                tokio::spawn(async move {
                    while let Some(PeerResponse::Data { channel, frame }) = rx.recv().await {
                        peer.route(channel, frame);
                    }
                    peer.on_connection_lost();
                });
            }
            Err(e) => {
                tracing::warn!(peer = %self.inner.uuid, error = %e, "peer connect failed");
                self.on_connection_lost();
            }
        }
    }

    fn route(&self, channel: u64, frame: Frame) {
        let terminal = frame.is_terminal();
        let route = self.inner.routes.lock().get(&channel).cloned();
        match route {
            Some(events) => {
                let _ = events.send(PeerEvent::Frame(frame));
                if terminal {
                    self.inner.routes.lock().remove(&channel);
                }
            }
            None => {
                tracing::debug!(peer = %self.inner.uuid, channel, "frame for unrouted channel");
            }
        }
    }

    /// Drop the session and tell every open channel it is orphaned.
    fn on_connection_lost(&self) {
        *self.inner.state.lock() = ConnState::Idle;
        let routes: Vec<mpsc::UnboundedSender<PeerEvent>> =
            self.inner.routes.lock().drain().map(|(_, tx)| tx).collect();
        for events in routes {
            let _ = events.send(PeerEvent::Lost);
        }
    }
}

/// One logical channel over a peer.
pub struct PeerChannel<C: PeerConnector> {
    peer: Peer<C>,
    number: u64,
}

impl<C: PeerConnector> PeerChannel<C> {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn send_invoke(&self, app: &str, event: &str, headers: Headers) {
        self.peer.send(PeerRequest::Invoke {
            channel: self.number,
            app: app.to_string(),
            event: event.to_string(),
            headers,
        });
    }

    pub fn send_frame(&self, frame: Frame) {
        self.peer.send(PeerRequest::Data {
            channel: self.number,
            frame,
        });
    }
}

impl<C: PeerConnector> Drop for PeerChannel<C> {
    fn drop(&mut self) {
        self.peer.inner.routes.lock().remove(&self.number);
    }
}

struct PoolEntry<C: PeerConnector> {
    peer: Peer<C>,
    apps: HashSet<String>,
}

/// Registry of peers by UUID, driven by service discovery.
pub struct PeerPool<C: PeerConnector> {
    connector: C,
    peers: Mutex<HashMap<String, PoolEntry<C>>>,
}

impl<C: PeerConnector> PeerPool<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Discovery callback: a host appeared (or changed its app set).
    pub fn register_real(
        &self,
        uuid: impl Into<String>,
        endpoints: Vec<String>,
        local: bool,
        apps: Vec<String>,
    ) {
        let uuid = uuid.into();
        tracing::info!(peer = %uuid, apps = ?apps, local, "peer registered");
        let peer = Peer::new(uuid.clone(), endpoints, local, self.connector.clone());
        self.peers.lock().insert(
            uuid,
            PoolEntry {
                peer,
                apps: apps.into_iter().collect(),
            },
        );
    }

    /// Discovery callback: a host went away.
    pub fn unregister_real(&self, uuid: &str) {
        if let Some(entry) = self.peers.lock().remove(uuid) {
            tracing::info!(peer = %uuid, "peer unregistered");
            entry.peer.on_connection_lost();
        }
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.lock().is_empty()
    }

    /// Peers advertising `app`, sorted by UUID for stable rotation.
    fn candidates(&self, app: &str) -> Vec<Peer<C>> {
        let peers = self.peers.lock();
        let mut found: Vec<(&String, &PoolEntry<C>)> = peers
            .iter()
            .filter(|(_, entry)| entry.apps.contains(app))
            .collect();
        found.sort_by_key(|(uuid, _)| uuid.clone());
        found.into_iter().map(|(_, entry)| entry.peer.clone()).collect()
    }

    /// Choose a peer advertising `app` per the balancer policy.
    pub fn choose_peer<B: Balancer>(
        &self,
        app: &str,
        _headers: &Headers,
        balancer: &B,
    ) -> Result<Peer<C>, GatewayError> {
        let candidates = self.candidates(app);
        if candidates.is_empty() {
            return Err(GatewayError::ServiceNotAvailable(app.to_string()));
        }
        let index = balancer.choose(candidates.len()) % candidates.len();
        Ok(candidates[index].clone())
    }
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
