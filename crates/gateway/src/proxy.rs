// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-invocation proxy dispatch.
//!
//! Each client invocation gets one dispatch task: pick a peer, bind the
//! forward and backward streams, mirror every forward frame into the
//! replay buffer, and drive retries. A retry is allowed only while the
//! buffer is still armed (no backward non-error frame yet) and the retry
//! budget holds; replay re-sends the invoke and the buffered frames in
//! their original order on a freshly chosen peer.

use crate::balancer::Balancer;
use crate::buffer::ForwardBuffer;
use crate::connector::PeerConnector;
use crate::error::GatewayError;
use crate::peer::{PeerEvent, PeerPool};
use dy_core::{code, Frame, Headers};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default retry budget per invocation.
pub const DEFAULT_RETRY_LIMIT: u32 = 4;

/// The forwarding proxy front door.
pub struct Gateway<C: PeerConnector, B: Balancer> {
    pool: Arc<PeerPool<C>>,
    balancer: B,
    retry_limit: u32,
}

impl<C: PeerConnector, B: Balancer> Clone for Gateway<C, B> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            balancer: self.balancer.clone(),
            retry_limit: self.retry_limit,
        }
    }
}

impl<C: PeerConnector, B: Balancer> Gateway<C, B> {
    pub fn new(pool: Arc<PeerPool<C>>, balancer: B, retry_limit: u32) -> Self {
        Self {
            pool,
            balancer,
            retry_limit,
        }
    }

    /// Forward one client invocation to the peer fleet.
    ///
    /// `client_rx` carries the client's forward frames; backward frames
    /// are pushed into `client_tx`. Returns when the invocation is over,
    /// whichever side ended it.
    pub async fn dispatch(
        &self,
        app: &str,
        event: &str,
        headers: Headers,
        mut client_rx: mpsc::UnboundedReceiver<Frame>,
        client_tx: mpsc::UnboundedSender<Frame>,
    ) {
        let mut buffer = ForwardBuffer::new();

        'attempt: loop {
            let peer = match self.pool.choose_peer(app, &headers, &self.balancer) {
                Ok(peer) => peer,
                Err(GatewayError::ServiceNotAvailable(app)) => {
                    let _ = client_tx.send(Frame::error(
                        code::SERVICE_NOT_AVAILABLE,
                        format!("service not available: {app}"),
                    ));
                    return;
                }
                Err(e) => {
                    let _ = client_tx.send(Frame::error(code::TRANSPORT, e.to_string()));
                    return;
                }
            };

            tracing::debug!(
                app,
                event,
                peer = %peer.uuid(),
                attempt = buffer.retries(),
                "dispatching invocation"
            );

            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            let channel = peer.open_channel(events_tx);

            channel.send_invoke(app, event, headers.clone());
            for frame in buffer.frames() {
                channel.send_frame(frame.clone());
            }

            loop {
                tokio::select! {
                    forward = client_rx.recv() => {
                        match forward {
                            Some(frame) => {
                                buffer.record(&frame);
                                channel.send_frame(frame);
                            }
                            None => {
                                // Client went away: tell the worker so it
                                // can abort cleanly, then stop
                                channel.send_frame(Frame::error(
                                    code::CLIENT_DISCONNECTED,
                                    "client disconnected",
                                ));
                                return;
                            }
                        }
                    }
                    backward = events_rx.recv() => {
                        match backward {
                            Some(PeerEvent::Frame(Frame::Error { code: error_code, message, headers })) => {
                                if self.balancer.is_recoverable(error_code)
                                    && buffer.enabled()
                                    && buffer.retries() < self.retry_limit
                                {
                                    buffer.bump_retries();
                                    tracing::debug!(
                                        app,
                                        peer = %peer.uuid(),
                                        error_code,
                                        retry = buffer.retries(),
                                        "recoverable backend error, replaying"
                                    );
                                    continue 'attempt;
                                }
                                let _ = client_tx.send(Frame::Error { code: error_code, message, headers });
                                return;
                            }
                            Some(PeerEvent::Frame(frame)) => {
                                // First proof of a healthy backend ends
                                // the buffering window
                                buffer.disable();
                                let terminal = frame.is_terminal();
                                let _ = client_tx.send(frame);
                                if terminal {
                                    return;
                                }
                            }
                            Some(PeerEvent::Lost) | None => {
                                if buffer.enabled() && buffer.retries() < self.retry_limit {
                                    buffer.bump_retries();
                                    tracing::debug!(
                                        app,
                                        peer = %peer.uuid(),
                                        retry = buffer.retries(),
                                        "peer lost, replaying elsewhere"
                                    );
                                    continue 'attempt;
                                }
                                let _ = client_tx.send(Frame::error(
                                    code::TRANSPORT,
                                    "peer connection lost",
                                ));
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "proxy_tests.rs"]
mod tests;
