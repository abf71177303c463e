// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer transport.
//!
//! A connector turns an endpoint list into a live message exchange. The
//! TCP implementation speaks the peer wire protocol; tests substitute a
//! scripted one.

use crate::error::GatewayError;
use crate::protocol::{PeerRequest, PeerResponse};
use async_trait::async_trait;
use dy_core::wire;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// A live peer connection: push requests in, pull responses out.
pub struct PeerConn {
    pub tx: mpsc::UnboundedSender<PeerRequest>,
    pub rx: mpsc::UnboundedReceiver<PeerResponse>,
}

/// Establishes peer connections
#[async_trait]
pub trait PeerConnector: Clone + Send + Sync + 'static {
    /// Try the endpoints in order; first success wins.
    async fn connect(&self, endpoints: &[String]) -> Result<PeerConn, GatewayError>;
}

/// Real connector: TCP plus the length-prefixed JSON codec.
#[derive(Clone, Default)]
pub struct TcpConnector;

#[async_trait]
impl PeerConnector for TcpConnector {
    async fn connect(&self, endpoints: &[String]) -> Result<PeerConn, GatewayError> {
        let mut last_error = "no endpoints".to_string();

        for endpoint in endpoints {
            match TcpStream::connect(endpoint).await {
                Ok(stream) => {
                    tracing::debug!(endpoint = %endpoint, "peer connected");
                    return Ok(pump(stream));
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "peer endpoint unreachable");
                    last_error = format!("{endpoint}: {e}");
                }
            }
        }

        Err(GatewayError::ConnectFailed(last_error))
    }
}

/// Bridge a connected stream to message channels with two pump tasks.
fn pump(stream: TcpStream) -> PeerConn {
    let (mut read_half, mut write_half) = stream.into_split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<PeerRequest>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<PeerResponse>();

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = wire::send(&mut write_half, &msg).await {
                tracing::debug!(error = %e, "peer write failed");
                break;
            }
        }
    });

    tokio::spawn(async move {
        loop {
            match wire::recv::<PeerResponse, _>(&mut read_half).await {
                Ok(msg) => {
                    if in_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "peer read ended");
                    break;
                }
            }
        }
    });

    PeerConn { tx: out_tx, rx: in_rx }
}
