// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway plumbing on the daemon side.
//!
//! Two halves. The peer acceptor serves remote gateways: it terminates
//! the peer wire protocol and bridges channels into local engines. The
//! front door serves remote clients: it accepts the client protocol over
//! TCP and forwards invocations through the gateway's proxy dispatch.

use crate::node::NodeService;
use crate::protocol::{Request, Response, DEFAULT_TIMEOUT};
use dy_adapters::{AuthAdapter, SpawnAdapter};
use dy_core::{wire, Frame, Invocation};
use dy_engine::EnqueueSink;
use dy_gateway::{Balancer, Gateway, PeerConnector, PeerRequest, PeerResponse};
use std::collections::HashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Accept remote gateways and bridge their channels into local engines.
pub fn spawn_peer_acceptor<S: SpawnAdapter, A: AuthAdapter>(
    node: NodeService<S, A>,
    listener: TcpListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(peer = %addr, "gateway peer connected");
                    let node = node.clone();
                    tokio::spawn(async move {
                        serve_peer(node, stream).await;
                    });
                }
                Err(e) => tracing::error!(error = %e, "peer accept error"),
            }
        }
    })
}

async fn serve_peer<S: SpawnAdapter, A: AuthAdapter>(node: NodeService<S, A>, stream: TcpStream) {
    let (mut reader, mut writer) = stream.into_split();
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<PeerResponse>();

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = resp_rx.recv().await {
            if wire::send(&mut writer, &msg).await.is_err() {
                break;
            }
        }
    });

    // Sinks stay alive for as long as their channel is open; dropping one
    // early would cancel the channel under the remote client
    let mut sinks: HashMap<u64, EnqueueSink<S, A>> = HashMap::new();

    loop {
        sinks.retain(|_, sink| !sink.channel().is_done());

        match wire::recv::<PeerRequest, _>(&mut reader).await {
            Ok(PeerRequest::Invoke {
                channel,
                app,
                event,
                headers,
            }) => {
                let (backward_tx, mut backward_rx) = mpsc::unbounded_channel::<Frame>();
                let invocation = Invocation::with_headers(event, headers);
                match node.enqueue(&app, invocation, backward_tx, None).await {
                    Ok(sink) => {
                        sinks.insert(channel, sink);
                        let resp_tx = resp_tx.clone();
                        tokio::spawn(async move {
                            while let Some(frame) = backward_rx.recv().await {
                                let terminal = frame.is_terminal();
                                if resp_tx
                                    .send(PeerResponse::Data { channel, frame })
                                    .is_err()
                                    || terminal
                                {
                                    break;
                                }
                            }
                        });
                    }
                    Err(e) => {
                        let _ = resp_tx.send(PeerResponse::Data {
                            channel,
                            frame: Frame::error(e.code(), e.to_string()),
                        });
                    }
                }
            }
            Ok(PeerRequest::Data { channel, frame }) => {
                if let Some(sink) = sinks.get(&channel) {
                    sink.send(frame);
                } else {
                    tracing::debug!(channel, "frame for unknown peer channel");
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "gateway peer connection ended");
                break;
            }
        }
    }

    // Dropping the remaining sinks cancels whatever is still in flight
    writer_task.abort();
}

/// Accept remote clients on the gateway front door.
pub fn spawn_front_door<C: PeerConnector, B: Balancer>(
    gateway: Gateway<C, B>,
    listener: TcpListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(client = %addr, "gateway client connected");
                    let gateway = gateway.clone();
                    tokio::spawn(async move {
                        serve_front_client(gateway, stream).await;
                    });
                }
                Err(e) => tracing::error!(error = %e, "front door accept error"),
            }
        }
    })
}

async fn serve_front_client<C: PeerConnector, B: Balancer>(
    gateway: Gateway<C, B>,
    stream: TcpStream,
) {
    let (mut reader, mut writer) = stream.into_split();

    let request: Request = match wire::recv_timeout(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "front door request failed");
            return;
        }
    };

    let Request::Enqueue {
        app,
        event,
        headers,
        worker: _,
    } = request
    else {
        let _ = wire::send_timeout(
            &mut writer,
            &Response::Error {
                code: dy_core::code::PROTOCOL,
                message: "only enqueue is forwarded".to_string(),
            },
            DEFAULT_TIMEOUT,
        )
        .await;
        return;
    };

    if wire::send_timeout(&mut writer, &Response::EnqueueAccepted, DEFAULT_TIMEOUT)
        .await
        .is_err()
    {
        return;
    }

    let (forward_tx, forward_rx) = mpsc::unbounded_channel::<Frame>();
    let (backward_tx, mut backward_rx) = mpsc::unbounded_channel::<Frame>();

    // Client reader: socket frames into the dispatch
    let reader_task = tokio::spawn(async move {
        loop {
            match wire::recv::<Frame, _>(&mut reader).await {
                Ok(frame) => {
                    if forward_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(_) => break, // dropping forward_tx signals disconnect
            }
        }
    });

    // Client writer: backward frames onto the socket
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = backward_rx.recv().await {
            let terminal = frame.is_terminal();
            if wire::send(&mut writer, &frame).await.is_err() || terminal {
                break;
            }
        }
    });

    gateway
        .dispatch(&app, &event, headers, forward_rx, backward_tx)
        .await;

    reader_task.abort();
    let _ = writer_task.await;
}

#[cfg(test)]
#[path = "gateway_bridge_tests.rs"]
mod tests;
