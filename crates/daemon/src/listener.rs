// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for client socket I/O.
//!
//! Accepts connections on the daemon socket and handles each in its own
//! task. One-shot requests answer and close; an accepted `Enqueue`
//! upgrades the connection to a bidirectional frame stream that lives
//! until the backward terminal frame or client disconnect.

use crate::node::NodeService;
use crate::protocol::{Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
use dy_adapters::{AuthAdapter, SpawnAdapter};
use dy_core::{code, wire, Frame, Invocation};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

/// Listener task for accepting client connections.
pub struct Listener<S: SpawnAdapter, A: AuthAdapter> {
    socket: UnixListener,
    node: NodeService<S, A>,
}

impl<S: SpawnAdapter, A: AuthAdapter> Listener<S, A> {
    pub fn new(socket: UnixListener, node: NodeService<S, A>) -> Self {
        Self { socket, node }
    }

    /// Accept until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let node = self.node.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, node).await {
                            match e {
                                wire::WireError::ConnectionClosed => {
                                    tracing::debug!("client disconnected")
                                }
                                wire::WireError::Timeout => tracing::warn!("client timed out"),
                                _ => tracing::error!(error = %e, "connection error"),
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept error");
                }
            }
        }
    }
}

async fn handle_connection<S: SpawnAdapter, A: AuthAdapter>(
    stream: UnixStream,
    node: NodeService<S, A>,
) -> Result<(), wire::WireError> {
    let (mut reader, mut writer) = stream.into_split();

    let request: Request = wire::recv_timeout(&mut reader, DEFAULT_TIMEOUT).await?;
    tracing::debug!(request = ?request, "received request");

    match request {
        Request::Ping => {
            respond(
                &mut writer,
                &Response::Pong {
                    version: PROTOCOL_VERSION.to_string(),
                },
            )
            .await
        }

        Request::StartApp { name, profile } => {
            let response = match node.start_app(&name, &profile).await {
                Ok(()) => Response::Started { app: name },
                Err(e) => error_response(&e),
            };
            respond(&mut writer, &response).await
        }

        Request::PauseApp { name } => {
            let response = match node.pause_app(&name) {
                Ok(()) => Response::Ok,
                Err(e) => error_response(&e),
            };
            respond(&mut writer, &response).await
        }

        Request::List => {
            respond(&mut writer, &Response::AppList { apps: node.list() }).await
        }

        Request::Info { name, verbose } => {
            let response = match node.info(&name, verbose) {
                Ok(info) => match serde_json::to_value(&info) {
                    Ok(info) => Response::AppInfo { info },
                    Err(e) => Response::Error {
                        code: code::PROTOCOL,
                        message: e.to_string(),
                    },
                },
                Err(e) => error_response(&e),
            };
            respond(&mut writer, &response).await
        }

        Request::Enqueue {
            app,
            event,
            headers,
            worker,
        } => {
            let (backward_tx, backward_rx) = mpsc::unbounded_channel();
            let invocation = Invocation::with_headers(event, headers);
            match node.enqueue(&app, invocation, backward_tx, worker).await {
                Ok(sink) => {
                    respond(&mut writer, &Response::EnqueueAccepted).await?;
                    stream_channel(reader, writer, sink, backward_rx).await;
                    Ok(())
                }
                Err(e) => respond(&mut writer, &error_response(&e)).await,
            }
        }
    }
}

async fn respond(
    writer: &mut OwnedWriteHalf,
    response: &Response,
) -> Result<(), wire::WireError> {
    wire::send_timeout(writer, response, DEFAULT_TIMEOUT).await
}

fn error_response(error: &crate::node::NodeError) -> Response {
    Response::Error {
        code: error.code(),
        message: error.to_string(),
    }
}

/// Drive an accepted enqueue: client frames in, backward frames out.
///
/// The socket read runs in its own task so a mid-frame read is never
/// cancelled. Ends when the worker closes the channel (terminal backward
/// frame) or the client goes away (dropping the sink cancels the channel).
async fn stream_channel<S: SpawnAdapter, A: AuthAdapter>(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    sink: dy_engine::EnqueueSink<S, A>,
    mut backward_rx: mpsc::UnboundedReceiver<Frame>,
) {
    let reader_task = tokio::spawn(async move {
        loop {
            match wire::recv::<Frame, _>(&mut reader).await {
                Ok(frame) => sink.send(frame),
                Err(e) => {
                    tracing::debug!(error = %e, "enqueue stream ended by client");
                    break;
                }
            }
        }
        // Dropping the sink here cancels the channel if it is still open
        drop(sink);
    });

    while let Some(frame) = backward_rx.recv().await {
        let terminal = frame.is_terminal();
        if wire::send(&mut writer, &frame).await.is_err() || terminal {
            break;
        }
    }
    reader_task.abort();
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
