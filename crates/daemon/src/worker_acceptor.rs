// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-app worker acceptor.
//!
//! Each app gets a unix socket; freshly spawned workers connect back to
//! it. The first message must be a handshake carrying the UUID the worker
//! was spawned with; after that the connection is pumped between the wire
//! and the worker's machine until either side ends it.

use dy_adapters::{AuthAdapter, SpawnAdapter};
use dy_core::wire;
use dy_engine::{Engine, WorkerMessage, WorkerPort, WorkerSession};
use std::path::Path;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

/// How long a fresh connection gets to present its handshake.
const HANDSHAKE_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Bind the app's worker socket and accept connections until aborted.
pub(crate) fn spawn<S: SpawnAdapter, A: AuthAdapter>(
    engine: Engine<S, A>,
    socket_path: &Path,
) -> std::io::Result<JoinHandle<()>> {
    if let Some(dir) = socket_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    // A stale socket from a previous run would fail the bind
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;

    tracing::debug!(socket = %socket_path.display(), "worker acceptor listening");

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let engine = engine.clone();
                    tokio::spawn(async move {
                        handle_worker(engine, stream).await;
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "worker accept error");
                }
            }
        }
    }))
}

async fn handle_worker<S: SpawnAdapter, A: AuthAdapter>(engine: Engine<S, A>, stream: UnixStream) {
    let (mut reader, mut writer) = stream.into_split();

    // First message must be the handshake
    let uuid = match wire::recv_timeout::<WorkerMessage, _>(&mut reader, HANDSHAKE_READ_TIMEOUT)
        .await
    {
        Ok(WorkerMessage::Handshake { uuid }) => uuid,
        Ok(other) => {
            tracing::warn!(message = ?other, "worker connection did not start with handshake");
            return;
        }
        Err(e) => {
            tracing::debug!(error = %e, "worker connection ended before handshake");
            return;
        }
    };

    let (session, mut session_rx) = WorkerSession::pair();
    let port = match engine.handshake(&uuid, session) {
        Ok(port) => port,
        Err(e) => {
            tracing::warn!(worker_id = %uuid, error = %e, "handshake refused");
            return;
        }
    };

    // Outbound pump: machine messages onto the socket
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = session_rx.recv().await {
            if let Err(e) = wire::send(&mut writer, &msg).await {
                tracing::debug!(error = %e, "worker write failed");
                break;
            }
        }
    });

    // Inbound pump: socket messages into the machine
    let error = pump_inbound(&mut reader, &port).await;
    port.closed(error);
    writer_task.abort();
}

async fn pump_inbound<S: SpawnAdapter>(
    reader: &mut (impl tokio::io::AsyncRead + Unpin),
    port: &WorkerPort<S>,
) -> Option<String> {
    loop {
        match wire::recv::<WorkerMessage, _>(reader).await {
            Ok(WorkerMessage::Heartbeat) => port.heartbeat(),
            Ok(WorkerMessage::Data { channel, frame }) => port.data(channel, frame),
            Ok(WorkerMessage::Terminated { code }) => port.terminated(code),
            Ok(other) => {
                port.protocol_violation(format!("unexpected message: {other:?}"));
                return None;
            }
            Err(wire::WireError::ConnectionClosed) => return None,
            Err(e) => return Some(e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "worker_acceptor_tests.rs"]
mod tests;
