// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown.
//!
//! Owns the single-instance lock, opens storage, boots the runlist, and
//! binds every listener. The caller (main) runs the returned listener and
//! decides when to shut down.

use crate::config::Config;
use crate::gateway_bridge;
use crate::listener::Listener;
use crate::node::{BootReport, NodeService};
use dy_adapters::{AllowAllAuth, ProcessSpawner};
use dy_gateway::{Gateway, PeerPool, RoundRobin, TcpConnector};
use dy_storage::Store;
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another daemon already holds {0}")]
    LockFailed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] dy_storage::StoreError),
}

/// Everything a running daemon consists of.
pub struct Startup {
    pub node: NodeService<ProcessSpawner, AllowAllAuth>,
    pub listener: Listener<ProcessSpawner, AllowAllAuth>,
    pub boot_report: BootReport,
    pub gateway_tasks: Vec<JoinHandle<()>>,
    // Held for the daemon lifetime; releasing it frees the instance lock
    _lock_file: File,
}

impl std::fmt::Debug for Startup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Startup").finish_non_exhaustive()
    }
}

pub async fn startup(config: &Config) -> Result<Startup, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(config.apps_dir())?;

    // Single instance per state dir
    let lock_path = config.lock_path();
    let mut lock_file = File::create(&lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(lock_path.display().to_string()))?;
    let _ = writeln!(lock_file, "{}", std::process::id());

    let store = Store::open(config.storage_dir())?;
    let node = NodeService::new(
        store,
        ProcessSpawner::new(),
        AllowAllAuth,
        config.apps_dir(),
    );

    // Boot the runlist before opening the client socket, so early clients
    // see a settled app directory
    let boot_report = if config.runlist.is_empty() {
        BootReport::default()
    } else {
        node.boot_runlist(&config.runlist).await
    };

    let socket_path = config.socket_path();
    let _ = std::fs::remove_file(&socket_path);
    let socket = UnixListener::bind(&socket_path)?;
    tracing::info!(socket = %socket_path.display(), "client listener bound");
    let listener = Listener::new(socket, node.clone());

    let mut gateway_tasks = Vec::new();
    if config.gateway.enabled {
        if config.gateway.balancer != "round-robin" {
            tracing::warn!(
                balancer = %config.gateway.balancer,
                "unknown balancer, falling back to round-robin"
            );
        }
        let pool = Arc::new(PeerPool::new(TcpConnector));
        for peer in &config.gateway.peers {
            pool.register_real(
                peer.uuid.clone(),
                peer.endpoints.clone(),
                peer.local,
                peer.apps.clone(),
            );
        }
        let gateway = Gateway::new(pool, RoundRobin::new(), config.gateway.retry_limit);

        let front = TcpListener::bind(&config.gateway.listen).await?;
        tracing::info!(listen = %config.gateway.listen, "gateway front door bound");
        gateway_tasks.push(gateway_bridge::spawn_front_door(gateway, front));

        let peer_socket = TcpListener::bind(&config.gateway.peer_listen).await?;
        tracing::info!(listen = %config.gateway.peer_listen, "gateway peer acceptor bound");
        gateway_tasks.push(gateway_bridge::spawn_peer_acceptor(
            node.clone(),
            peer_socket,
        ));
    }

    Ok(Startup {
        node,
        listener,
        boot_report,
        gateway_tasks,
        _lock_file: lock_file,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
