// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node service: the directory of running apps.
//!
//! Keeps one engine per app name, resolves manifests and profiles from
//! storage, and boots a runlist at startup. An app failing to start is
//! reported, never fatal for the daemon; a worker misbehaving is the
//! engine's problem, never the node's.

use dy_adapters::{AuthAdapter, SpawnAdapter};
use dy_core::{Invocation, Manifest, Profile, WorkerId};
use dy_engine::{BackwardSink, Engine, EngineError, EngineInfo, EnqueueSink};
use dy_storage::{Runlist, Store, MANIFESTS, PROFILES};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};

/// Node-level errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("app already started: {0}")]
    AlreadyStarted(String),
    #[error("app not running: {0}")]
    NotRunning(String),
    #[error("invalid configuration for app {app}: {message}")]
    Configuration { app: String, message: String },
    #[error("app {app} failed to start: {message}")]
    StartFailed { app: String, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Wire error code for surfacing this error on a stream.
    pub fn code(&self) -> u32 {
        match self {
            NodeError::Engine(e) => e.code(),
            NodeError::NotRunning(_) => dy_core::code::APP_NOT_FOUND,
            _ => dy_core::code::PROTOCOL,
        }
    }
}

/// Per-app info for the `info` request.
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    pub profile_name: String,
    #[serde(flatten)]
    pub engine: EngineInfo,
}

/// Outcome of a runlist boot.
#[derive(Debug, Default)]
pub struct BootReport {
    pub started: Vec<String>,
    pub failed: Vec<(String, String)>,
}

struct App<S: SpawnAdapter, A: AuthAdapter> {
    engine: Engine<S, A>,
    profile_name: String,
    acceptor: Option<JoinHandle<()>>,
}

struct NodeInner<S: SpawnAdapter, A: AuthAdapter> {
    store: Store,
    spawner: S,
    auth: A,
    apps_dir: PathBuf,
    apps: Mutex<HashMap<String, App<S, A>>>,
}

/// Directory of engines keyed by app name.
pub struct NodeService<S: SpawnAdapter, A: AuthAdapter> {
    inner: Arc<NodeInner<S, A>>,
}

impl<S: SpawnAdapter, A: AuthAdapter> Clone for NodeService<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SpawnAdapter, A: AuthAdapter> NodeService<S, A> {
    /// `apps_dir` hosts the per-app worker sockets.
    pub fn new(store: Store, spawner: S, auth: A, apps_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                store,
                spawner,
                auth,
                apps_dir,
                apps: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Start an app and wait until its first worker is active.
    ///
    /// Resolves the manifest and the named profile from storage; either
    /// missing or invalid is a configuration error. Rejects on the first
    /// worker failure observed before any activation, removing the app
    /// again.
    pub async fn start_app(&self, name: &str, profile_name: &str) -> Result<(), NodeError> {
        let manifest: Manifest =
            self.inner
                .store
                .get(MANIFESTS, name)
                .map_err(|e| NodeError::Configuration {
                    app: name.to_string(),
                    message: format!("manifest: {e}"),
                })?;
        let profile: Profile =
            self.inner
                .store
                .get(PROFILES, profile_name)
                .map_err(|e| NodeError::Configuration {
                    app: name.to_string(),
                    message: format!("profile '{profile_name}': {e}"),
                })?;
        profile.validate().map_err(|e| NodeError::Configuration {
            app: name.to_string(),
            message: format!("profile '{profile_name}': {e}"),
        })?;

        let endpoint = self.inner.apps_dir.join(format!("{name}.sock"));
        let pool_target = profile.pool as i64;

        let engine = {
            let mut apps = self.inner.apps.lock();
            if apps.contains_key(name) {
                return Err(NodeError::AlreadyStarted(name.to_string()));
            }

            let engine = Engine::new(
                manifest,
                profile,
                endpoint.clone(),
                self.inner.spawner.clone(),
                self.inner.auth.clone(),
            );
            apps.insert(
                name.to_string(),
                App {
                    engine: engine.clone(),
                    profile_name: profile_name.to_string(),
                    acceptor: None,
                },
            );
            engine
        };

        // Bind the worker acceptor before any worker can be told to connect
        let acceptor = match crate::worker_acceptor::spawn(engine.clone(), &endpoint) {
            Ok(task) => task,
            Err(e) => {
                self.inner.apps.lock().remove(name);
                return Err(NodeError::Io(e));
            }
        };
        if let Some(app) = self.inner.apps.lock().get_mut(name) {
            app.acceptor = Some(acceptor);
        }

        tracing::info!(app = name, profile = profile_name, "starting app");
        engine.failover(pool_target);

        match engine.first_active().await {
            Ok(()) => {
                tracing::info!(app = name, "app started");
                Ok(())
            }
            Err(message) => {
                tracing::warn!(app = name, message = %message, "app failed to start");
                self.remove_app(name);
                Err(NodeError::StartFailed {
                    app: name.to_string(),
                    message,
                })
            }
        }
    }

    /// Stop an app; its engine drains the pool on the way out.
    pub fn pause_app(&self, name: &str) -> Result<(), NodeError> {
        tracing::info!(app = name, "pausing app");
        if self.remove_app(name) {
            Ok(())
        } else {
            Err(NodeError::NotRunning(name.to_string()))
        }
    }

    fn remove_app(&self, name: &str) -> bool {
        let Some(app) = self.inner.apps.lock().remove(name) else {
            return false;
        };
        if let Some(acceptor) = app.acceptor {
            acceptor.abort();
        }
        app.engine.stop();
        let _ = std::fs::remove_file(self.inner.apps_dir.join(format!("{name}.sock")));
        true
    }

    /// Names of running apps, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.apps.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn info(&self, name: &str, verbose: bool) -> Result<AppInfo, NodeError> {
        let apps = self.inner.apps.lock();
        let app = apps
            .get(name)
            .ok_or_else(|| NodeError::NotRunning(name.to_string()))?;
        Ok(AppInfo {
            profile_name: app.profile_name.clone(),
            engine: app.engine.info(verbose),
        })
    }

    /// Engine lookup for the acceptors and the gateway bridge.
    pub fn engine(&self, name: &str) -> Result<Engine<S, A>, NodeError> {
        let apps = self.inner.apps.lock();
        apps.get(name)
            .map(|app| app.engine.clone())
            .ok_or_else(|| NodeError::NotRunning(name.to_string()))
    }

    /// Open a channel against a running app.
    pub async fn enqueue(
        &self,
        app: &str,
        invocation: Invocation,
        backward: BackwardSink,
        wanted: Option<WorkerId>,
    ) -> Result<EnqueueSink<S, A>, NodeError> {
        let engine = self.engine(app)?;
        Ok(engine.enqueue(invocation, backward, wanted).await?)
    }

    /// Read the named runlist and start every app in parallel.
    ///
    /// Failures are collected into the report; boot itself never fails.
    pub async fn boot_runlist(&self, runlist_name: &str) -> BootReport {
        let runlist = match Runlist::read(&self.inner.store, runlist_name) {
            Ok(runlist) => runlist,
            Err(e) => {
                tracing::warn!(runlist = runlist_name, error = %e, "unable to read runlist");
                return BootReport::default();
            }
        };

        tracing::info!(runlist = runlist_name, apps = runlist.len(), "booting runlist");

        let mut tasks = JoinSet::new();
        for (app, profile) in runlist.apps {
            let node = self.clone();
            tasks.spawn(async move {
                let result = node.start_app(&app, &profile).await;
                (app, result)
            });
        }

        let mut report = BootReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((app, Ok(()))) => report.started.push(app),
                Ok((app, Err(e))) => report.failed.push((app, e.to_string())),
                Err(e) => tracing::error!(error = %e, "runlist boot task panicked"),
            }
        }
        report.started.sort();
        report.failed.sort();

        if !report.failed.is_empty() {
            let names: Vec<&str> = report.failed.iter().map(|(n, _)| n.as_str()).collect();
            tracing::warn!(
                count = report.failed.len(),
                apps = ?names,
                "some apps failed to start"
            );
        }
        report
    }

    /// Stop everything; used at daemon shutdown.
    pub fn shutdown(&self) {
        let names = self.list();
        tracing::info!(apps = names.len(), "shutting down all apps");
        for name in names {
            let _ = self.pause_app(&name);
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
