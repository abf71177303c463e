// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted peer transport for tests.
#![cfg_attr(coverage_nightly, coverage(off))]
#![allow(clippy::panic)]

use crate::connector::{PeerConn, PeerConnector};
use crate::error::GatewayError;
use crate::protocol::{PeerRequest, PeerResponse};
use async_trait::async_trait;
use dy_core::Frame;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll until `cond` holds, with a bounded number of scheduler turns.
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F) -> bool {
    for _ in 0..1000 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    cond()
}

/// The backend half of one fake connection.
pub struct FakeBackend {
    pub endpoints: Vec<String>,
    requests: mpsc::UnboundedReceiver<PeerRequest>,
    responses: mpsc::UnboundedSender<PeerResponse>,
}

impl FakeBackend {
    /// Next request from the gateway.
    pub async fn recv(&mut self) -> Option<PeerRequest> {
        self.requests.recv().await
    }

    pub async fn expect_invoke(&mut self) -> (u64, String, String) {
        match self.recv().await {
            Some(PeerRequest::Invoke {
                channel, app, event, ..
            }) => (channel, app, event),
            other => panic!("expected invoke, got {other:?}"),
        }
    }

    pub async fn expect_data(&mut self) -> (u64, Frame) {
        match self.recv().await {
            Some(PeerRequest::Data { channel, frame }) => (channel, frame),
            other => panic!("expected data frame, got {other:?}"),
        }
    }

    pub fn respond(&self, channel: u64, frame: Frame) {
        let _ = self.responses.send(PeerResponse::Data { channel, frame });
    }
}

struct FakeConnectorState {
    backends: Vec<FakeBackend>,
    failing: HashSet<String>,
    connects: usize,
}

/// Connector that hands each connection's far end to the test.
#[derive(Clone)]
pub struct FakeConnector {
    inner: Arc<Mutex<FakeConnectorState>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeConnectorState {
                backends: Vec::new(),
                failing: HashSet::new(),
                connects: 0,
            })),
        }
    }
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make connects to this endpoint fail.
    pub fn fail_endpoint(&self, endpoint: impl Into<String>) {
        self.inner.lock().failing.insert(endpoint.into());
    }

    /// Number of connect attempts seen (including failures).
    pub fn connect_count(&self) -> usize {
        self.inner.lock().connects
    }

    /// Wait for the next established backend.
    pub async fn take_backend(&self) -> FakeBackend {
        for _ in 0..1000 {
            if let Some(backend) = self.try_take_backend() {
                return backend;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("no backend connection arrived");
    }

    fn try_take_backend(&self) -> Option<FakeBackend> {
        let mut inner = self.inner.lock();
        if inner.backends.is_empty() {
            None
        } else {
            Some(inner.backends.remove(0))
        }
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn connect(&self, endpoints: &[String]) -> Result<PeerConn, GatewayError> {
        let mut inner = self.inner.lock();
        inner.connects += 1;

        if endpoints.iter().all(|e| inner.failing.contains(e)) {
            return Err(GatewayError::ConnectFailed(format!(
                "all endpoints down: {endpoints:?}"
            )));
        }

        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();
        inner.backends.push(FakeBackend {
            endpoints: endpoints.to_vec(),
            requests: req_rx,
            responses: resp_tx,
        });

        Ok(PeerConn {
            tx: req_tx,
            rx: resp_rx,
        })
    }
}
