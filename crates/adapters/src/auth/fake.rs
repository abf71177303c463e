// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake authorizer for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AuthAdapter, AuthError, AuthVerdict};
use async_trait::async_trait;
use dy_core::Headers;
use parking_lot::Mutex;
use std::sync::Arc;

struct FakeAuthState {
    denied: Vec<(String, String)>,
    checks: Vec<(String, String)>,
}

/// Fake authorizer: allows everything except explicitly denied
/// `(app, event)` pairs, and records every check.
#[derive(Clone)]
pub struct FakeAuth {
    inner: Arc<Mutex<FakeAuthState>>,
}

impl Default for FakeAuth {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeAuthState {
                denied: Vec::new(),
                checks: Vec::new(),
            })),
        }
    }
}

impl FakeAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny future checks for this `(app, event)` pair.
    pub fn deny(&self, app: impl Into<String>, event: impl Into<String>) {
        self.inner.lock().denied.push((app.into(), event.into()));
    }

    /// Every `(app, event)` checked so far.
    pub fn checks(&self) -> Vec<(String, String)> {
        self.inner.lock().checks.clone()
    }
}

#[async_trait]
impl AuthAdapter for FakeAuth {
    async fn check(
        &self,
        app: &str,
        event: &str,
        _headers: &Headers,
    ) -> Result<AuthVerdict, AuthError> {
        let mut inner = self.inner.lock();
        inner.checks.push((app.to_string(), event.to_string()));

        let denied = inner
            .denied
            .iter()
            .any(|(a, e)| a == app && e == event);
        if denied {
            Ok(AuthVerdict::Deny {
                reason: format!("denied by policy: {app}/{event}"),
            })
        } else {
            Ok(AuthVerdict::Allow)
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
