// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization adapter.
//!
//! Consulted on every enqueue with `(app, event, headers)`. A denial is
//! surfaced to the caller's stream; it is never an internal error.

mod allow_all;

pub use allow_all::AllowAllAuth;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeAuth;

use async_trait::async_trait;
use dy_core::Headers;
use thiserror::Error;

/// Errors from the authorization collaborator itself (not denials).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorizer unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthVerdict {
    Allow,
    Deny { reason: String },
}

/// Adapter deciding whether an invocation may proceed
#[async_trait]
pub trait AuthAdapter: Clone + Send + Sync + 'static {
    async fn check(
        &self,
        app: &str,
        event: &str,
        headers: &Headers,
    ) -> Result<AuthVerdict, AuthError>;
}
