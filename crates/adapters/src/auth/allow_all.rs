// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Default authorizer: everything is allowed.

use super::{AuthAdapter, AuthError, AuthVerdict};
use async_trait::async_trait;
use dy_core::Headers;

/// Permits every invocation. The default when no authorizer is configured.
#[derive(Clone, Default)]
pub struct AllowAllAuth;

#[async_trait]
impl AuthAdapter for AllowAllAuth {
    async fn check(
        &self,
        _app: &str,
        _event: &str,
        _headers: &Headers,
    ) -> Result<AuthVerdict, AuthError> {
        Ok(AuthVerdict::Allow)
    }
}
