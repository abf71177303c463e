// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the gateway

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("service not available: {0}")]
    ServiceNotAvailable(String),
    #[error("peer connect failed: {0}")]
    ConnectFailed(String),
}
