// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use dy_core::{code, WorkerId};
use thiserror::Error;

/// Errors surfaced to enqueue callers and the worker acceptor
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("queue is full")]
    QueueFull,
    #[error("worker not found: {0}")]
    WorkerNotFound(WorkerId),
    #[error("worker not active: {0}")]
    WorkerNotActive(WorkerId),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("authorizer unavailable: {0}")]
    AuthUnavailable(String),
}

impl EngineError {
    /// Wire error code for surfacing this error on a stream.
    pub fn code(&self) -> u32 {
        match self {
            EngineError::QueueFull => code::QUEUE_FULL,
            EngineError::WorkerNotFound(_) => code::WORKER_NOT_FOUND,
            EngineError::WorkerNotActive(_) => code::WORKER_NOT_ACTIVE,
            EngineError::Unauthorized(_) => code::UNAUTHORIZED,
            EngineError::AuthUnavailable(_) => code::TRANSPORT,
        }
    }
}
