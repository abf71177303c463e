// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker identifier.

crate::define_id! {
    /// Unique identifier for a worker process, stable for its lifetime.
    pub struct WorkerId;
}

impl WorkerId {
    /// Generate a fresh random worker id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
