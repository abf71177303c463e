// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App manifest: the immutable identity of an app.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Immutable description of an app: what to run and how to run it.
///
/// Changing a manifest requires restarting the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Unique app name.
    pub name: String,
    /// Path to the worker executable.
    pub executable: PathBuf,
    /// Extra named arguments passed to every spawned worker.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Extra environment passed to every spawned worker.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: BTreeMap::new(),
            env: BTreeMap::new(),
        }
    }
}
