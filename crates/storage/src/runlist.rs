// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runlist: the boot-time `app name -> profile name` mapping.

use crate::{Store, StoreError, RUNLISTS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Apps to start at boot, each with the profile to start it under.
///
/// Iteration order is the map order (sorted by app name); boot starts the
/// apps in parallel so the order only affects logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Runlist {
    pub apps: BTreeMap<String, String>,
}

impl Runlist {
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Read a named runlist from storage.
    pub fn read(store: &Store, name: &str) -> Result<Self, StoreError> {
        store.get(RUNLISTS, name)
    }

    /// Persist this runlist under `name`.
    pub fn write(&self, store: &Store, name: &str) -> Result<(), StoreError> {
        store.put(RUNLISTS, name, self)
    }
}

impl FromIterator<(String, String)> for Runlist {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            apps: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[path = "runlist_tests.rs"]
mod tests;
