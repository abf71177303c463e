// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory-backed JSON document store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("invalid document key: {0}")]
    InvalidKey(String),
}

/// Envelope persisted around every document.
#[derive(Debug, Serialize, Deserialize)]
struct Document<T> {
    saved_at: DateTime<Utc>,
    value: T,
}

/// JSON document store rooted at a directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, collection: &str, key: &str) -> Result<PathBuf, StoreError> {
        // Keys become file names; refuse anything that could escape the tree
        for part in [collection, key] {
            if part.is_empty() || part.contains('/') || part.contains("..") {
                return Err(StoreError::InvalidKey(part.to_string()));
            }
        }
        Ok(self.root.join(collection).join(format!("{key}.json")))
    }

    /// Read and decode a document.
    pub fn get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<T, StoreError> {
        let path = self.document_path(collection, key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    collection: collection.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        let doc: Document<T> = serde_json::from_slice(&bytes)?;
        Ok(doc.value)
    }

    /// Encode and write a document, replacing any existing one.
    pub fn put<T: Serialize>(&self, collection: &str, key: &str, value: &T) -> Result<(), StoreError> {
        let path = self.document_path(collection, key)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let doc = Document {
            saved_at: Utc::now(),
            value,
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        // Write-then-rename so readers never observe a torn document
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(collection, key, "stored document");
        Ok(())
    }

    /// List document keys in a collection, sorted.
    pub fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.root.join(collection);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(key) = name.strip_suffix(".json") {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Remove a document if present.
    pub fn remove(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let path = self.document_path(collection, key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
