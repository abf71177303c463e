// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! One TOML file, location from `DY_CONFIG` or `<state_dir>/config.toml`;
//! a missing file means defaults. `DY_STATE_DIR` overrides the state
//! directory for tests and multi-instance setups.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A statically configured gateway peer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PeerConfig {
    pub uuid: String,
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub apps: Vec<String>,
    #[serde(default)]
    pub local: bool,
}

/// Gateway section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub enabled: bool,
    /// Front door for remote clients.
    pub listen: String,
    /// Acceptor for remote gateways forwarding to this node.
    pub peer_listen: String,
    pub retry_limit: u32,
    pub balancer: String,
    pub peers: Vec<PeerConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:10054".to_string(),
            peer_listen: "127.0.0.1:10055".to_string(),
            retry_limit: dy_gateway::proxy::DEFAULT_RETRY_LIMIT,
            balancer: "round-robin".to_string(),
            peers: Vec::new(),
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub state_dir: PathBuf,
    /// Runlist to boot; empty means start nothing.
    pub runlist: String,
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            runlist: String::new(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DY_STATE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::state_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("dockyard")
}

impl Config {
    /// Load from `DY_CONFIG`, else `<state_dir>/config.toml`, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var("DY_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_state_dir().join("config.toml"),
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn socket_path(&self) -> PathBuf {
        self.state_dir.join("dyd.sock")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("dyd.lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("dyd.log")
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.state_dir.join("storage")
    }

    /// Per-app worker sockets live here.
    pub fn apps_dir(&self) -> PathBuf {
        self.state_dir.join("apps")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
