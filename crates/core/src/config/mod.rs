// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reactor configuration loaded from TOML
//!
//! `ReactorConfig` is the operator-facing shape; the builder maps it
//! onto the per-component config structs (operation index, write cache,
//! executor, poll timer). Durations use humantime strings ("2s",
//! "500ms").

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level reactor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReactorConfig {
    /// Root directory for all durable state
    pub storage_dir: PathBuf,
    pub cache: CacheSettings,
    pub executor: ExecutorSettings,
    pub sync: SyncSettings,
}

/// Write-cache sizing and keyframe cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Streams kept before LRU eviction
    pub max_documents: usize,
    /// Snapshots retained per stream
    pub ring_capacity: usize,
    /// Revisions between persisted keyframes
    pub keyframe_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorSettings {
    /// Retries for retryable job failures before the job fails for good
    pub max_retries: u32,
}

/// Sync polling and backpressure knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub backpressure_check_interval: Duration,
    /// Mailbox depth past which polls are skipped
    pub max_queue_depth: usize,
    #[serde(with = "humantime_serde")]
    pub base_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Transport attempts before an operation dead-letters
    pub retry_limit: u32,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./keel-data"),
            cache: CacheSettings::default(),
            executor: ExecutorSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_documents: 256,
            ring_capacity: 8,
            keyframe_interval: 50,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            backpressure_check_interval: Duration::from_millis(250),
            max_queue_depth: 100,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            retry_limit: 5,
        }
    }
}

impl ReactorConfig {
    /// Parse from a TOML string
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
