// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync-cursor store: per-remote acknowledgment state and remote records
//!
//! One pretty-JSON file per remote under `cursors/` (the acknowledged
//! ordinal) and `remotes/` (the remote's configuration). Cursor writes
//! are clamped monotonic non-decreasing so a late or repeated ack can
//! never rewind replication.

use crate::error::StorageError;
use crate::query::ViewFilter;
use keel_core::{bail_if_cancelled, CancellationToken};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Acknowledged replication position for one remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCursor {
    pub remote_name: String,
    /// Every operation with ordinal <= this has been applied remotely
    pub cursor_ordinal: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at_utc_ms: Option<i64>,
}

/// Persisted configuration for one sync remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub name: String,
    /// Collection whose member documents replicate to this remote
    pub collection_id: String,
    #[serde(default)]
    pub filter: ViewFilter,
    /// Opaque transport settings, interpreted by the channel factory
    #[serde(default)]
    pub channel_config: serde_json::Value,
}

/// JSON file-backed store for cursors and remote records
#[derive(Debug, Clone)]
pub struct SyncCursorStore {
    base_path: PathBuf,
}

impl SyncCursorStore {
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(base_path.join("cursors"))?;
        fs::create_dir_all(base_path.join("remotes"))?;
        Ok(Self { base_path })
    }

    /// Stored cursor for a remote; a never-synced remote reads as 0
    pub async fn get_cursor(
        &self,
        remote_name: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteCursor, StorageError> {
        bail_if_cancelled(cancel)?;
        let path = self.cursor_path(remote_name);
        if !path.exists() {
            return Ok(RemoteCursor {
                remote_name: remote_name.to_string(),
                cursor_ordinal: 0,
                last_synced_at_utc_ms: None,
            });
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Persist a cursor, clamped non-decreasing. Returns the stored
    /// cursor, which may be the existing higher one.
    pub async fn put_cursor(
        &self,
        cursor: RemoteCursor,
        cancel: &CancellationToken,
    ) -> Result<RemoteCursor, StorageError> {
        bail_if_cancelled(cancel)?;
        let current = self.get_cursor(&cursor.remote_name, cancel).await?;
        if cursor.cursor_ordinal < current.cursor_ordinal {
            tracing::debug!(
                remote = %cursor.remote_name,
                requested = cursor.cursor_ordinal,
                current = current.cursor_ordinal,
                "ignoring cursor rewind"
            );
            return Ok(current);
        }
        let path = self.cursor_path(&cursor.remote_name);
        let json = serde_json::to_string_pretty(&cursor)?;
        fs::write(&path, json)?;
        Ok(cursor)
    }

    pub async fn delete_cursor(
        &self,
        remote_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        bail_if_cancelled(cancel)?;
        let path = self.cursor_path(remote_name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub async fn get_remote(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteRecord>, StorageError> {
        bail_if_cancelled(cancel)?;
        let path = self.remote_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Upsert a remote record
    pub async fn put_remote(
        &self,
        record: &RemoteRecord,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        bail_if_cancelled(cancel)?;
        let path = self.remote_path(&record.name);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)?;
        Ok(())
    }

    pub async fn delete_remote(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        bail_if_cancelled(cancel)?;
        let path = self.remote_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// All persisted remote records, sorted by name
    pub async fn list_remotes(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteRecord>, StorageError> {
        bail_if_cancelled(cancel)?;
        let dir = self.base_path.join("remotes");
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let json = fs::read_to_string(&path)?;
            records.push(serde_json::from_str::<RemoteRecord>(&json)?);
        }
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    fn cursor_path(&self, remote_name: &str) -> PathBuf {
        self.base_path
            .join("cursors")
            .join(format!("{remote_name}.json"))
    }

    fn remote_path(&self, name: &str) -> PathBuf {
        self.base_path.join("remotes").join(format!("{name}.json"))
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
