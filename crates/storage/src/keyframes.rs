// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyframe store: snapshots of document state at a known revision
//!
//! One pretty-JSON file per keyframe, laid out as
//! `keyframes/<doc>/<scope>/<branch>/<revision:08>.json`. Keyframes are
//! an acceleration structure for the write cache; losing them costs
//! replay time, never data.

use crate::error::StorageError;
use keel_core::{bail_if_cancelled, CancellationToken, Document};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STORABLE_VERSION: u32 = 1;

/// Document state snapshot at one stream revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub document_id: String,
    pub document_type: String,
    pub scope: String,
    pub branch: String,
    /// Number of operations folded into `document` for this scope
    pub revision: u64,
    pub document: Document,
}

/// On-disk envelope, version-stamped for format evolution
#[derive(Debug, Serialize, Deserialize)]
struct StorableKeyframe {
    version: u32,
    keyframe: Keyframe,
}

/// File-per-keyframe store under a base directory
#[derive(Debug, Clone)]
pub struct KeyframeStore {
    base_path: PathBuf,
}

impl KeyframeStore {
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Write or replace the keyframe at its revision
    pub async fn put_keyframe(
        &self,
        keyframe: Keyframe,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        bail_if_cancelled(cancel)?;
        let path = self.keyframe_path(
            &keyframe.document_id,
            &keyframe.scope,
            &keyframe.branch,
            keyframe.revision,
        );
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let storable = StorableKeyframe {
            version: STORABLE_VERSION,
            keyframe,
        };
        let json = serde_json::to_string_pretty(&storable)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Greatest-revision keyframe with `revision <= target`, or the
    /// newest one when `target` is `None`
    pub async fn find_nearest_keyframe(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        target: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Option<Keyframe>, StorageError> {
        bail_if_cancelled(cancel)?;
        let dir = self.stream_dir(document_id, scope, branch);
        let mut revisions = list_revision_files(&dir)?;
        revisions.sort_by(|a, b| b.0.cmp(&a.0));

        for (revision, path) in revisions {
            if target.map(|t| revision > t).unwrap_or(false) {
                continue;
            }
            bail_if_cancelled(cancel)?;
            let json = fs::read_to_string(&path)?;
            let storable: StorableKeyframe = serde_json::from_str(&json)?;
            return Ok(Some(storable.keyframe));
        }
        Ok(None)
    }

    /// Remove keyframes for a document, optionally narrowed to one scope
    /// and branch. Returns the number of files removed.
    pub async fn delete_keyframes(
        &self,
        document_id: &str,
        scope: Option<&str>,
        branch: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize, StorageError> {
        bail_if_cancelled(cancel)?;
        let doc_dir = self.base_path.join(document_id);
        if !doc_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for scope_entry in fs::read_dir(&doc_dir)? {
            let scope_dir = scope_entry?.path();
            if !scope_dir.is_dir() {
                continue;
            }
            if let Some(scope) = scope {
                if scope_dir.file_name().map(|n| n != scope).unwrap_or(true) {
                    continue;
                }
            }
            for branch_entry in fs::read_dir(&scope_dir)? {
                let branch_dir = branch_entry?.path();
                if !branch_dir.is_dir() {
                    continue;
                }
                if let Some(branch) = branch {
                    if branch_dir.file_name().map(|n| n != branch).unwrap_or(true) {
                        continue;
                    }
                }
                for (_, path) in list_revision_files(&branch_dir)? {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Stored revisions for one stream, ascending (diagnostics)
    pub async fn list_revisions(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u64>, StorageError> {
        bail_if_cancelled(cancel)?;
        let dir = self.stream_dir(document_id, scope, branch);
        let mut revisions: Vec<u64> = list_revision_files(&dir)?
            .into_iter()
            .map(|(revision, _)| revision)
            .collect();
        revisions.sort_unstable();
        Ok(revisions)
    }

    fn stream_dir(&self, document_id: &str, scope: &str, branch: &str) -> PathBuf {
        self.base_path.join(document_id).join(scope).join(branch)
    }

    fn keyframe_path(&self, document_id: &str, scope: &str, branch: &str, revision: u64) -> PathBuf {
        self.stream_dir(document_id, scope, branch)
            .join(format!("{revision:08}.json"))
    }
}

/// Parse `<revision:08>.json` filenames in a stream directory, skipping
/// anything that doesn't fit the pattern
fn list_revision_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>, StorageError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if let Ok(revision) = stem.parse::<u64>() {
            files.push((revision, path));
        }
    }
    Ok(files)
}

#[cfg(test)]
#[path = "keyframes_tests.rs"]
mod tests;
