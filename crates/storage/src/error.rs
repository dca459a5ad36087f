// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error taxonomy

use keel_core::CancelledError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted log entry at line {line}: {reason}")]
    Corrupted { line: u64, reason: String },

    #[error("checksum mismatch at line {line}")]
    ChecksumMismatch { line: u64 },

    #[error("operation index at {path} is locked by another process")]
    Locked { path: PathBuf },

    #[error(
        "conflicting index {index} for {document_id}/{scope}/{branch}: stream tip is {tip}"
    )]
    ConflictingIndex {
        document_id: String,
        scope: String,
        branch: String,
        index: u64,
        tip: u64,
    },

    #[error("collection not found: {collection_id}")]
    CollectionNotFound { collection_id: String },

    #[error("collection already exists: {collection_id}")]
    DuplicateCollection { collection_id: String },

    #[error(transparent)]
    Cancelled(#[from] CancelledError),
}
