// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error taxonomy for the reactor
//!
//! Job-facing failures are folded into [`ErrorInfo`] records by the job
//! tracker; everything here keeps enough structure for callers to match on
//! the failure class instead of parsing messages.

use crate::cancel::CancelledError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured error details attached to failed jobs and dead-lettered
/// sync operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

impl<E: std::error::Error> From<&E> for ErrorInfo {
    fn from(err: &E) -> Self {
        let details = err.source().map(|s| s.to_string());
        Self {
            message: err.to_string(),
            details,
        }
    }
}

/// Errors surfaced by reactor operations
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("document deleted: {document_id}")]
    DocumentDeleted {
        document_id: String,
        deleted_at_utc_ms: Option<i64>,
    },

    #[error("document {document_id} has no genesis operation; submit CREATE_DOCUMENT first")]
    CreateDocumentRequired { document_id: String },

    #[error("invalid signature on {id} at index {index}")]
    InvalidSignature { id: String, index: u64 },

    #[error("downgrade not supported for {document_type}: {from} -> {to}")]
    DowngradeNotSupported {
        document_type: String,
        from: u32,
        to: u32,
    },

    #[error("no upgrade manifest for {document_type} {from} -> {to}")]
    UpgradeManifestNotFound {
        document_type: String,
        from: u32,
        to: u32,
    },

    #[error("missing upgrade transition for {document_type} at version {at}")]
    MissingUpgradeTransition { document_type: String, at: u32 },

    #[error("upgrade steps must advance exactly one version, got {from} -> {to}")]
    InvalidUpgradeStep { from: u32, to: u32 },

    #[error("document model not found: {document_type}{}", version.map(|v| format!(" v{v}")).unwrap_or_default())]
    ModuleNotFound {
        document_type: String,
        version: Option<u32>,
    },

    #[error("document model already registered: {document_type} v{version}")]
    DuplicateModule { document_type: String, version: u32 },

    #[error("upgrade manifest already registered: {document_type} {from} -> {to}")]
    DuplicateManifest {
        document_type: String,
        from: u32,
        to: u32,
    },

    #[error("failed to load document model {document_type}: {reason}")]
    ModelLoadFailed {
        document_type: String,
        reason: String,
    },

    #[error("channel {channel_id} is shut down and cannot receive envelopes")]
    ChannelShutDown { channel_id: String },

    #[error("sync remote already registered: {name}")]
    DuplicateRemote { name: String },

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

    #[error("document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("job queue is blocked")]
    QueueBlocked,

    #[error(transparent)]
    Cancelled(#[from] CancelledError),

    #[error("model error: {0}")]
    Model(#[from] crate::model::ModelError),

    #[error("storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Events(#[from] crate::events::EventBusAggregateError),

    #[error("{0}")]
    Internal(String),
}

impl ReactorError {
    /// Wrap an underlying storage error
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ReactorError::Storage(Box::new(err))
    }

    /// Whether a re-run of the same job could succeed.
    ///
    /// Validation failures are deterministic; only infrastructure-shaped
    /// failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReactorError::Internal(_) | ReactorError::Storage(_))
    }
}
