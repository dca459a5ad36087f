// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations: the unit of change accepted into the log
//!
//! Every mutation becomes an [`Operation`] in exactly one
//! (document, scope, branch) stream. Within a stream, operations are
//! ordered by `(index, skip)`: `index` is the per-stream sequence number
//! and `skip` marks how many prior operations a replacement supersedes.
//! Ordinals (assigned at commit) order operations across all streams.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Built-in action kinds handled by the reactor itself.
///
/// Anything else is model-defined and routed through the document-model
/// reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CreateDocument,
    DeleteDocument,
    UpgradeDocument,
    AddRelationship,
    RemoveRelationship,
    Custom,
}

impl ActionKind {
    pub const CREATE_DOCUMENT: &'static str = "CREATE_DOCUMENT";
    pub const DELETE_DOCUMENT: &'static str = "DELETE_DOCUMENT";
    pub const UPGRADE_DOCUMENT: &'static str = "UPGRADE_DOCUMENT";
    pub const ADD_RELATIONSHIP: &'static str = "ADD_RELATIONSHIP";
    pub const REMOVE_RELATIONSHIP: &'static str = "REMOVE_RELATIONSHIP";

    pub fn parse(kind: &str) -> Self {
        match kind {
            Self::CREATE_DOCUMENT => ActionKind::CreateDocument,
            Self::DELETE_DOCUMENT => ActionKind::DeleteDocument,
            Self::UPGRADE_DOCUMENT => ActionKind::UpgradeDocument,
            Self::ADD_RELATIONSHIP => ActionKind::AddRelationship,
            Self::REMOVE_RELATIONSHIP => ActionKind::RemoveRelationship,
            _ => ActionKind::Custom,
        }
    }

    /// Lifecycle actions live in the document scope and are applied by the
    /// reactor, not by a model reducer.
    pub fn is_lifecycle(kind: &str) -> bool {
        !matches!(Self::parse(kind), ActionKind::Custom)
    }
}

/// Signature material attached to a signed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub public_key: String,
    pub signatures: Vec<String>,
}

/// A single requested change, not yet accepted into the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: String,
    pub scope: String,
    pub timestamp_utc_ms: i64,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Signer>,
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        scope: impl Into<String>,
        timestamp_utc_ms: i64,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            scope: scope.into(),
            timestamp_utc_ms,
            input,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(signer);
        self
    }
}

/// An accepted change at a fixed position in its stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub index: u64,
    pub skip: u64,
    pub timestamp_utc_ms: i64,
    pub hash: String,
    pub action: Action,
}

impl Operation {
    /// Build an operation from an action at the given stream position.
    ///
    /// The content hash covers the action's identity and input so replicas
    /// can verify integrity without replaying.
    pub fn from_action(action: Action, index: u64, skip: u64) -> Self {
        let hash = content_hash(&action);
        let timestamp_utc_ms = action.timestamp_utc_ms;
        Self {
            id: action.id.clone(),
            index,
            skip,
            timestamp_utc_ms,
            hash,
            action,
        }
    }

    /// Position of this operation within its stream
    pub fn stream_position(&self) -> (u64, u64) {
        (self.index, self.skip)
    }

    /// Verify the stored content hash against the action
    pub fn verify_hash(&self) -> bool {
        self.hash == content_hash(&self.action)
    }
}

/// SHA-256 over the action's identity and canonical input, hex-encoded
pub fn content_hash(action: &Action) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(action.kind.as_bytes());
    hasher.update(b"\x00");
    hasher.update(action.scope.as_bytes());
    hasher.update(b"\x00");
    let input = serde_json::to_string(&action.input).unwrap_or_default();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Whether `next` is an acceptable successor to a stream whose tip is
/// `tip` (`None` for an empty stream).
///
/// A successor either advances the index by one, or supersedes the tip at
/// the same index with a strictly greater `skip`.
pub fn follows(tip: Option<(u64, u64)>, next: (u64, u64)) -> bool {
    match tip {
        None => next.0 == 0,
        Some((tip_index, tip_skip)) => {
            next.0 == tip_index + 1 || (next.0 == tip_index && next.1 > tip_skip)
        }
    }
}

/// Placement metadata carried with an operation once committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub document_id: String,
    pub document_type: String,
    pub scope: String,
    pub branch: String,
    /// Global commit order; 0 until assigned by the operation index
    #[serde(default)]
    pub ordinal: u64,
    /// Remote this operation arrived from, empty for local writes
    #[serde(default)]
    pub source_remote: String,
}

/// An operation plus the context needed to place it without lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationWithContext {
    pub operation: Operation,
    pub context: OperationContext,
}

impl OperationWithContext {
    /// Stream key `document:scope:branch` used by caches and mailboxes
    pub fn stream_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.context.document_id, self.context.scope, self.context.branch
        )
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
