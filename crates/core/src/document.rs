// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned documents reconstructed from the operation log
//!
//! A document holds one JSON state tree per scope. Revisions count
//! accepted operations per scope: revision N is the state after the
//! first N operations of that scope's stream have been applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity and bookkeeping shared by every scope of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub document_type: String,
    /// Per-scope revision counters
    pub revision: BTreeMap<String, u64>,
    pub created_at_utc: DateTime<Utc>,
    pub last_modified_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    /// Document-model version this state was produced by
    pub version: u32,
}

/// A materialized document: header plus one state tree per scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub header: DocumentHeader,
    /// Scope name -> model state
    pub state: BTreeMap<String, serde_json::Value>,
}

impl Document {
    /// Scope that carries lifecycle actions (create, delete, upgrade,
    /// relationships)
    pub const DOCUMENT_SCOPE: &'static str = "document";
    /// Default model-state scope
    pub const GLOBAL_SCOPE: &'static str = "global";
    pub const MAIN_BRANCH: &'static str = "main";

    /// A fresh document at its genesis, before any model action applied
    pub fn new(
        id: impl Into<String>,
        document_type: impl Into<String>,
        created_at_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            header: DocumentHeader {
                id: id.into(),
                slug: None,
                document_type: document_type.into(),
                revision: BTreeMap::new(),
                created_at_utc,
                last_modified_at_utc: created_at_utc,
                deleted: false,
                version: 1,
            },
            state: BTreeMap::new(),
        }
    }

    /// Revision of a scope (0 when no operation has touched it)
    pub fn revision(&self, scope: &str) -> u64 {
        self.header.revision.get(scope).copied().unwrap_or(0)
    }

    /// Record that an operation was applied to `scope` at `timestamp`
    pub fn bump_revision(&mut self, scope: &str, timestamp: DateTime<Utc>) -> u64 {
        let entry = self.header.revision.entry(scope.to_string()).or_insert(0);
        *entry += 1;
        self.header.last_modified_at_utc = timestamp;
        *entry
    }

    /// State tree of a scope, if any operation has produced one
    pub fn scope_state(&self, scope: &str) -> Option<&serde_json::Value> {
        self.state.get(scope)
    }

    pub fn set_scope_state(&mut self, scope: impl Into<String>, state: serde_json::Value) {
        self.state.insert(scope.into(), state);
    }

    /// A fully independent copy.
    ///
    /// `Document` owns its whole tree, so `clone` already deep-copies;
    /// the name states the caching contract: a clone handed out of a
    /// cache can be mutated freely without reaching the cached value.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}
