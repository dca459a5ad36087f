// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document-model contract consumed from pluggable modules
//!
//! A model is the aggregate of a document type's pure functions: an
//! initial-state constructor and a reducer that takes state in and
//! returns new state out. The reactor never inspects module internals;
//! it calls `reduce` during replay and `initial_state` at genesis.

use crate::operation::Action;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by model reducers and upgrade functions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("unknown action kind: {kind}")]
    UnknownAction { kind: String },

    #[error("invalid action input: {reason}")]
    InvalidInput { reason: String },

    #[error("reducer failed: {reason}")]
    ReducerFailed { reason: String },
}

/// A loaded document-model module.
///
/// Reducers are "immutable in, new state out": implementations must not
/// rely on observing their own prior in-place mutations.
pub trait DocumentModel: Send + Sync {
    fn document_type(&self) -> &str;

    fn version(&self) -> u32 {
        1
    }

    /// Initial model state for a freshly created document
    fn initial_state(&self) -> serde_json::Value;

    fn file_extension(&self) -> Option<&str> {
        None
    }

    /// Apply one model-defined action to the current state
    fn reduce(&self, state: serde_json::Value, action: &Action)
        -> Result<serde_json::Value, ModelError>;
}

/// State transformer applied when upgrading one model version
pub type UpgradeFn =
    Arc<dyn Fn(serde_json::Value) -> Result<serde_json::Value, ModelError> + Send + Sync>;

/// Registered path from one model version to the next
#[derive(Clone)]
pub struct UpgradeManifest {
    pub document_type: String,
    pub from_version: u32,
    pub to_version: u32,
    pub upgrade: UpgradeFn,
}

impl UpgradeManifest {
    pub fn new(
        document_type: impl Into<String>,
        from_version: u32,
        to_version: u32,
        upgrade: UpgradeFn,
    ) -> Self {
        Self {
            document_type: document_type.into(),
            from_version,
            to_version,
            upgrade,
        }
    }
}

impl fmt::Debug for UpgradeManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeManifest")
            .field("document_type", &self.document_type)
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .finish()
    }
}
