// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle action application
//!
//! Document-scope actions (create, delete, upgrade, relationships) are
//! applied by the reactor itself, never by a model reducer. Both the
//! executor (live writes) and the write cache (replay) fold operations
//! through these functions, so replayed state always matches what the
//! executor produced.

use crate::registry::DocumentModelRegistry;
use chrono::{DateTime, Utc};
use keel_core::{Action, ActionKind, Document, DocumentModel, ReactorError};
use serde::Deserialize;
use std::sync::Arc;

pub(crate) const DOCUMENT_SCOPE: &str = Document::DOCUMENT_SCOPE;

/// Input carried by a CREATE_DOCUMENT action
#[derive(Debug, Deserialize)]
pub struct CreateDocumentInput {
    pub document_type: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    /// Collection the new document joins in the same transaction
    #[serde(default)]
    pub collection_id: Option<String>,
}

/// Input carried by a DELETE_DOCUMENT action
#[derive(Debug, Deserialize)]
pub struct DeleteDocumentInput {
    /// Target document; defaults to the operation's own document
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Input carried by an UPGRADE_DOCUMENT action
#[derive(Debug, Deserialize)]
pub struct UpgradeDocumentInput {
    pub to_version: u32,
}

/// Input carried by ADD_RELATIONSHIP / REMOVE_RELATIONSHIP actions
#[derive(Debug, Deserialize)]
pub struct RelationshipInput {
    pub parent_id: String,
    pub child_id: String,
}

fn invalid_input(action: &Action, err: serde_json::Error) -> ReactorError {
    ReactorError::Internal(format!(
        "malformed {} input on action {}: {err}",
        action.kind, action.id
    ))
}

fn action_timestamp(action: &Action) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(action.timestamp_utc_ms).unwrap_or_else(Utc::now)
}

/// Build a fresh document from its genesis CREATE_DOCUMENT action
pub fn genesis(document_id: &str, action: &Action) -> Result<Document, ReactorError> {
    let input: CreateDocumentInput =
        serde_json::from_value(action.input.clone()).map_err(|e| invalid_input(action, e))?;
    let timestamp = action_timestamp(action);
    let mut document = Document::new(document_id, input.document_type, timestamp);
    document.header.slug = input.slug;
    if let Some(version) = input.version {
        document.header.version = version;
    }
    document.bump_revision(DOCUMENT_SCOPE, timestamp);
    Ok(document)
}

/// Apply one document-scope lifecycle action to an existing document
pub fn apply_document_action(
    document: &mut Document,
    action: &Action,
    registry: &DocumentModelRegistry,
) -> Result<(), ReactorError> {
    let timestamp = action_timestamp(action);
    match ActionKind::parse(&action.kind) {
        ActionKind::CreateDocument => {
            // Genesis is handled separately; a replayed duplicate is
            // absorbed so replay stays idempotent.
            tracing::warn!(
                document_id = %document.header.id,
                action_id = %action.id,
                "CREATE_DOCUMENT on an existing document ignored"
            );
            Ok(())
        }
        ActionKind::DeleteDocument => {
            document.header.deleted = true;
            document.bump_revision(DOCUMENT_SCOPE, timestamp);
            Ok(())
        }
        ActionKind::UpgradeDocument => {
            let input: UpgradeDocumentInput = serde_json::from_value(action.input.clone())
                .map_err(|e| invalid_input(action, e))?;
            let path = registry.compute_upgrade_path(
                &document.header.document_type,
                document.header.version,
                input.to_version,
            )?;
            for manifest in path {
                let scopes: Vec<String> = document
                    .state
                    .keys()
                    .filter(|s| s.as_str() != DOCUMENT_SCOPE)
                    .cloned()
                    .collect();
                for scope in scopes {
                    if let Some(state) = document.scope_state(&scope).cloned() {
                        let upgraded = (manifest.upgrade)(state)?;
                        document.set_scope_state(scope, upgraded);
                    }
                }
            }
            document.header.version = input.to_version;
            document.bump_revision(DOCUMENT_SCOPE, timestamp);
            Ok(())
        }
        ActionKind::AddRelationship | ActionKind::RemoveRelationship => {
            let input: RelationshipInput = serde_json::from_value(action.input.clone())
                .map_err(|e| invalid_input(action, e))?;
            apply_relationship(
                document,
                &input.child_id,
                action.kind == ActionKind::ADD_RELATIONSHIP,
            );
            document.bump_revision(DOCUMENT_SCOPE, timestamp);
            Ok(())
        }
        ActionKind::Custom => Err(ReactorError::Internal(format!(
            "model-defined action {} routed to the lifecycle handler",
            action.kind
        ))),
    }
}

/// Apply one model-defined action to a scope through the model reducer
pub fn apply_scope_action(
    document: &mut Document,
    scope: &str,
    action: &Action,
    model: &Arc<dyn DocumentModel>,
) -> Result<(), ReactorError> {
    let state = document
        .scope_state(scope)
        .cloned()
        .unwrap_or_else(|| model.initial_state());
    let next = model.reduce(state, action)?;
    document.set_scope_state(scope, next);
    document.bump_revision(scope, action_timestamp(action));
    Ok(())
}

fn apply_relationship(document: &mut Document, child_id: &str, add: bool) {
    let mut state = document
        .scope_state(DOCUMENT_SCOPE)
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let children = state
        .as_object_mut()
        .map(|obj| {
            obj.entry("children")
                .or_insert_with(|| serde_json::json!([]))
        })
        .and_then(|v| v.as_array_mut());
    if let Some(children) = children {
        let existing = children
            .iter()
            .position(|c| c.as_str() == Some(child_id));
        match (add, existing) {
            (true, None) => children.push(serde_json::json!(child_id)),
            (false, Some(at)) => {
                children.remove(at);
            }
            _ => {}
        }
    }
    document.set_scope_state(DOCUMENT_SCOPE, state);
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
