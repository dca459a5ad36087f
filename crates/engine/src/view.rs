// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document view: the queryable snapshot of every stream
//!
//! A pre-ready read model, so `get`/`get_by_slug` observe a write as
//! soon as its job completes. One row per (document, scope, branch)
//! plus a slug map; the whole view persists to `view/state.json` with
//! its catch-up cursor, and `init` replays anything the index accepted
//! while the view was down.

use crate::coordinator::{ReadModel, ReadModelPhase};
use crate::lifecycle::{CreateDocumentInput, DeleteDocumentInput, UpgradeDocumentInput};
use async_trait::async_trait;
use keel_core::{
    bail_if_cancelled, ActionKind, CancellationToken, OperationWithContext, ReactorError,
};
use keel_storage::{OperationIndex, Paging};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Snapshot row for one (document, scope, branch) stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow {
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub document_type: String,
    pub scope: String,
    pub branch: String,
    pub last_operation_index: u64,
    pub last_operation_hash: String,
    pub snapshot_version: u32,
    pub deleted: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ViewState {
    last_ordinal: u64,
    /// `document:scope:branch` -> row
    rows: HashMap<String, ViewRow>,
    /// slug -> document id
    slugs: HashMap<String, String>,
}

#[derive(Deserialize)]
struct StorableViewState {
    #[allow(dead_code)]
    version: u32,
    state: ViewState,
}

#[derive(Serialize)]
struct StorableViewStateRef<'a> {
    version: u32,
    state: &'a ViewState,
}

const VIEW_STATE_VERSION: u32 = 1;

fn row_key(document_id: &str, scope: &str, branch: &str) -> String {
    format!("{document_id}:{scope}:{branch}")
}

/// Queryable document snapshots, kept current by the coordinator
pub struct DocumentView {
    state_path: PathBuf,
    index: Arc<OperationIndex>,
    inner: Mutex<ViewState>,
}

impl DocumentView {
    pub fn open(
        view_dir: impl Into<PathBuf>,
        index: Arc<OperationIndex>,
    ) -> Result<Self, ReactorError> {
        let dir = view_dir.into();
        std::fs::create_dir_all(&dir).map_err(ReactorError::storage)?;
        let state_path = dir.join("state.json");
        let state = match std::fs::read(&state_path) {
            Ok(bytes) => {
                let stored: StorableViewState =
                    serde_json::from_slice(&bytes).map_err(ReactorError::storage)?;
                stored.state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ViewState::default(),
            Err(e) => return Err(ReactorError::storage(e)),
        };
        Ok(Self {
            state_path,
            index,
            inner: Mutex::new(state),
        })
    }

    /// Catch up from the operation index; run before serving queries
    pub async fn init(&self, cancel: &CancellationToken) -> Result<(), ReactorError> {
        loop {
            bail_if_cancelled(cancel)?;
            let cursor = {
                let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.last_ordinal
            };
            let page = self
                .index
                .get_since_ordinal(cursor, Paging::default(), cancel)
                .await
                .map_err(ReactorError::storage)?;
            if page.items.is_empty() {
                break;
            }
            let done = page.next_cursor.is_none();
            self.apply_batch(&page.items)?;
            if done {
                break;
            }
        }
        Ok(())
    }

    /// Which of `document_ids` have a live (non-deleted) snapshot
    pub fn exists(&self, document_ids: &[String]) -> HashMap<String, bool> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        document_ids
            .iter()
            .map(|id| {
                let live = inner
                    .rows
                    .values()
                    .any(|row| row.document_id == *id && !row.deleted);
                (id.clone(), live)
            })
            .collect()
    }

    /// Snapshot rows for the given documents in one (scope, branch)
    pub fn get_many(&self, document_ids: &[String], scope: &str, branch: &str) -> Vec<ViewRow> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        document_ids
            .iter()
            .filter_map(|id| inner.rows.get(&row_key(id, scope, branch)).cloned())
            .collect()
    }

    pub fn get(&self, document_id: &str, scope: &str, branch: &str) -> Option<ViewRow> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rows.get(&row_key(document_id, scope, branch)).cloned()
    }

    /// Resolve a slug to its document's document-scope row
    pub fn get_by_slug(&self, slug: &str) -> Option<ViewRow> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let document_id = inner.slugs.get(slug)?;
        inner
            .rows
            .get(&row_key(
                document_id,
                keel_core::Document::DOCUMENT_SCOPE,
                keel_core::Document::MAIN_BRANCH,
            ))
            .cloned()
    }

    /// Registered type of a document, from any of its rows
    pub fn document_type(&self, document_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .rows
            .values()
            .find(|row| row.document_id == document_id)
            .map(|row| row.document_type.clone())
    }

    pub fn last_ordinal(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.last_ordinal
    }

    fn apply_batch(&self, operations: &[OperationWithContext]) -> Result<(), ReactorError> {
        let bytes = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            for op in operations {
                // Replayed catch-up overlaps live indexing; skip what the
                // cursor already covers.
                if op.context.ordinal <= inner.last_ordinal {
                    continue;
                }
                apply_operation(&mut inner, op);
                inner.last_ordinal = op.context.ordinal;
            }
            serde_json::to_vec_pretty(&StorableViewStateRef {
                version: VIEW_STATE_VERSION,
                state: &inner,
            })
            .map_err(ReactorError::storage)?
        };
        std::fs::write(&self.state_path, &bytes).map_err(ReactorError::storage)?;
        Ok(())
    }
}

fn apply_operation(state: &mut ViewState, op: &OperationWithContext) {
    let context = &op.context;
    let action = &op.operation.action;
    let key = row_key(&context.document_id, &context.scope, &context.branch);

    let row = state.rows.entry(key).or_insert_with(|| ViewRow {
        document_id: context.document_id.clone(),
        slug: None,
        document_type: context.document_type.clone(),
        scope: context.scope.clone(),
        branch: context.branch.clone(),
        last_operation_index: 0,
        last_operation_hash: String::new(),
        snapshot_version: 1,
        deleted: false,
    });
    row.last_operation_index = op.operation.index;
    row.last_operation_hash = op.operation.hash.clone();

    match ActionKind::parse(&action.kind) {
        ActionKind::CreateDocument => {
            if let Ok(input) = serde_json::from_value::<CreateDocumentInput>(action.input.clone())
            {
                if let Some(version) = input.version {
                    row.snapshot_version = version;
                }
                if let Some(slug) = input.slug {
                    row.slug = Some(slug.clone());
                    state.slugs.insert(slug, context.document_id.clone());
                }
            }
        }
        ActionKind::DeleteDocument => {
            let target = serde_json::from_value::<DeleteDocumentInput>(action.input.clone())
                .ok()
                .and_then(|input| input.document_id)
                .unwrap_or_else(|| context.document_id.clone());
            for row in state.rows.values_mut() {
                if row.document_id == target {
                    row.deleted = true;
                }
            }
        }
        ActionKind::UpgradeDocument => {
            if let Ok(input) = serde_json::from_value::<UpgradeDocumentInput>(action.input.clone())
            {
                let target = context.document_id.clone();
                for row in state.rows.values_mut() {
                    if row.document_id == target {
                        row.snapshot_version = input.to_version;
                    }
                }
            }
        }
        _ => {}
    }
}

#[async_trait]
impl ReadModel for DocumentView {
    fn name(&self) -> &str {
        "document-view"
    }

    fn phase(&self) -> ReadModelPhase {
        ReadModelPhase::PreReady
    }

    async fn index_operations(
        &self,
        operations: &[OperationWithContext],
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        bail_if_cancelled(cancel)?;
        self.apply_batch(operations)
    }
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
