// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rebuildable in-memory projection of the index log
//!
//! Holds stream tips, the ordinal counter, collection membership, and
//! per-collection latest timestamps. Derived entirely from the log:
//! dropping it and replaying yields the same state.

use super::entry::{IndexEntry, IndexRecord};
use std::collections::HashMap;

/// Identity of one operation stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub document_id: String,
    pub scope: String,
    pub branch: String,
}

impl StreamKey {
    pub fn new(
        document_id: impl Into<String>,
        scope: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            scope: scope.into(),
            branch: branch.into(),
        }
    }
}

/// Last accepted position of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTip {
    pub index: u64,
    pub skip: u64,
    pub latest_timestamp_ms: i64,
}

/// Append-only membership marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipRow {
    pub document_id: String,
    pub joined_ordinal: u64,
    pub left_ordinal: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionState {
    pub name: String,
    pub rows: Vec<MembershipRow>,
    pub latest_timestamp_ms: i64,
}

impl CollectionState {
    /// A document is a member when its latest row has joined and not left
    fn is_active(&self, document_id: &str) -> bool {
        self.rows
            .iter()
            .rev()
            .find(|row| row.document_id == document_id)
            .map(|row| row.left_ordinal.is_none())
            .unwrap_or(false)
    }

    /// Membership as of a given ordinal (for historical collection reads)
    pub fn is_member_at(&self, document_id: &str, ordinal: u64) -> bool {
        self.rows
            .iter()
            .rev()
            .find(|row| row.document_id == document_id && row.joined_ordinal <= ordinal)
            .map(|row| row.left_ordinal.map(|left| left > ordinal).unwrap_or(true))
            .unwrap_or(false)
    }
}

/// In-memory state of the operation index
#[derive(Debug, Default)]
pub struct IndexState {
    next_ordinal: u64,
    streams: HashMap<StreamKey, StreamTip>,
    document_types: HashMap<String, String>,
    collections: HashMap<String, CollectionState>,
}

impl IndexState {
    pub fn new() -> Self {
        Self {
            next_ordinal: 1,
            ..Self::default()
        }
    }

    /// Next ordinal to assign at commit
    pub fn next_ordinal(&self) -> u64 {
        self.next_ordinal.max(1)
    }

    pub fn tip(&self, key: &StreamKey) -> Option<StreamTip> {
        self.streams.get(key).copied()
    }

    pub fn document_type(&self, document_id: &str) -> Option<&str> {
        self.document_types.get(document_id).map(|s| s.as_str())
    }

    pub fn collection_exists(&self, collection_id: &str) -> bool {
        self.collections.contains_key(collection_id)
    }

    pub fn collection(&self, collection_id: &str) -> Option<&CollectionState> {
        self.collections.get(collection_id)
    }

    /// Collections a document is currently a member of
    pub fn collections_for(&self, document_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .collections
            .iter()
            .filter(|(_, state)| state.is_active(document_id))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Per-scope tips and the latest timestamp for one (document, branch)
    pub fn revisions(&self, document_id: &str, branch: &str) -> (HashMap<String, u64>, i64) {
        let mut tips = HashMap::new();
        let mut latest_ms = 0;
        for (key, tip) in &self.streams {
            if key.document_id == document_id && key.branch == branch {
                tips.insert(key.scope.clone(), tip.index);
                latest_ms = latest_ms.max(tip.latest_timestamp_ms);
            }
        }
        (tips, latest_ms)
    }

    /// Fold one log entry into the projection.
    ///
    /// Replay-tolerant: entries that repeat state (duplicate join, etc.)
    /// are absorbed silently.
    pub fn apply(&mut self, entry: &IndexEntry) {
        self.next_ordinal = self.next_ordinal.max(entry.ordinal + 1);

        match &entry.record {
            IndexRecord::Operation(op) => {
                let key = StreamKey::new(
                    op.context.document_id.clone(),
                    op.context.scope.clone(),
                    op.context.branch.clone(),
                );
                self.streams.insert(
                    key,
                    StreamTip {
                        index: op.operation.index,
                        skip: op.operation.skip,
                        latest_timestamp_ms: op.operation.timestamp_utc_ms,
                    },
                );
                self.document_types.insert(
                    op.context.document_id.clone(),
                    op.context.document_type.clone(),
                );
                for state in self.collections.values_mut() {
                    if state.is_active(&op.context.document_id) {
                        state.latest_timestamp_ms =
                            state.latest_timestamp_ms.max(op.operation.timestamp_utc_ms);
                    }
                }
            }
            IndexRecord::CollectionCreated {
                collection_id,
                name,
            } => {
                self.collections
                    .entry(collection_id.clone())
                    .or_insert_with(|| CollectionState {
                        name: name.clone(),
                        rows: Vec::new(),
                        latest_timestamp_ms: 0,
                    });
            }
            IndexRecord::CollectionJoined {
                collection_id,
                document_id,
            } => {
                let state = self.collections.entry(collection_id.clone()).or_default();
                if !state.is_active(document_id) {
                    state.rows.push(MembershipRow {
                        document_id: document_id.clone(),
                        joined_ordinal: entry.ordinal,
                        left_ordinal: None,
                    });
                }
            }
            IndexRecord::CollectionLeft {
                collection_id,
                document_id,
            } => {
                if let Some(state) = self.collections.get_mut(collection_id) {
                    if let Some(row) = state
                        .rows
                        .iter_mut()
                        .rev()
                        .find(|row| row.document_id == *document_id && row.left_ordinal.is_none())
                    {
                        row.left_ordinal = Some(entry.ordinal);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
