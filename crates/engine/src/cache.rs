// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write cache: recent document state per stream
//!
//! A per-stream ring of `{revision, document}` snapshots with LRU
//! eviction across streams. Documents are deep-copied on the way in and
//! out, so no caller ever holds a reference into the cache. Misses fall
//! back to replay: from the newest cached revision below the target
//! (warm), else from the nearest keyframe or the genesis operation
//! (cold).

use crate::lifecycle::{self, DOCUMENT_SCOPE};
use crate::registry::DocumentModelRegistry;
use keel_core::{bail_if_cancelled, ActionKind, CancellationToken, Document, ReactorError};
use keel_storage::{Keyframe, KeyframeStore, OperationIndex};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Tuning knobs for the write cache
#[derive(Debug, Clone)]
pub struct WriteCacheConfig {
    /// Streams cached before LRU eviction kicks in
    pub max_documents: usize,
    /// Revisions retained per stream
    pub ring_capacity: usize,
    /// Persist a keyframe every N revisions (0 disables)
    pub keyframe_interval: u64,
}

impl Default for WriteCacheConfig {
    fn default() -> Self {
        Self {
            max_documents: 256,
            ring_capacity: 8,
            keyframe_interval: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    document_id: String,
    scope: String,
    branch: String,
}

struct CachedRevision {
    revision: u64,
    document: Document,
}

struct StreamRing {
    entries: VecDeque<CachedRevision>,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    rings: HashMap<CacheKey, StreamRing>,
    tick: u64,
}

/// Cache of recent per-stream document state, replay-backed
pub struct WriteCache {
    config: WriteCacheConfig,
    index: Arc<OperationIndex>,
    keyframes: Arc<KeyframeStore>,
    registry: Arc<DocumentModelRegistry>,
    state: Mutex<CacheState>,
}

impl WriteCache {
    pub fn new(
        config: WriteCacheConfig,
        index: Arc<OperationIndex>,
        keyframes: Arc<KeyframeStore>,
        registry: Arc<DocumentModelRegistry>,
    ) -> Self {
        Self {
            config,
            index,
            keyframes,
            registry,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Lifecycle hook; nothing to warm today
    pub async fn startup(&self) {}

    /// Lifecycle hook; the cache holds no resources needing teardown
    pub async fn shutdown(&self) {}

    /// Document state for a stream at `target_revision` (`None` = tip).
    ///
    /// The returned document is an independent copy.
    pub async fn get_state(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        target_revision: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Document, ReactorError> {
        bail_if_cancelled(cancel)?;

        let revisions = self
            .index
            .get_revisions(document_id, branch, cancel)
            .await
            .map_err(ReactorError::storage)?;
        if revisions.tips.is_empty() {
            return Err(ReactorError::DocumentNotFound {
                document_id: document_id.to_string(),
            });
        }
        let tip_revision = revisions.tips.get(scope).map(|i| i + 1).unwrap_or(0);
        let target = target_revision.unwrap_or(tip_revision);

        let key = CacheKey {
            document_id: document_id.to_string(),
            scope: scope.to_string(),
            branch: branch.to_string(),
        };

        // Tier 1: exact hit. Also capture the warm base while the lock
        // is held.
        let warm_base = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.tick += 1;
            let tick = state.tick;
            if let Some(ring) = state.rings.get_mut(&key) {
                ring.last_used = tick;
                if let Some(hit) = ring.entries.iter().find(|e| e.revision == target) {
                    return Ok(hit.document.deep_clone());
                }
                ring.entries
                    .iter()
                    .filter(|e| e.revision < target)
                    .max_by_key(|e| e.revision)
                    .map(|e| e.document.deep_clone())
            } else {
                None
            }
        };

        // Tier 2: warm rebuild from the cached base; tier 3: cold from
        // keyframe or genesis.
        let base = match warm_base {
            Some(base) => base,
            None => {
                let keyframe = self
                    .keyframes
                    .find_nearest_keyframe(document_id, scope, branch, Some(target), cancel)
                    .await
                    .map_err(ReactorError::storage)?;
                match keyframe {
                    Some(kf) => kf.document,
                    None => self.build_genesis(document_id, branch, cancel).await?,
                }
            }
        };

        let rebuilt = self
            .replay_onto(base, document_id, scope, branch, target, cancel)
            .await?;
        self.store(key, rebuilt.revision(scope), rebuilt.deep_clone());
        Ok(rebuilt)
    }

    /// Cache a freshly written document state (deep-copied in).
    ///
    /// Every `keyframe_interval` revisions a keyframe persist is spawned
    /// off the hot path; its failure is logged, never surfaced.
    pub async fn put_state(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        bail_if_cancelled(cancel)?;

        let revision = document.revision(scope);
        let key = CacheKey {
            document_id: document_id.to_string(),
            scope: scope.to_string(),
            branch: branch.to_string(),
        };
        self.store(key, revision, document.deep_clone());

        if self.config.keyframe_interval > 0
            && revision > 0
            && revision % self.config.keyframe_interval == 0
        {
            let keyframe = Keyframe {
                document_id: document_id.to_string(),
                document_type: document.header.document_type.clone(),
                scope: scope.to_string(),
                branch: branch.to_string(),
                revision,
                document: document.deep_clone(),
            };
            let store = self.keyframes.clone();
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                if let Err(e) = store.put_keyframe(keyframe, &cancel).await {
                    tracing::warn!(?e, "keyframe persist failed");
                }
            });
        }
        Ok(())
    }

    /// Drop cached streams for a document, optionally narrowed to one
    /// scope and branch. Returns the number of streams dropped.
    pub fn invalidate(
        &self,
        document_id: &str,
        scope: Option<&str>,
        branch: Option<&str>,
    ) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.rings.len();
        state.rings.retain(|key, _| {
            !(key.document_id == document_id
                && scope.map(|s| key.scope == s).unwrap_or(true)
                && branch.map(|b| key.branch == b).unwrap_or(true))
        });
        before - state.rings.len()
    }

    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rings
            .clear();
    }

    fn store(&self, key: CacheKey, revision: u64, document: Document) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.tick += 1;
        let tick = state.tick;
        let ring_capacity = self.config.ring_capacity;
        let ring = state.rings.entry(key).or_insert_with(|| StreamRing {
            entries: VecDeque::new(),
            last_used: tick,
        });
        ring.last_used = tick;
        ring.entries.retain(|e| e.revision != revision);
        ring.entries.push_back(CachedRevision { revision, document });
        while ring.entries.len() > ring_capacity {
            ring.entries.pop_front();
        }

        while state.rings.len() > self.config.max_documents {
            let oldest = state
                .rings
                .iter()
                .min_by_key(|(_, ring)| ring.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    state.rings.remove(&key);
                }
                None => break,
            }
        }
    }

    async fn build_genesis(
        &self,
        document_id: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Document, ReactorError> {
        let ops = self
            .index
            .get_stream_operations(document_id, DOCUMENT_SCOPE, branch, 0, Some(1), cancel)
            .await
            .map_err(ReactorError::storage)?;
        let first = ops.first().ok_or_else(|| ReactorError::DocumentNotFound {
            document_id: document_id.to_string(),
        })?;
        if ActionKind::parse(&first.operation.action.kind) != ActionKind::CreateDocument {
            return Err(ReactorError::CreateDocumentRequired {
                document_id: document_id.to_string(),
            });
        }
        lifecycle::genesis(document_id, &first.operation.action)
    }

    /// Replay the stream onto `document`: document-scope lifecycle
    /// actions first, then the target scope's operations up to
    /// `target_revision`.
    async fn replay_onto(
        &self,
        mut document: Document,
        document_id: &str,
        scope: &str,
        branch: &str,
        target_revision: u64,
        cancel: &CancellationToken,
    ) -> Result<Document, ReactorError> {
        let doc_from = document.revision(DOCUMENT_SCOPE);
        let doc_to = (scope == DOCUMENT_SCOPE).then_some(target_revision);
        let doc_ops = self
            .index
            .get_stream_operations(document_id, DOCUMENT_SCOPE, branch, doc_from, doc_to, cancel)
            .await
            .map_err(ReactorError::storage)?;
        for op in &doc_ops {
            lifecycle::apply_document_action(&mut document, &op.operation.action, &self.registry)?;
        }

        if scope != DOCUMENT_SCOPE {
            let from = document.revision(scope);
            if from < target_revision {
                let ops = self
                    .index
                    .get_stream_operations(
                        document_id,
                        scope,
                        branch,
                        from,
                        Some(target_revision),
                        cancel,
                    )
                    .await
                    .map_err(ReactorError::storage)?;
                if !ops.is_empty() {
                    let model = self.registry.get_module(&document.header.document_type)?;
                    for op in &ops {
                        lifecycle::apply_scope_action(
                            &mut document,
                            scope,
                            &op.operation.action,
                            &model,
                        )?;
                    }
                }
            }
        }
        Ok(document)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
