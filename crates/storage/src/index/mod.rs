// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation index: the durable, totally-ordered log of operations
//!
//! The single writer of truth. Commits are transactional and
//! serialized: every buffered entry is validated against the stream
//! tips, ordinals are assigned consecutively, and the batch is appended
//! with one fsync; a failed commit writes nothing. Reads scan the
//! append-only log and are safe against concurrent commits.

mod entry;
mod log;
mod state;

pub use entry::{IndexEntry, IndexRecord};
pub use log::{repair, LogReader, LogWriter};
pub use state::{CollectionState, IndexState, MembershipRow, StreamKey, StreamTip};

use crate::error::StorageError;
use crate::query::{Page, Paging, ViewFilter};
use keel_core::{bail_if_cancelled, operation, CancellationToken, OperationWithContext};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Configuration for the operation index
#[derive(Debug, Clone)]
pub struct OperationIndexConfig {
    /// Identifies this process in log entries
    pub writer_id: String,
}

impl Default for OperationIndexConfig {
    fn default() -> Self {
        Self {
            writer_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Buffered mutations, validated and persisted atomically on commit
#[derive(Debug, Default)]
pub struct IndexTransaction {
    records: Vec<TxnRecord>,
}

#[derive(Debug)]
enum TxnRecord {
    CreateCollection {
        collection_id: String,
        name: String,
    },
    AddToCollection {
        collection_id: String,
        document_id: String,
    },
    RemoveFromCollection {
        collection_id: String,
        document_id: String,
    },
    Write(OperationWithContext),
}

impl IndexTransaction {
    pub fn create_collection(&mut self, collection_id: impl Into<String>, name: impl Into<String>) {
        self.records.push(TxnRecord::CreateCollection {
            collection_id: collection_id.into(),
            name: name.into(),
        });
    }

    pub fn add_to_collection(
        &mut self,
        collection_id: impl Into<String>,
        document_id: impl Into<String>,
    ) {
        self.records.push(TxnRecord::AddToCollection {
            collection_id: collection_id.into(),
            document_id: document_id.into(),
        });
    }

    pub fn remove_from_collection(
        &mut self,
        collection_id: impl Into<String>,
        document_id: impl Into<String>,
    ) {
        self.records.push(TxnRecord::RemoveFromCollection {
            collection_id: collection_id.into(),
            document_id: document_id.into(),
        });
    }

    /// Buffer operation entries for commit
    pub fn write(&mut self, entries: Vec<OperationWithContext>) {
        self.records.extend(entries.into_iter().map(TxnRecord::Write));
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Per-scope stream tips for one (document, branch)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamRevisions {
    /// Scope -> index of the last accepted operation
    pub tips: HashMap<String, u64>,
    pub latest_timestamp_ms: i64,
}

#[derive(Debug)]
struct Inner {
    writer: LogWriter,
    state: IndexState,
}

/// Durable operation index over an append-only checksummed log
#[derive(Debug)]
pub struct OperationIndex {
    dir: PathBuf,
    log_path: PathBuf,
    config: OperationIndexConfig,
    inner: Mutex<Inner>,
    /// Held for the index's lifetime; guards against a second writer
    _lock: File,
}

impl OperationIndex {
    /// Open the index at `dir`, replaying the log to rebuild state.
    ///
    /// Replay stops at the first corrupted entry without truncating;
    /// call [`OperationIndex::repair`] for explicit crash recovery.
    pub fn open(dir: &Path, config: OperationIndexConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;

        let lock_path = dir.join("index.lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StorageError::Locked { path: lock_path })?;

        let log_path = dir.join("index.jsonl");
        let mut state = IndexState::new();
        let reader = LogReader::open(&log_path);
        let mut iter = reader.entries()?;
        let mut replayed = 0u64;
        while let Some(entry_result) = iter.next() {
            match entry_result {
                Ok(entry) => {
                    state.apply(&entry);
                    replayed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        ?e,
                        "stopping index replay at corrupted entry; call repair() to truncate"
                    );
                    break;
                }
            }
        }
        tracing::debug!(replayed, dir = %dir.display(), "operation index opened");

        let writer = LogWriter::open(&log_path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            log_path,
            config,
            inner: Mutex::new(Inner { writer, state }),
            _lock: lock,
        })
    }

    /// Truncate the log at the first corruption point (explicit crash
    /// recovery, run before `open`). Returns bytes removed.
    pub fn repair(dir: &Path) -> Result<u64, StorageError> {
        log::repair(&dir.join("index.jsonl"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Begin buffering a transaction
    pub fn start(&self) -> IndexTransaction {
        IndexTransaction::default()
    }

    /// Validate, persist, and apply a transaction atomically.
    ///
    /// Returns the ordinals assigned to the written operation entries,
    /// in entry order. On any validation failure nothing is written.
    pub async fn commit(
        &self,
        txn: IndexTransaction,
        cancel: &CancellationToken,
    ) -> Result<Vec<u64>, StorageError> {
        bail_if_cancelled(cancel)?;

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Inner { writer, state } = &mut *inner;

        // Validation pass against current state plus earlier records of
        // this same transaction.
        let mut pending_tips: HashMap<StreamKey, (u64, u64)> = HashMap::new();
        let mut pending_collections: Vec<String> = Vec::new();
        for record in &txn.records {
            match record {
                TxnRecord::CreateCollection { collection_id, .. } => {
                    if state.collection_exists(collection_id)
                        || pending_collections.contains(collection_id)
                    {
                        return Err(StorageError::DuplicateCollection {
                            collection_id: collection_id.clone(),
                        });
                    }
                    pending_collections.push(collection_id.clone());
                }
                TxnRecord::AddToCollection { collection_id, .. }
                | TxnRecord::RemoveFromCollection { collection_id, .. } => {
                    if !state.collection_exists(collection_id)
                        && !pending_collections.contains(collection_id)
                    {
                        return Err(StorageError::CollectionNotFound {
                            collection_id: collection_id.clone(),
                        });
                    }
                }
                TxnRecord::Write(op) => {
                    let key = StreamKey::new(
                        op.context.document_id.clone(),
                        op.context.scope.clone(),
                        op.context.branch.clone(),
                    );
                    let tip = pending_tips
                        .get(&key)
                        .copied()
                        .or_else(|| state.tip(&key).map(|t| (t.index, t.skip)));
                    let next = op.operation.stream_position();
                    if !operation::follows(tip, next) {
                        return Err(StorageError::ConflictingIndex {
                            document_id: op.context.document_id.clone(),
                            scope: op.context.scope.clone(),
                            branch: op.context.branch.clone(),
                            index: next.0,
                            tip: tip.map(|(index, _)| index).unwrap_or(0),
                        });
                    }
                    pending_tips.insert(key, next);
                }
            }
        }

        // Assignment and append: one fsync for the whole batch.
        let timestamp_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        let mut next_ordinal = state.next_ordinal();
        let mut entries = Vec::with_capacity(txn.records.len());
        let mut assigned = Vec::new();
        for record in txn.records {
            let ordinal = next_ordinal;
            next_ordinal += 1;
            let index_record = match record {
                TxnRecord::CreateCollection {
                    collection_id,
                    name,
                } => IndexRecord::CollectionCreated {
                    collection_id,
                    name,
                },
                TxnRecord::AddToCollection {
                    collection_id,
                    document_id,
                } => IndexRecord::CollectionJoined {
                    collection_id,
                    document_id,
                },
                TxnRecord::RemoveFromCollection {
                    collection_id,
                    document_id,
                } => IndexRecord::CollectionLeft {
                    collection_id,
                    document_id,
                },
                TxnRecord::Write(mut op) => {
                    op.context.ordinal = ordinal;
                    assigned.push(ordinal);
                    IndexRecord::Operation(op)
                }
            };
            entries.push(IndexEntry::new(
                ordinal,
                timestamp_micros,
                &self.config.writer_id,
                index_record,
            ));
        }

        writer.append_batch(&entries)?;
        for entry in &entries {
            state.apply(entry);
        }

        Ok(assigned)
    }

    /// Paged operations for a collection's member documents past a
    /// cursor (exclusive). Membership is evaluated at each operation's
    /// own ordinal.
    pub async fn find(
        &self,
        collection_id: &str,
        cursor: Option<u64>,
        view_filter: Option<&ViewFilter>,
        paging: Paging,
        cancel: &CancellationToken,
    ) -> Result<Page<OperationWithContext>, StorageError> {
        bail_if_cancelled(cancel)?;

        // Snapshot membership under the lock, then scan without it.
        let membership = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner
                .state
                .collection(collection_id)
                .cloned()
                .ok_or_else(|| StorageError::CollectionNotFound {
                    collection_id: collection_id.to_string(),
                })?
        };

        let reader = LogReader::open(&self.log_path);
        let mut items = Vec::new();
        let mut next_cursor = None;
        for entry in reader.entries_after(cursor.unwrap_or(0))? {
            bail_if_cancelled(cancel)?;
            let Some(op) = entry.operation() else { continue };
            if !membership.is_member_at(&op.context.document_id, entry.ordinal) {
                continue;
            }
            if let Some(filter) = view_filter {
                if !filter.matches(op) {
                    continue;
                }
            }
            if items.len() == paging.limit {
                next_cursor = items.last().map(|op: &OperationWithContext| op.context.ordinal);
                break;
            }
            items.push(op.clone());
        }

        Ok(Page { items, next_cursor })
    }

    /// Globally ordered page of operations with `ordinal > ordinal`,
    /// for replication and read-model catch-up
    pub async fn get_since_ordinal(
        &self,
        ordinal: u64,
        paging: Paging,
        cancel: &CancellationToken,
    ) -> Result<Page<OperationWithContext>, StorageError> {
        bail_if_cancelled(cancel)?;

        let reader = LogReader::open(&self.log_path);
        let mut items = Vec::new();
        let mut next_cursor = None;
        for entry in reader.entries_after(ordinal)? {
            bail_if_cancelled(cancel)?;
            let Some(op) = entry.operation() else { continue };
            if items.len() == paging.limit {
                next_cursor = items.last().map(|op: &OperationWithContext| op.context.ordinal);
                break;
            }
            items.push(op.clone());
        }

        Ok(Page { items, next_cursor })
    }

    /// Latest operation timestamp among a collection's members
    /// (staleness queries)
    pub async fn get_latest_timestamp_for_collection(
        &self,
        collection_id: &str,
        cancel: &CancellationToken,
    ) -> Result<i64, StorageError> {
        bail_if_cancelled(cancel)?;
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .state
            .collection(collection_id)
            .map(|c| c.latest_timestamp_ms)
            .ok_or_else(|| StorageError::CollectionNotFound {
                collection_id: collection_id.to_string(),
            })
    }

    pub fn collection_exists(&self, collection_id: &str) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state.collection_exists(collection_id)
    }

    /// Batch-resolve current collection membership for documents
    pub async fn get_collections_for_documents(
        &self,
        document_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Vec<String>>, StorageError> {
        bail_if_cancelled(cancel)?;
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(document_ids
            .iter()
            .map(|id| (id.clone(), inner.state.collections_for(id)))
            .collect())
    }

    /// Per-scope stream tips for one (document, branch)
    pub async fn get_revisions(
        &self,
        document_id: &str,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<StreamRevisions, StorageError> {
        bail_if_cancelled(cancel)?;
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let (tips, latest_timestamp_ms) = inner.state.revisions(document_id, branch);
        Ok(StreamRevisions {
            tips,
            latest_timestamp_ms,
        })
    }

    /// Operations of one stream with `index` in `[from_index, to_index)`,
    /// superseded entries (same index, lower skip) dropped.
    ///
    /// `to_index = None` means "to the tip". Used by the write cache for
    /// replay.
    pub async fn get_stream_operations(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        from_index: u64,
        to_index: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<OperationWithContext>, StorageError> {
        bail_if_cancelled(cancel)?;

        let reader = LogReader::open(&self.log_path);
        // Last write wins per index: later log entries supersede earlier
        // ones at the same index (higher skip commits later).
        let mut by_index: Vec<OperationWithContext> = Vec::new();
        for entry in reader.entries_after(0)? {
            bail_if_cancelled(cancel)?;
            let Some(op) = entry.operation() else { continue };
            if op.context.document_id != document_id
                || op.context.scope != scope
                || op.context.branch != branch
            {
                continue;
            }
            let index = op.operation.index;
            if index < from_index || to_index.map(|to| index >= to).unwrap_or(false) {
                continue;
            }
            match by_index.iter().position(|o| o.operation.index == index) {
                Some(pos) => by_index[pos] = op.clone(),
                None => by_index.push(op.clone()),
            }
        }
        by_index.sort_by_key(|op| op.operation.index);
        Ok(by_index)
    }

    /// Whether a stream already contains an operation for `action_id`
    /// (inbound sync deduplication)
    pub async fn has_action(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        action_id: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StorageError> {
        let ops = self
            .get_stream_operations(document_id, scope, branch, 0, None, cancel)
            .await?;
        Ok(ops.iter().any(|op| op.operation.action.id == action_id))
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
