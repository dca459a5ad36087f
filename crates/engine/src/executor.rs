// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job executor: turns one queued job into committed operations
//!
//! The order of checks is fixed: signatures first, then per-action
//! validation and state application, then one index transaction. Nothing
//! reaches the cache or the bus until the commit has fsynced, so a
//! failed job leaves no trace.

use crate::cache::WriteCache;
use crate::lifecycle::{self, CreateDocumentInput, DOCUMENT_SCOPE};
use crate::resolver::ModelResolver;
use crate::verifier::SignatureVerifier;
use keel_core::{
    bail_if_cancelled, Action, ActionKind, CancellationToken, ConsistencyToken, Document,
    EventBus, JobKind, JobRequest, Operation, OperationContext, OperationWithContext,
    OperationsWrittenPayload, ReactorError, ReactorEvent, WriteReadyPayload,
};
use keel_storage::{OperationIndex, StorageError};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// What a successfully executed job produced
#[derive(Debug)]
pub struct ExecutionOutcome {
    /// Max ordinal written; `ConsistencyToken::NONE` when the job was a
    /// no-op (every operation already applied)
    pub consistency_token: ConsistencyToken,
    pub operations: Vec<OperationWithContext>,
}

/// Executes jobs against the index, cache, and event bus
pub struct JobExecutor {
    index: Arc<OperationIndex>,
    cache: Arc<WriteCache>,
    resolver: Arc<ModelResolver>,
    verifier: Arc<SignatureVerifier>,
    bus: EventBus,
}

impl JobExecutor {
    pub fn new(
        index: Arc<OperationIndex>,
        cache: Arc<WriteCache>,
        resolver: Arc<ModelResolver>,
        verifier: Arc<SignatureVerifier>,
        bus: EventBus,
    ) -> Self {
        Self {
            index,
            cache,
            resolver,
            verifier,
            bus,
        }
    }

    pub async fn execute(
        &self,
        job: &JobRequest,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ReactorError> {
        bail_if_cancelled(cancel)?;
        match &job.kind {
            JobKind::Mutate { actions } => self.execute_mutate(job, actions, cancel).await,
            JobKind::Load {
                operations,
                source_remote,
            } => {
                self.execute_load(job, operations, source_remote.as_deref(), cancel)
                    .await
            }
        }
    }

    async fn execute_mutate(
        &self,
        job: &JobRequest,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ReactorError> {
        if actions.is_empty() {
            return Err(ReactorError::Internal(format!(
                "job {} carries no actions",
                job.id
            )));
        }
        self.verifier
            .verify_actions(&job.document_id, &job.branch, actions, cancel)
            .await?;
        self.resolver
            .ensure_model_loaded(&job.document_type)
            .await?;

        let revisions = self
            .index
            .get_revisions(&job.document_id, &job.branch, cancel)
            .await
            .map_err(ReactorError::storage)?;

        let mut operations: Vec<OperationWithContext> = Vec::with_capacity(actions.len());
        let mut collection_joins: Vec<String> = Vec::new();
        let mut remaining = actions;

        let mut document = if revisions.tips.is_empty() {
            let first = &actions[0];
            if ActionKind::parse(&first.kind) != ActionKind::CreateDocument {
                return Err(ReactorError::CreateDocumentRequired {
                    document_id: job.document_id.clone(),
                });
            }
            let input: CreateDocumentInput = serde_json::from_value(first.input.clone())
                .map_err(|e| {
                    ReactorError::Internal(format!("malformed CREATE_DOCUMENT input: {e}"))
                })?;
            if let Some(collection_id) = input.collection_id {
                collection_joins.push(collection_id);
            }
            let document = lifecycle::genesis(&job.document_id, first)?;
            operations.push(self.with_context(
                job,
                DOCUMENT_SCOPE,
                &document,
                Operation::from_action(first.clone(), 0, 0),
            ));
            remaining = &actions[1..];
            document
        } else {
            self.cache
                .get_state(&job.document_id, &job.scope, &job.branch, None, cancel)
                .await?
        };

        let registry = self.resolver.registry();
        for action in remaining {
            bail_if_cancelled(cancel)?;
            let kind = ActionKind::parse(&action.kind);
            if kind == ActionKind::Custom {
                if document.header.deleted {
                    return Err(ReactorError::DocumentDeleted {
                        document_id: job.document_id.clone(),
                        deleted_at_utc_ms: Some(
                            document.header.last_modified_at_utc.timestamp_millis(),
                        ),
                    });
                }
                let index = document.revision(&job.scope);
                let operation = Operation::from_action(action.clone(), index, 0);
                let model = registry.get_module(&document.header.document_type)?;
                lifecycle::apply_scope_action(&mut document, &job.scope, action, &model)?;
                operations.push(self.with_context(job, &job.scope, &document, operation));
            } else {
                let index = document.revision(DOCUMENT_SCOPE);
                let operation = Operation::from_action(action.clone(), index, 0);
                lifecycle::apply_document_action(&mut document, action, registry)?;
                operations.push(self.with_context(job, DOCUMENT_SCOPE, &document, operation));
            }
        }

        let mut txn = self.index.start();
        for collection_id in &collection_joins {
            if !self.index.collection_exists(collection_id) {
                txn.create_collection(collection_id.clone(), collection_id.clone());
            }
            txn.add_to_collection(collection_id.clone(), job.document_id.clone());
        }
        txn.write(operations.clone());
        let ordinals = self
            .index
            .commit(txn, cancel)
            .await
            .map_err(map_commit_error)?;
        for (op, ordinal) in operations.iter_mut().zip(&ordinals) {
            op.context.ordinal = *ordinal;
        }

        // Committed states flow back into the cache; a failure before
        // this point left both untouched.
        let touched: BTreeSet<&str> = operations
            .iter()
            .map(|op| op.context.scope.as_str())
            .collect();
        for scope in touched {
            self.cache
                .put_state(&job.document_id, scope, &job.branch, &document, cancel)
                .await?;
        }

        let token = ordinals.iter().max().copied().unwrap_or(0);
        self.announce(job, operations.clone()).await?;
        Ok(ExecutionOutcome {
            consistency_token: ConsistencyToken(token),
            operations,
        })
    }

    /// Apply already-formed operations received from a remote.
    ///
    /// Operations whose action id is already in the stream are dropped
    /// (a replayed envelope is a no-op). The rest must extend or
    /// supersede the tip; anything else is a conflict the channel dead
    /// letters.
    async fn execute_load(
        &self,
        job: &JobRequest,
        operations: &[OperationWithContext],
        source_remote: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ReactorError> {
        self.verifier.verify_operations(operations, cancel).await?;
        self.resolver
            .ensure_model_loaded(&job.document_type)
            .await?;

        let mut fresh: Vec<OperationWithContext> = Vec::new();
        for op in operations {
            let applied = self
                .index
                .has_action(
                    &op.context.document_id,
                    &op.context.scope,
                    &op.context.branch,
                    &op.operation.action.id,
                    cancel,
                )
                .await
                .map_err(ReactorError::storage)?;
            if applied {
                continue;
            }
            let mut op = op.clone();
            op.context.ordinal = 0;
            op.context.source_remote = source_remote.unwrap_or_default().to_string();
            fresh.push(op);
        }
        if fresh.is_empty() {
            return Ok(ExecutionOutcome {
                consistency_token: ConsistencyToken::NONE,
                operations: Vec::new(),
            });
        }

        let revisions = self
            .index
            .get_revisions(&job.document_id, &job.branch, cancel)
            .await
            .map_err(ReactorError::storage)?;
        let mut pending: HashMap<String, (u64, u64)> = HashMap::new();
        for op in &fresh {
            let scope = op.context.scope.clone();
            // The tip's skip is unknown here; the commit re-validates
            // against the true tip, this pass only shapes the error.
            let tip = pending
                .get(&scope)
                .copied()
                .or_else(|| revisions.tips.get(&scope).map(|index| (*index, 0)));
            let next = op.operation.stream_position();
            if !keel_core::operation::follows(tip, next) {
                return Err(ReactorError::ConflictingIndex {
                    document_id: op.context.document_id.clone(),
                    scope,
                    branch: op.context.branch.clone(),
                    index: next.0,
                    tip: tip.map(|(index, _)| index).unwrap_or(0),
                });
            }
            pending.insert(scope, next);
        }

        let mut txn = self.index.start();
        txn.write(fresh.clone());
        let ordinals = self
            .index
            .commit(txn, cancel)
            .await
            .map_err(map_commit_error)?;
        for (op, ordinal) in fresh.iter_mut().zip(&ordinals) {
            op.context.ordinal = *ordinal;
        }

        // Loaded streams may have been superseded mid-history; drop any
        // cached state and let the next read rebuild.
        for op in &fresh {
            self.cache.invalidate(
                &op.context.document_id,
                Some(&op.context.scope),
                Some(&op.context.branch),
            );
        }

        let token = ordinals.iter().max().copied().unwrap_or(0);
        self.announce(job, fresh.clone()).await?;
        Ok(ExecutionOutcome {
            consistency_token: ConsistencyToken(token),
            operations: fresh,
        })
    }

    fn with_context(
        &self,
        job: &JobRequest,
        scope: &str,
        document: &Document,
        operation: Operation,
    ) -> OperationWithContext {
        OperationWithContext {
            operation,
            context: OperationContext {
                document_id: job.document_id.clone(),
                document_type: document.header.document_type.clone(),
                scope: scope.to_string(),
                branch: job.branch.clone(),
                ordinal: 0,
                source_remote: String::new(),
            },
        }
    }

    /// Announce the committed write; a pre-ready read-model failure
    /// comes back as an aggregate error and fails the job even though
    /// the operations are durable.
    async fn announce(
        &self,
        job: &JobRequest,
        operations: Vec<OperationWithContext>,
    ) -> Result<(), ReactorError> {
        // Sync fan-out must see the write whether or not a read model
        // chokes on it; subscriber failures here only get logged.
        if let Err(err) = self
            .bus
            .emit(ReactorEvent::OperationsWritten(OperationsWrittenPayload {
                operations: operations.clone(),
            }))
            .await
        {
            tracing::warn!(job_id = %job.id, error = %err, "operations-written subscriber failed");
        }
        self.bus
            .emit(ReactorEvent::JobWriteReady(WriteReadyPayload {
                job_id: job.id.clone(),
                operations,
            }))
            .await?;
        Ok(())
    }
}

fn map_commit_error(err: StorageError) -> ReactorError {
    match err {
        StorageError::ConflictingIndex {
            document_id,
            scope,
            branch,
            index,
            tip,
        } => ReactorError::ConflictingIndex {
            document_id,
            scope,
            branch,
            index,
            tip,
        },
        StorageError::Cancelled(e) => ReactorError::Cancelled(e),
        other => ReactorError::storage(other),
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
