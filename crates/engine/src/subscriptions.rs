// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription notifications: lifecycle changes fanned out to a sink
//!
//! A post-ready read model. Creates and deletes are batched per
//! `index_operations` call; relationship changes fire per operation with
//! the parsed parent and child. Sink failures bubble to the coordinator,
//! which hands them to the subscription error handler.

use crate::coordinator::{ReadModel, ReadModelPhase};
use crate::lifecycle::{DeleteDocumentInput, RelationshipInput};
use async_trait::async_trait;
use keel_core::{ActionKind, CancellationToken, OperationWithContext, ReactorError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipChange {
    Added,
    Removed,
}

/// Receives document lifecycle notifications
#[async_trait]
pub trait SubscriptionSink: Send + Sync + 'static {
    async fn documents_created(&self, document_ids: &[String]) -> Result<(), ReactorError>;
    async fn documents_deleted(&self, document_ids: &[String]) -> Result<(), ReactorError>;
    async fn relationship_changed(
        &self,
        parent_id: &str,
        child_id: &str,
        change: RelationshipChange,
    ) -> Result<(), ReactorError>;
}

pub struct SubscriptionReadModel {
    sink: Arc<dyn SubscriptionSink>,
}

impl SubscriptionReadModel {
    pub fn new(sink: Arc<dyn SubscriptionSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ReadModel for SubscriptionReadModel {
    fn name(&self) -> &str {
        "subscriptions"
    }

    fn phase(&self) -> ReadModelPhase {
        ReadModelPhase::PostReady
    }

    async fn index_operations(
        &self,
        operations: &[OperationWithContext],
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        keel_core::bail_if_cancelled(cancel)?;

        let mut created: Vec<String> = Vec::new();
        let mut deleted: Vec<String> = Vec::new();

        for op in operations {
            let action = &op.operation.action;
            match ActionKind::parse(&action.kind) {
                ActionKind::CreateDocument => {
                    created.push(op.context.document_id.clone());
                }
                ActionKind::DeleteDocument => {
                    // The action may target another document; default to
                    // the operation's own.
                    let target = serde_json::from_value::<DeleteDocumentInput>(
                        action.input.clone(),
                    )
                    .ok()
                    .and_then(|input| input.document_id)
                    .unwrap_or_else(|| op.context.document_id.clone());
                    deleted.push(target);
                }
                ActionKind::AddRelationship | ActionKind::RemoveRelationship => {
                    let input: RelationshipInput = serde_json::from_value(action.input.clone())
                        .map_err(|e| {
                            ReactorError::Internal(format!(
                                "malformed relationship input on {}: {e}",
                                action.id
                            ))
                        })?;
                    let change = if ActionKind::parse(&action.kind) == ActionKind::AddRelationship
                    {
                        RelationshipChange::Added
                    } else {
                        RelationshipChange::Removed
                    };
                    self.sink
                        .relationship_changed(&input.parent_id, &input.child_id, change)
                        .await?;
                }
                _ => {}
            }
        }

        if !created.is_empty() {
            self.sink.documents_created(&created).await?;
        }
        if !deleted.is_empty() {
            self.sink.documents_deleted(&deleted).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "subscriptions_tests.rs"]
mod tests;
