// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync operations: log entries wrapped for transport between reactors
//!
//! Status moves forward only: Unknown < TransportPending <
//! ExecutionPending < Applied. Error is terminal and sticky. Backward or
//! same-status transitions are silently ignored; forward skips are
//! allowed (a remote may acknowledge application without an explicit
//! transport step).

use crate::error::ErrorInfo;
use crate::job::JobId;
use crate::operation::OperationWithContext;
use serde::{Deserialize, Serialize};

/// Transport lifecycle of a [`SyncOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperationStatus {
    Unknown,
    TransportPending,
    ExecutionPending,
    Applied,
    Error,
}

impl SyncOperationStatus {
    fn rank(&self) -> u8 {
        match self {
            SyncOperationStatus::Unknown => 0,
            SyncOperationStatus::TransportPending => 1,
            SyncOperationStatus::ExecutionPending => 2,
            SyncOperationStatus::Applied => 3,
            SyncOperationStatus::Error => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncOperationStatus::Applied | SyncOperationStatus::Error
        )
    }

    /// Whether a transition to `next` is accepted
    pub fn allows(&self, next: SyncOperationStatus) -> bool {
        if *self == SyncOperationStatus::Error {
            return false;
        }
        next.rank() > self.rank()
    }
}

/// A batch of operations for one (document, branch) traveling through a
/// channel's mailboxes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub document_id: String,
    pub branch: String,
    pub scopes: Vec<String>,
    /// Ids of sync operations that must apply before this one
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub operations: Vec<OperationWithContext>,
    pub status: SyncOperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl SyncOperation {
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        branch: impl Into<String>,
        operations: Vec<OperationWithContext>,
    ) -> Self {
        let mut scopes: Vec<String> = operations
            .iter()
            .map(|op| op.context.scope.clone())
            .collect();
        scopes.sort();
        scopes.dedup();
        Self {
            id: id.into(),
            job_id: None,
            document_id: document_id.into(),
            branch: branch.into(),
            scopes,
            dependencies: Vec::new(),
            operations,
            status: SyncOperationStatus::Unknown,
            error: None,
        }
    }

    pub fn with_status(mut self, status: SyncOperationStatus) -> Self {
        self.status = status;
        self
    }

    /// Attempt a transition; ignored unless strictly forward
    pub fn transition(&mut self, next: SyncOperationStatus) -> bool {
        if self.status.allows(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Handed to the transport layer
    pub fn transported(&mut self) -> bool {
        self.transition(SyncOperationStatus::ExecutionPending)
    }

    /// Applied or acknowledged by the peer
    pub fn executed(&mut self) -> bool {
        self.transition(SyncOperationStatus::Applied)
    }

    /// Permanently failed; carries the error for dead-letter inspection
    pub fn failed(&mut self, error: ErrorInfo) -> bool {
        if self.transition(SyncOperationStatus::Error) {
            self.error = Some(error);
            true
        } else {
            false
        }
    }

    /// Greatest ordinal among the contained operations (0 when empty or
    /// unassigned)
    pub fn max_ordinal(&self) -> u64 {
        self.operations
            .iter()
            .map(|op| op.context.ordinal)
            .max()
            .unwrap_or(0)
    }
}

/// Wire format exchanged with remote reactors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEnvelope {
    Operations {
        operations: Vec<OperationWithContext>,
    },
}

impl SyncEnvelope {
    pub fn operations(operations: Vec<OperationWithContext>) -> Self {
        SyncEnvelope::Operations { operations }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
