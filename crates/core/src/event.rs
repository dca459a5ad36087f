// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reactor lifecycle events
//!
//! A closed enum with typed payloads; the `name()` strings are the
//! stable identifiers. `JobWriteReady` marks operations durably
//! committed; `JobReadReady` marks pre-ready read models caught up
//! (read-your-writes holds from that point).

use crate::error::ErrorInfo;
use crate::job::JobId;
use crate::operation::OperationWithContext;

/// Which event variants a subscriber wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JobPending,
    JobRunning,
    JobWriteReady,
    JobReadReady,
    JobFailed,
    QueueJobAvailable,
    OperationsWritten,
}

/// Payload for plain job lifecycle transitions
#[derive(Debug, Clone, PartialEq)]
pub struct JobEventPayload {
    pub job_id: JobId,
}

/// Payload carried by `JobWriteReady` and `JobReadReady`
#[derive(Debug, Clone, PartialEq)]
pub struct WriteReadyPayload {
    pub job_id: JobId,
    pub operations: Vec<OperationWithContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobFailedPayload {
    pub job_id: JobId,
    pub error: ErrorInfo,
}

/// A queue lane has work ready to dequeue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueJobAvailablePayload {
    pub document_id: String,
    pub scope: String,
    pub branch: String,
}

/// Operations were committed to the index (sync fan-out trigger)
#[derive(Debug, Clone, PartialEq)]
pub struct OperationsWrittenPayload {
    pub operations: Vec<OperationWithContext>,
}

/// Everything the reactor announces on its event bus
#[derive(Debug, Clone, PartialEq)]
pub enum ReactorEvent {
    JobPending(JobEventPayload),
    JobRunning(JobEventPayload),
    JobWriteReady(WriteReadyPayload),
    JobReadReady(WriteReadyPayload),
    JobFailed(JobFailedPayload),
    QueueJobAvailable(QueueJobAvailablePayload),
    OperationsWritten(OperationsWrittenPayload),
}

impl ReactorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ReactorEvent::JobPending(_) => EventKind::JobPending,
            ReactorEvent::JobRunning(_) => EventKind::JobRunning,
            ReactorEvent::JobWriteReady(_) => EventKind::JobWriteReady,
            ReactorEvent::JobReadReady(_) => EventKind::JobReadReady,
            ReactorEvent::JobFailed(_) => EventKind::JobFailed,
            ReactorEvent::QueueJobAvailable(_) => EventKind::QueueJobAvailable,
            ReactorEvent::OperationsWritten(_) => EventKind::OperationsWritten,
        }
    }

    /// Stable event name, `category:event`
    pub fn name(&self) -> &'static str {
        match self {
            ReactorEvent::JobPending(_) => "job:pending",
            ReactorEvent::JobRunning(_) => "job:running",
            ReactorEvent::JobWriteReady(_) => "job:write_ready",
            ReactorEvent::JobReadReady(_) => "job:read_ready",
            ReactorEvent::JobFailed(_) => "job:failed",
            ReactorEvent::QueueJobAvailable(_) => "queue:job_available",
            ReactorEvent::OperationsWritten(_) => "sync:operations_written",
        }
    }

    /// Job this event concerns, when it concerns one
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            ReactorEvent::JobPending(p) | ReactorEvent::JobRunning(p) => Some(&p.job_id),
            ReactorEvent::JobWriteReady(p) | ReactorEvent::JobReadReady(p) => Some(&p.job_id),
            ReactorEvent::JobFailed(p) => Some(&p.job_id),
            ReactorEvent::QueueJobAvailable(_) | ReactorEvent::OperationsWritten(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
