// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs: tracked units of mutation against a document stream
//!
//! A job moves Pending -> Running -> Completed | Failed. Completion
//! carries a consistency token (the max ordinal the job wrote) so a
//! caller holding the token knows its writes are visible to reads.

use crate::error::ErrorInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a tracked job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

/// Opaque marker proving a job's writes are visible to reads.
///
/// The value is the maximum ordinal written by the job; 0 means the job
/// wrote nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConsistencyToken(pub u64);

impl ConsistencyToken {
    pub const NONE: ConsistencyToken = ConsistencyToken(0);
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Tracked record of a job's progress and outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at_utc: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_utc: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_token: Option<ConsistencyToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Job {
    pub fn pending(id: JobId, created_at_utc: DateTime<Utc>) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            created_at_utc,
            completed_at_utc: None,
            consistency_token: None,
            result: None,
            error: None,
        }
    }

    pub fn running(mut self) -> Self {
        self.status = JobStatus::Running;
        self
    }

    pub fn completed(
        mut self,
        token: ConsistencyToken,
        result: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Self {
        self.status = JobStatus::Completed;
        self.consistency_token = Some(token);
        self.result = result;
        self.completed_at_utc = Some(at);
        self
    }

    pub fn failed(mut self, error: ErrorInfo, at: DateTime<Utc>) -> Self {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at_utc = Some(at);
        self
    }
}

/// What a queued job will do when executed
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Apply new actions submitted by a local caller
    Mutate { actions: Vec<crate::operation::Action> },
    /// Inject already-formed operations received from a remote
    Load {
        operations: Vec<crate::operation::OperationWithContext>,
        source_remote: Option<String>,
    },
}

/// A job as it sits in the queue, before execution
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: JobId,
    pub document_id: String,
    pub document_type: String,
    pub scope: String,
    pub branch: String,
    pub kind: JobKind,
    /// Jobs that must complete before this one may run
    pub depends_on: Vec<JobId>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub queued_at_utc: DateTime<Utc>,
}

impl JobRequest {
    /// Stream key `document:scope:branch` identifying the queue lane
    pub fn stream_key(&self) -> String {
        format!("{}:{}:{}", self.document_id, self.scope, self.branch)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
