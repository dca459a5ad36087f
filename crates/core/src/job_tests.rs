// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn job() -> Job {
    Job::pending(JobId::from("job-1"), Utc::now())
}

#[test]
fn pending_job_has_no_outcome() {
    let j = job();
    assert_eq!(j.status, JobStatus::Pending);
    assert!(j.consistency_token.is_none());
    assert!(j.result.is_none());
    assert!(j.error.is_none());
    assert!(j.completed_at_utc.is_none());
}

#[test]
fn completed_job_carries_token_and_timestamp() {
    let at = Utc::now();
    let j = job()
        .running()
        .completed(ConsistencyToken(42), Some(serde_json::json!({"ok": true})), at);
    assert_eq!(j.status, JobStatus::Completed);
    assert_eq!(j.consistency_token, Some(ConsistencyToken(42)));
    assert_eq!(j.completed_at_utc, Some(at));
}

#[test]
fn failed_job_carries_error() {
    let j = job().running().failed(ErrorInfo::new("boom"), Utc::now());
    assert_eq!(j.status, JobStatus::Failed);
    assert_eq!(j.error.unwrap().message, "boom");
    assert!(j.consistency_token.is_none());
}

#[parameterized(
    pending = { JobStatus::Pending, false },
    running = { JobStatus::Running, false },
    completed = { JobStatus::Completed, true },
    failed = { JobStatus::Failed, true },
)]
fn terminal_statuses(status: JobStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn consistency_tokens_order_by_ordinal() {
    assert!(ConsistencyToken(7) > ConsistencyToken(3));
    assert_eq!(ConsistencyToken::NONE, ConsistencyToken(0));
}

#[test]
fn status_serializes_screaming_snake() {
    let json = serde_json::to_string(&JobStatus::Completed).unwrap();
    assert_eq!(json, "\"COMPLETED\"");
}

#[test]
fn request_stream_key_joins_coordinates() {
    let req = JobRequest {
        id: JobId::from("job-1"),
        document_id: "doc-1".to_string(),
        document_type: "budget".to_string(),
        scope: "global".to_string(),
        branch: "main".to_string(),
        kind: JobKind::Mutate { actions: vec![] },
        depends_on: vec![],
        retry_count: 0,
        max_retries: 3,
        queued_at_utc: Utc::now(),
    };
    assert_eq!(req.stream_key(), "doc-1:global:main");
}
