//! Job pipeline specs
//!
//! A committed write announces itself in a fixed order: operations
//! land in the index, write-ready fires once pre-ready models caught
//! up, and subscribers hear about the document only after read-ready.

use crate::prelude::*;
use async_trait::async_trait;
use keel_core::handler;
use keel_engine::{RelationshipChange, SubscriptionSink};

/// Records notifications interleaved with bus events into one log
struct RecordingSink {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SubscriptionSink for RecordingSink {
    async fn documents_created(&self, document_ids: &[String]) -> Result<(), ReactorError> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        for id in document_ids {
            log.push(format!("created {id}"));
        }
        Ok(())
    }

    async fn documents_deleted(&self, document_ids: &[String]) -> Result<(), ReactorError> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        for id in document_ids {
            log.push(format!("deleted {id}"));
        }
        Ok(())
    }

    async fn relationship_changed(
        &self,
        parent_id: &str,
        child_id: &str,
        change: RelationshipChange,
    ) -> Result<(), ReactorError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{change:?} {parent_id}/{child_id}"));
        Ok(())
    }
}

#[tokio::test]
async fn create_announces_write_ready_before_subscribers_hear_created() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let h = Harness::start_with(|builder| {
        builder.with_subscription_sink(Arc::new(RecordingSink { log: Arc::clone(&log) }))
    })
    .await;

    let ops_seen: Arc<Mutex<Vec<usize>>> = Arc::default();
    {
        let log = Arc::clone(&log);
        let ops_seen = Arc::clone(&ops_seen);
        h.reactor.bus().subscribe(
            &[
                EventKind::OperationsWritten,
                EventKind::JobWriteReady,
                EventKind::JobReadReady,
            ],
            handler(move |event: ReactorEvent| {
                let log = Arc::clone(&log);
                let ops_seen = Arc::clone(&ops_seen);
                async move {
                    if let ReactorEvent::JobWriteReady(payload) = &event {
                        ops_seen
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(payload.operations.len());
                    }
                    log.lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(event.name().to_string());
                    Ok(())
                }
            }),
        );
    }

    let document_id = h.create_note(None).await;

    let entries = log.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let position = |needle: &str| {
        entries
            .iter()
            .position(|entry| entry == needle)
            .unwrap_or_else(|| panic!("missing {needle:?} in {entries:?}"))
    };
    let created = position(&format!("created {document_id}"));
    assert!(position("sync:operations_written") < position("job:write_ready"));
    assert!(position("job:write_ready") < created);
    assert!(position("job:read_ready") < created);

    // One operation per create: the genesis action.
    assert_eq!(
        ops_seen.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        vec![1]
    );
    h.reactor.kill().await;
}

#[tokio::test]
async fn deletes_and_relationships_notify_subscribers() {
    let log: Arc<Mutex<Vec<String>>> = Arc::default();
    let h = Harness::start_with(|builder| {
        builder.with_subscription_sink(Arc::new(RecordingSink { log: Arc::clone(&log) }))
    })
    .await;

    let parent = h.create_note(None).await;
    let child = h.create_note(None).await;

    let add = h.reactor.add_children(&parent, &[child.clone()]).await.unwrap();
    h.reactor.wait_for_job(&add).await;
    let delete = h.reactor.delete_document(&child).await.unwrap();
    h.reactor.wait_for_job(&delete).await;

    let entries = log.lock().unwrap_or_else(|e| e.into_inner()).clone();
    assert!(entries.contains(&format!("created {parent}")));
    assert!(entries.contains(&format!("Added {parent}/{child}")));
    assert!(entries.contains(&format!("deleted {child}")));
    h.reactor.kill().await;
}

#[tokio::test]
async fn writes_to_one_document_apply_in_submission_order() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let mut last = None;
    for piece in ["1", "2", "3", "4", "5"] {
        last = Some(
            h.reactor
                .mutate(
                    &document_id,
                    "body",
                    Document::MAIN_BRANCH,
                    vec![append(piece)],
                )
                .await
                .unwrap(),
        );
    }
    let job = h.reactor.wait_for_job(&last.unwrap()).await;
    assert_eq!(job.status, JobStatus::Completed);

    let doc = h
        .reactor
        .get(&document_id, Some("body"), None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(doc.scope_state("body").unwrap()["text"], json!("12345"));
    h.reactor.kill().await;
}

#[tokio::test]
async fn a_failed_job_reports_its_error_and_later_jobs_still_run() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    {
        let seen = Arc::clone(&seen);
        h.reactor.bus().subscribe(
            &[EventKind::JobRunning, EventKind::JobFailed],
            handler(move |event: ReactorEvent| {
                let seen = Arc::clone(&seen);
                async move {
                    let entry = match &event {
                        ReactorEvent::JobFailed(payload) => {
                            format!("{} {}", event.name(), payload.error.message)
                        }
                        _ => event.name().to_string(),
                    };
                    seen.lock().unwrap_or_else(|e| e.into_inner()).push(entry);
                    Ok(())
                }
            }),
        );
    }

    let bad = Action::new(
        "spec-bad-action",
        "NOT_A_THING",
        "body",
        chrono::Utc::now().timestamp_millis(),
        json!({}),
    );
    let failing = h
        .reactor
        .mutate(&document_id, "body", Document::MAIN_BRANCH, vec![bad])
        .await
        .unwrap();
    let failed = h.reactor.wait_for_job(&failing).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().message.contains("NOT_A_THING"));

    // The bus announces the start and the terminal failure, error included.
    wait_until(|| {
        let entries = seen.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains(&"job:running".to_string())
            && entries
                .iter()
                .any(|e| e.starts_with("job:failed") && e.contains("NOT_A_THING"))
    })
    .await;

    let ok = h
        .reactor
        .mutate(
            &document_id,
            "body",
            Document::MAIN_BRANCH,
            vec![append("after")],
        )
        .await
        .unwrap();
    assert_eq!(h.reactor.wait_for_job(&ok).await.status, JobStatus::Completed);
    h.reactor.kill().await;
}
