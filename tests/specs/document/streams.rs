//! Stream ordering specs
//!
//! Loaded operations must extend a stream contiguously; duplicates are
//! absorbed and conflicting history is rejected without touching the log.

use crate::prelude::*;
use keel_storage::Paging;

#[tokio::test]
async fn contiguous_loads_extend_the_stream() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let job = h
        .reactor
        .load(
            &document_id,
            Document::MAIN_BRANCH,
            vec![
                append_op(&document_id, "a", 0, 0),
                append_op(&document_id, "b", 1, 0),
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.reactor.wait_for_job(&job).await.status, JobStatus::Completed);

    let doc = h
        .reactor
        .get(&document_id, Some("body"), None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(doc.scope_state("body").unwrap()["text"], json!("ab"));
    h.reactor.kill().await;
}

#[tokio::test]
async fn operation_listings_honor_a_page_limit() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let job = h
        .reactor
        .load(
            &document_id,
            Document::MAIN_BRANCH,
            vec![
                append_op(&document_id, "a", 0, 0),
                append_op(&document_id, "b", 1, 0),
                append_op(&document_id, "c", 2, 0),
            ],
            None,
        )
        .await
        .unwrap();
    assert_eq!(h.reactor.wait_for_job(&job).await.status, JobStatus::Completed);

    let page = h
        .reactor
        .get_operations(
            &document_id,
            Some("body"),
            None,
            Some(Paging { limit: 2 }),
            &h.cancel,
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    let all = h
        .reactor
        .get_operations(&document_id, Some("body"), None, None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    h.reactor.kill().await;
}

#[tokio::test]
async fn redelivered_operations_are_absorbed_once() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let batch = vec![append_op(&document_id, "x", 0, 0)];
    let first = h
        .reactor
        .load(&document_id, Document::MAIN_BRANCH, batch.clone(), None)
        .await
        .unwrap();
    assert_eq!(h.reactor.wait_for_job(&first).await.status, JobStatus::Completed);

    let second = h
        .reactor
        .load(&document_id, Document::MAIN_BRANCH, batch, None)
        .await
        .unwrap();
    assert_eq!(
        h.reactor.wait_for_job(&second).await.status,
        JobStatus::Completed
    );

    let operations = h
        .reactor
        .get_operations(&document_id, Some("body"), None, None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(operations.len(), 1);
    h.reactor.kill().await;
}

#[tokio::test]
async fn a_gap_in_the_stream_is_rejected() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let job = h
        .reactor
        .load(
            &document_id,
            Document::MAIN_BRANCH,
            vec![append_op(&document_id, "skip-ahead", 5, 0)],
            None,
        )
        .await
        .unwrap();
    let job = h.reactor.wait_for_job(&job).await;
    assert_eq!(job.status, JobStatus::Failed);
    h.reactor.kill().await;
}

#[tokio::test]
async fn conflicting_history_leaves_the_log_untouched() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let job = h
        .reactor
        .load(
            &document_id,
            Document::MAIN_BRANCH,
            vec![
                append_op(&document_id, "a", 0, 0),
                append_op(&document_id, "b", 1, 0),
            ],
            None,
        )
        .await
        .unwrap();
    h.reactor.wait_for_job(&job).await;

    let before = h
        .reactor
        .get_operations(&document_id, Some("body"), None, None, &h.cancel)
        .await
        .unwrap();

    // Different content at an index the stream already holds.
    let job = h
        .reactor
        .load(
            &document_id,
            Document::MAIN_BRANCH,
            vec![append_op(&document_id, "rewrite", 1, 0)],
            None,
        )
        .await
        .unwrap();
    let job = h.reactor.wait_for_job(&job).await;
    assert_eq!(job.status, JobStatus::Failed);

    let after = h
        .reactor
        .get_operations(&document_id, Some("body"), None, None, &h.cancel)
        .await
        .unwrap();
    similar_asserts::assert_eq!(before, after);
    h.reactor.kill().await;
}
