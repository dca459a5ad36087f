//! Document lifecycle specs
//!
//! Create, mutate, relate, delete, and survive a restart.

use crate::prelude::*;

#[tokio::test]
async fn created_documents_are_readable_by_id_and_slug() {
    let h = Harness::start().await;
    let document_id = h.create_note(Some("readme")).await;

    let doc = h
        .reactor
        .get(&document_id, None, None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(doc.header.document_type, "note");
    assert_eq!(doc.header.slug.as_deref(), Some("readme"));
    assert!(!doc.header.deleted);

    let by_slug = h.reactor.get_by_slug("readme", &h.cancel).await.unwrap();
    assert_eq!(by_slug.header.id, document_id);
    h.reactor.kill().await;
}

#[tokio::test]
async fn mutations_fold_through_the_registered_model() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let job = h
        .reactor
        .mutate(
            &document_id,
            "body",
            Document::MAIN_BRANCH,
            vec![append("one "), append("two")],
        )
        .await
        .unwrap();
    let job = h.reactor.wait_for_job(&job).await;
    assert_eq!(job.status, JobStatus::Completed);

    let doc = h
        .reactor
        .get(&document_id, Some("body"), None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(doc.scope_state("body").unwrap()["text"], json!("one two"));
    h.reactor.kill().await;
}

#[tokio::test]
async fn deleted_documents_refuse_further_mutations() {
    let h = Harness::start().await;
    let document_id = h.create_note(None).await;

    let delete = h.reactor.delete_document(&document_id).await.unwrap();
    let job = h.reactor.wait_for_job(&delete).await;
    assert_eq!(job.status, JobStatus::Completed);

    let doc = h
        .reactor
        .get(&document_id, None, None, &h.cancel)
        .await
        .unwrap();
    assert!(doc.header.deleted);

    let mutate = h
        .reactor
        .mutate(
            &document_id,
            "body",
            Document::MAIN_BRANCH,
            vec![append("late")],
        )
        .await
        .unwrap();
    let job = h.reactor.wait_for_job(&mutate).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().message.contains("deleted"));
    h.reactor.kill().await;
}

#[tokio::test]
async fn relationships_round_trip_through_the_parent_state() {
    let h = Harness::start().await;
    let parent = h.create_note(None).await;
    let child = h.create_note(None).await;

    let add = h.reactor.add_children(&parent, &[child.clone()]).await.unwrap();
    assert_eq!(h.reactor.wait_for_job(&add).await.status, JobStatus::Completed);

    let doc = h.reactor.get(&parent, None, None, &h.cancel).await.unwrap();
    assert_eq!(
        doc.scope_state(Document::DOCUMENT_SCOPE).unwrap()["children"],
        json!([child])
    );

    let remove = h
        .reactor
        .remove_children(&parent, &[child.clone()])
        .await
        .unwrap();
    assert_eq!(
        h.reactor.wait_for_job(&remove).await.status,
        JobStatus::Completed
    );

    let doc = h.reactor.get(&parent, None, None, &h.cancel).await.unwrap();
    assert_eq!(
        doc.scope_state(Document::DOCUMENT_SCOPE).unwrap()["children"],
        json!([])
    );
    h.reactor.kill().await;
}

#[tokio::test]
async fn state_survives_a_restart() {
    let mut h = Harness::start().await;
    let document_id = h.create_note(Some("durable")).await;
    let job = h
        .reactor
        .mutate(
            &document_id,
            "body",
            Document::MAIN_BRANCH,
            vec![append("kept")],
        )
        .await
        .unwrap();
    h.reactor.wait_for_job(&job).await;

    h.restart().await;

    let doc = h
        .reactor
        .get(&document_id, Some("body"), None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(doc.scope_state("body").unwrap()["text"], json!("kept"));
    let by_slug = h.reactor.get_by_slug("durable", &h.cancel).await.unwrap();
    assert_eq!(by_slug.header.id, document_id);
    h.reactor.kill().await;
}
