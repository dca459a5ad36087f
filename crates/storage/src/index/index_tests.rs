// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::{Action, Operation, OperationContext};
use tempfile::TempDir;

fn op(document_id: &str, scope: &str, index: u64, skip: u64) -> OperationWithContext {
    let action = Action::new(
        format!("act-{document_id}-{scope}-{index}-{skip}"),
        "SET",
        scope,
        1_000 + index as i64,
        serde_json::json!({ "index": index }),
    );
    OperationWithContext {
        operation: Operation::from_action(action, index, skip),
        context: OperationContext {
            document_id: document_id.to_string(),
            document_type: "counter".to_string(),
            scope: scope.to_string(),
            branch: "main".to_string(),
            ordinal: 0,
            source_remote: String::new(),
        },
    }
}

fn open(dir: &TempDir) -> OperationIndex {
    OperationIndex::open(
        dir.path(),
        OperationIndexConfig {
            writer_id: "test-writer".to_string(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn commit_assigns_consecutive_ordinals() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 0), op("doc-1", "body", 1, 0)]);
    let ordinals = index.commit(txn, &cancel).await.unwrap();
    assert_eq!(ordinals, vec![1, 2]);

    let mut txn = index.start();
    txn.write(vec![op("doc-2", "body", 0, 0)]);
    let ordinals = index.commit(txn, &cancel).await.unwrap();
    assert_eq!(ordinals, vec![3]);

    let page = index
        .get_since_ordinal(0, Paging::default(), &cancel)
        .await
        .unwrap();
    let got: Vec<u64> = page.items.iter().map(|o| o.context.ordinal).collect();
    assert_eq!(got, vec![1, 2, 3]);
}

#[tokio::test]
async fn conflicting_index_aborts_whole_transaction() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    // Valid op for doc-2 plus a below-tip op for doc-1 in one txn.
    let mut txn = index.start();
    txn.write(vec![op("doc-2", "body", 0, 0), op("doc-1", "body", 0, 0)]);
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::ConflictingIndex { index: 0, tip: 0, .. }
    ));

    // Nothing from the failed transaction reached the log.
    let page = index
        .get_since_ordinal(0, Paging::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].context.document_id, "doc-1");
}

#[tokio::test]
async fn gap_in_stream_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 5, 0)]);
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::ConflictingIndex { .. }));
}

#[tokio::test]
async fn supersession_at_same_index_is_accepted() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 1)]);
    index.commit(txn, &cancel).await.unwrap();

    // Replay keeps only the superseding write.
    let ops = index
        .get_stream_operations("doc-1", "body", "main", 0, None, &cancel)
        .await
        .unwrap();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].operation.skip, 1);
}

#[tokio::test]
async fn transaction_validates_against_its_own_earlier_writes() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    // Consecutive indices within one txn are fine.
    let mut txn = index.start();
    txn.write(vec![
        op("doc-1", "body", 0, 0),
        op("doc-1", "body", 1, 0),
        op("doc-1", "body", 2, 0),
    ]);
    index.commit(txn, &cancel).await.unwrap();

    // A repeat of an index already buffered in the txn conflicts.
    let mut txn = index.start();
    txn.write(vec![op("doc-2", "body", 0, 0), op("doc-2", "body", 0, 0)]);
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::ConflictingIndex { .. }));
}

#[tokio::test]
async fn duplicate_collection_is_rejected() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.create_collection("col-1", "inbox");
    index.commit(txn, &cancel).await.unwrap();

    let mut txn = index.start();
    txn.create_collection("col-1", "inbox again");
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateCollection { .. }));

    let mut txn = index.start();
    txn.create_collection("col-2", "a");
    txn.create_collection("col-2", "b");
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::DuplicateCollection { .. }));
}

#[tokio::test]
async fn membership_changes_require_existing_collection() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.add_to_collection("missing", "doc-1");
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::CollectionNotFound { .. }));

    // Created earlier in the same transaction counts.
    let mut txn = index.start();
    txn.create_collection("col-1", "inbox");
    txn.add_to_collection("col-1", "doc-1");
    index.commit(txn, &cancel).await.unwrap();
}

#[tokio::test]
async fn find_respects_membership_at_operation_ordinal() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    // doc-1 writes before joining the collection are not visible.
    let mut txn = index.start();
    txn.create_collection("col-1", "inbox");
    txn.write(vec![op("doc-1", "body", 0, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    let mut txn = index.start();
    txn.add_to_collection("col-1", "doc-1");
    txn.write(vec![op("doc-1", "body", 1, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    let page = index
        .find("col-1", None, None, Paging::default(), &cancel)
        .await
        .unwrap();
    let indices: Vec<u64> = page.items.iter().map(|o| o.operation.index).collect();
    assert_eq!(indices, vec![1]);

    // After leaving, later writes drop out again.
    let mut txn = index.start();
    txn.remove_from_collection("col-1", "doc-1");
    txn.write(vec![op("doc-1", "body", 2, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    let page = index
        .find("col-1", None, None, Paging::default(), &cancel)
        .await
        .unwrap();
    let indices: Vec<u64> = page.items.iter().map(|o| o.operation.index).collect();
    assert_eq!(indices, vec![1]);
}

#[tokio::test]
async fn find_pages_with_cursor() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.create_collection("col-1", "inbox");
    txn.add_to_collection("col-1", "doc-1");
    txn.write((0..5).map(|i| op("doc-1", "body", i, 0)).collect());
    index.commit(txn, &cancel).await.unwrap();

    let first = index
        .find("col-1", None, None, Paging::limit(2), &cancel)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    let cursor = first.next_cursor.unwrap();

    let second = index
        .find("col-1", Some(cursor), None, Paging::limit(10), &cancel)
        .await
        .unwrap();
    assert_eq!(second.items.len(), 3);
    assert!(second.next_cursor.is_none());

    let indices: Vec<u64> = first
        .items
        .iter()
        .chain(second.items.iter())
        .map(|o| o.operation.index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn find_applies_view_filter() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.create_collection("col-1", "inbox");
    txn.add_to_collection("col-1", "doc-1");
    txn.write(vec![op("doc-1", "body", 0, 0), op("doc-1", "meta", 0, 0)]);
    index.commit(txn, &cancel).await.unwrap();

    let filter = ViewFilter {
        scopes: Some(vec!["meta".to_string()]),
        ..ViewFilter::default()
    };
    let page = index
        .find("col-1", None, Some(&filter), Paging::default(), &cancel)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].context.scope, "meta");
}

#[tokio::test]
async fn find_unknown_collection_errors() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let err = index
        .find("missing", None, None, Paging::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::CollectionNotFound { .. }));
}

#[tokio::test]
async fn get_revisions_reports_per_scope_tips() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.write(vec![
        op("doc-1", "body", 0, 0),
        op("doc-1", "body", 1, 0),
        op("doc-1", "meta", 0, 0),
        op("doc-2", "body", 0, 0),
    ]);
    index.commit(txn, &cancel).await.unwrap();

    let revisions = index.get_revisions("doc-1", "main", &cancel).await.unwrap();
    assert_eq!(revisions.tips.get("body"), Some(&1));
    assert_eq!(revisions.tips.get("meta"), Some(&0));
    assert_eq!(revisions.tips.len(), 2);

    let empty = index.get_revisions("doc-9", "main", &cancel).await.unwrap();
    assert!(empty.tips.is_empty());
}

#[tokio::test]
async fn get_collections_for_documents_reflects_current_membership() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let mut txn = index.start();
    txn.create_collection("col-1", "inbox");
    txn.create_collection("col-2", "archive");
    txn.add_to_collection("col-1", "doc-1");
    txn.add_to_collection("col-2", "doc-1");
    txn.add_to_collection("col-1", "doc-2");
    txn.remove_from_collection("col-1", "doc-2");
    index.commit(txn, &cancel).await.unwrap();

    let map = index
        .get_collections_for_documents(
            &["doc-1".to_string(), "doc-2".to_string()],
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(
        map.get("doc-1"),
        Some(&vec!["col-1".to_string(), "col-2".to_string()])
    );
    assert_eq!(map.get("doc-2"), Some(&Vec::new()));
}

#[tokio::test]
async fn reopen_rebuilds_tips_and_ordinal_counter() {
    let dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();

    {
        let index = open(&dir);
        let mut txn = index.start();
        txn.write(vec![op("doc-1", "body", 0, 0), op("doc-1", "body", 1, 0)]);
        index.commit(txn, &cancel).await.unwrap();
    }

    let index = open(&dir);
    // Stream tip survived: the next valid index is 2, not 0.
    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 0)]);
    assert!(index.commit(txn, &cancel).await.is_err());

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 2, 0)]);
    let ordinals = index.commit(txn, &cancel).await.unwrap();
    assert_eq!(ordinals, vec![3]);
}

#[tokio::test]
async fn second_writer_is_locked_out() {
    let dir = TempDir::new().unwrap();
    let _index = open(&dir);
    let err = OperationIndex::open(dir.path(), OperationIndexConfig::default()).unwrap_err();
    assert!(matches!(err, StorageError::Locked { .. }));
}

#[tokio::test]
async fn cancelled_commit_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut txn = index.start();
    txn.write(vec![op("doc-1", "body", 0, 0)]);
    let err = index.commit(txn, &cancel).await.unwrap_err();
    assert!(matches!(err, StorageError::Cancelled(_)));

    let fresh = CancellationToken::new();
    let page = index
        .get_since_ordinal(0, Paging::default(), &fresh)
        .await
        .unwrap();
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn has_action_detects_existing_action_ids() {
    let dir = TempDir::new().unwrap();
    let index = open(&dir);
    let cancel = CancellationToken::new();

    let first = op("doc-1", "body", 0, 0);
    let action_id = first.operation.action.id.clone();
    let mut txn = index.start();
    txn.write(vec![first]);
    index.commit(txn, &cancel).await.unwrap();

    assert!(index
        .has_action("doc-1", "body", "main", &action_id, &cancel)
        .await
        .unwrap());
    assert!(!index
        .has_action("doc-1", "body", "main", "act-other", &cancel)
        .await
        .unwrap());
}
