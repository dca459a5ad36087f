// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn cursor(remote: &str, ordinal: u64) -> RemoteCursor {
    RemoteCursor {
        remote_name: remote.to_string(),
        cursor_ordinal: ordinal,
        last_synced_at_utc_ms: Some(1_700_000_000_000),
    }
}

#[tokio::test]
async fn unknown_remote_reads_as_zero() {
    let dir = TempDir::new().unwrap();
    let store = SyncCursorStore::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    let got = store.get_cursor("origin", &cancel).await.unwrap();
    assert_eq!(got.cursor_ordinal, 0);
    assert!(got.last_synced_at_utc_ms.is_none());
}

#[tokio::test]
async fn cursor_roundtrips() {
    let dir = TempDir::new().unwrap();
    let store = SyncCursorStore::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    store.put_cursor(cursor("origin", 42), &cancel).await.unwrap();
    let got = store.get_cursor("origin", &cancel).await.unwrap();
    assert_eq!(got, cursor("origin", 42));
}

#[tokio::test]
async fn cursor_never_rewinds() {
    let dir = TempDir::new().unwrap();
    let store = SyncCursorStore::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    store.put_cursor(cursor("origin", 42), &cancel).await.unwrap();
    let stored = store.put_cursor(cursor("origin", 7), &cancel).await.unwrap();
    assert_eq!(stored.cursor_ordinal, 42);
    assert_eq!(
        store.get_cursor("origin", &cancel).await.unwrap().cursor_ordinal,
        42
    );

    // Equal ordinal is allowed (refreshes the sync timestamp).
    let mut refreshed = cursor("origin", 42);
    refreshed.last_synced_at_utc_ms = Some(1_700_000_001_000);
    let stored = store.put_cursor(refreshed.clone(), &cancel).await.unwrap();
    assert_eq!(stored, refreshed);
}

#[tokio::test]
async fn remote_records_upsert_and_list_sorted() {
    let dir = TempDir::new().unwrap();
    let store = SyncCursorStore::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    let mut beta = RemoteRecord {
        name: "beta".to_string(),
        collection_id: "col-1".to_string(),
        filter: ViewFilter::default(),
        channel_config: serde_json::json!({ "url": "https://beta.example" }),
    };
    let alpha = RemoteRecord {
        name: "alpha".to_string(),
        collection_id: "col-2".to_string(),
        filter: ViewFilter {
            scopes: Some(vec!["body".to_string()]),
            ..ViewFilter::default()
        },
        channel_config: serde_json::Value::Null,
    };
    store.put_remote(&beta, &cancel).await.unwrap();
    store.put_remote(&alpha, &cancel).await.unwrap();

    beta.collection_id = "col-9".to_string();
    store.put_remote(&beta, &cancel).await.unwrap();

    let listed = store.list_remotes(&cancel).await.unwrap();
    assert_eq!(listed, vec![alpha.clone(), beta]);
    assert_eq!(
        store.get_remote("alpha", &cancel).await.unwrap(),
        Some(alpha)
    );
    assert_eq!(store.get_remote("missing", &cancel).await.unwrap(), None);
}

#[tokio::test]
async fn delete_remote_and_cursor() {
    let dir = TempDir::new().unwrap();
    let store = SyncCursorStore::open(dir.path()).unwrap();
    let cancel = CancellationToken::new();

    store
        .put_remote(
            &RemoteRecord {
                name: "origin".to_string(),
                collection_id: "col-1".to_string(),
                filter: ViewFilter::default(),
                channel_config: serde_json::Value::Null,
            },
            &cancel,
        )
        .await
        .unwrap();
    store.put_cursor(cursor("origin", 42), &cancel).await.unwrap();

    store.delete_remote("origin", &cancel).await.unwrap();
    store.delete_cursor("origin", &cancel).await.unwrap();

    assert_eq!(store.get_remote("origin", &cancel).await.unwrap(), None);
    assert_eq!(
        store.get_cursor("origin", &cancel).await.unwrap().cursor_ordinal,
        0
    );

    // Deleting again is a no-op.
    store.delete_remote("origin", &cancel).await.unwrap();
    store.delete_cursor("origin", &cancel).await.unwrap();
}
