// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::index::entry::IndexRecord;
use keel_core::{Action, Operation, OperationContext, OperationWithContext};

fn entry(ordinal: u64) -> IndexEntry {
    let action = Action::new(
        format!("a-{ordinal}"),
        "SET",
        "global",
        1000,
        serde_json::json!({"v": ordinal}),
    );
    IndexEntry::new(
        ordinal,
        ordinal * 1_000,
        "writer-a",
        IndexRecord::Operation(OperationWithContext {
            operation: Operation::from_action(action, ordinal - 1, 0),
            context: OperationContext {
                document_id: "doc-1".to_string(),
                document_type: "budget".to_string(),
                scope: "global".to_string(),
                branch: "main".to_string(),
                ordinal,
                source_remote: String::new(),
            },
        }),
    )
}

#[test]
fn append_then_read_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.jsonl");

    let mut writer = LogWriter::open(&path).unwrap();
    writer.append_batch(&[entry(1), entry(2), entry(3)]).unwrap();

    let reader = LogReader::open(&path);
    let ordinals: Vec<u64> = reader
        .entries()
        .unwrap()
        .map(|r| r.unwrap().ordinal)
        .collect();
    assert_eq!(ordinals, vec![1, 2, 3]);
}

#[test]
fn entries_after_skips_up_to_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.jsonl");
    let mut writer = LogWriter::open(&path).unwrap();
    writer
        .append_batch(&[entry(1), entry(2), entry(3), entry(4)])
        .unwrap();

    let reader = LogReader::open(&path);
    let ordinals: Vec<u64> = reader.entries_after(2).unwrap().map(|e| e.ordinal).collect();
    assert_eq!(ordinals, vec![3, 4]);
}

#[test]
fn missing_file_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let reader = LogReader::open(&dir.path().join("absent.jsonl"));
    assert_eq!(reader.entries().unwrap().count(), 0);
}

#[test]
fn read_stops_at_truncated_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.jsonl");
    let mut writer = LogWriter::open(&path).unwrap();
    writer.append_batch(&[entry(1), entry(2)]).unwrap();

    // Simulate a crash mid-append: a partial third line.
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"ordinal\":3,\"timest").unwrap();
    drop(file);

    let reader = LogReader::open(&path);
    let mut iter = reader.entries().unwrap();
    assert!(iter.next().unwrap().is_ok());
    assert!(iter.next().unwrap().is_ok());
    assert!(matches!(
        iter.next().unwrap(),
        Err(StorageError::Corrupted { line: 3, .. })
    ));
}

#[test]
fn repair_truncates_at_corruption_point() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.jsonl");
    let mut writer = LogWriter::open(&path).unwrap();
    writer.append_batch(&[entry(1), entry(2)]).unwrap();

    let clean_size = std::fs::metadata(&path).unwrap().len();
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"garbage that never parses\n").unwrap();
    drop(file);

    let removed = repair(&path).unwrap();
    assert!(removed > 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), clean_size);

    // Both intact entries survive.
    let reader = LogReader::open(&path);
    assert_eq!(reader.entries().unwrap().filter(|r| r.is_ok()).count(), 2);
}

#[test]
fn repair_on_clean_log_removes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.jsonl");
    let mut writer = LogWriter::open(&path).unwrap();
    writer.append_batch(&[entry(1)]).unwrap();

    assert_eq!(repair(&path).unwrap(), 0);
    assert_eq!(repair(&dir.path().join("absent.jsonl")).unwrap(), 0);
}

#[test]
fn checksum_mismatch_detected_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.jsonl");
    let mut writer = LogWriter::open(&path).unwrap();
    writer.append_batch(&[entry(1)]).unwrap();

    // Flip a payload byte without updating the checksum.
    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, contents.replace("doc-1", "doc-9")).unwrap();

    let reader = LogReader::open(&path);
    let mut iter = reader.entries().unwrap();
    assert!(matches!(
        iter.next().unwrap(),
        Err(StorageError::ChecksumMismatch { line: 1 })
    ));
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Any batching of a write sequence reads back as one totally
        // ordered log.
        #[test]
        fn batched_appends_replay_in_order(splits in proptest::collection::vec(1..5usize, 1..8)) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("index.jsonl");
            let mut writer = LogWriter::open(&path).unwrap();

            let mut next = 1u64;
            for size in &splits {
                let batch: Vec<IndexEntry> = (0..*size)
                    .map(|_| {
                        let e = entry(next);
                        next += 1;
                        e
                    })
                    .collect();
                writer.append_batch(&batch).unwrap();
            }

            let reader = LogReader::open(&path);
            let ordinals: Vec<u64> = reader
                .entries()
                .unwrap()
                .map(|r| r.unwrap().ordinal)
                .collect();
            let expected: Vec<u64> = (1..next).collect();
            prop_assert_eq!(ordinals, expected);
        }
    }
}
