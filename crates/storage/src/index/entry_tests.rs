// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use keel_core::{Action, Operation, OperationContext};

fn operation_record() -> IndexRecord {
    let action = Action::new("a-1", "SET", "global", 1000, serde_json::json!({"v": 1}));
    IndexRecord::Operation(OperationWithContext {
        operation: Operation::from_action(action, 0, 0),
        context: OperationContext {
            document_id: "doc-1".to_string(),
            document_type: "budget".to_string(),
            scope: "global".to_string(),
            branch: "main".to_string(),
            ordinal: 1,
            source_remote: String::new(),
        },
    })
}

#[test]
fn entry_roundtrips_through_line_format() {
    let entry = IndexEntry::new(1, 42_000_000, "writer-a", operation_record());
    let line = entry.to_line().unwrap();
    assert!(!line.contains('\n'));

    let parsed = IndexEntry::from_line(&line).unwrap();
    assert_eq!(parsed, entry);
    assert!(parsed.verify());
}

#[test]
fn tampered_record_fails_verification() {
    let entry = IndexEntry::new(1, 42_000_000, "writer-a", operation_record());
    let line = entry.to_line().unwrap();
    let tampered = line.replace("doc-1", "doc-2");

    let parsed = IndexEntry::from_line(&tampered).unwrap();
    assert!(!parsed.verify());
}

#[test]
fn collection_records_carry_no_operation() {
    let entry = IndexEntry::new(
        3,
        0,
        "writer-a",
        IndexRecord::CollectionJoined {
            collection_id: "drive-1".to_string(),
            document_id: "doc-1".to_string(),
        },
    );
    assert!(entry.operation().is_none());
    assert!(entry.verify());
}

#[test]
fn garbage_line_is_a_parse_error() {
    assert!(IndexEntry::from_line("{not json").is_err());
    assert!(IndexEntry::from_line("").is_err());
}
