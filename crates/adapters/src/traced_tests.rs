// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::transport::FakeTransport;

fn envelope() -> SyncEnvelope {
    SyncEnvelope::Operations {
        operations: Vec::new(),
    }
}

#[tokio::test]
async fn traced_transport_passes_through_success() {
    let fake = FakeTransport::new();
    let traced = TracedTransport::new(fake.clone());

    traced.send("origin", &envelope()).await.unwrap();
    assert_eq!(fake.sent_count(), 1);
    assert_eq!(fake.sent()[0].remote_name, "origin");
}

#[tokio::test]
async fn traced_transport_passes_through_failure() {
    let fake = FakeTransport::new();
    fake.fail_always("down for maintenance");
    let traced = TracedTransport::new(fake.clone());

    let err = traced.send("origin", &envelope()).await.unwrap_err();
    assert!(matches!(err, TransportError::Unreachable(_)));
    assert_eq!(fake.sent_count(), 0);
}
