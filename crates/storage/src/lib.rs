// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-storage: durable stores for the keel reactor
//!
//! - Operation index: append-only checksummed JSONL log of operations
//!   and collection membership, with a rebuildable in-memory projection
//! - Keyframe store: file-per-keyframe document snapshots
//! - Sync-cursor store: per-remote replication cursors and records
//! - Migrations: ordered, idempotent schema-layout units
//!
//! Every async method takes a `CancellationToken` and bails without
//! partial mutation when cancelled.

pub mod cursor;
pub mod error;
pub mod index;
pub mod keyframes;
pub mod migrations;
pub mod query;

pub use cursor::{RemoteCursor, RemoteRecord, SyncCursorStore};
pub use error::StorageError;
pub use index::{IndexTransaction, OperationIndex, OperationIndexConfig, StreamRevisions};
pub use keyframes::{Keyframe, KeyframeStore};
pub use migrations::{migrate, Migration};
pub use query::{Page, Paging, ViewFilter};
