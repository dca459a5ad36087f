// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-core: Core library for the keel document-synchronization reactor
//!
//! This crate provides:
//! - Domain types: operations, documents, jobs, sync operations
//! - The typed reactor event enum and the event bus
//! - The document-model contract consumed from pluggable modules
//! - Clock/id abstractions for deterministic tests
//! - The shared error taxonomy and cancellation helpers

pub mod cancel;
pub mod clock;
pub mod id;

pub mod config;
pub mod error;
pub mod events;

// Domain types (order matters for dependencies)
pub mod operation;
pub mod document;
pub mod model;
pub mod job;
pub mod event;
pub mod sync;

// Re-exports
pub use cancel::{bail_if_cancelled, CancelledError};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{CacheSettings, ConfigError, ExecutorSettings, ReactorConfig, SyncSettings};
pub use document::{Document, DocumentHeader};
pub use error::{ErrorInfo, ReactorError};
pub use event::{
    EventKind, JobEventPayload, JobFailedPayload, OperationsWrittenPayload,
    QueueJobAvailablePayload, ReactorEvent, WriteReadyPayload,
};
pub use events::{
    handler, EventBus, EventBusAggregateError, EventHandler, HandlerResult, SubscriberId,
};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use job::{ConsistencyToken, Job, JobId, JobKind, JobRequest, JobStatus};
pub use model::{DocumentModel, ModelError, UpgradeFn, UpgradeManifest};
pub use operation::{
    Action, ActionKind, Operation, OperationContext, OperationWithContext, Signer,
};
pub use sync::{SyncEnvelope, SyncOperation, SyncOperationStatus};

/// Re-exported so downstream crates share one cancellation type.
pub use tokio_util::sync::CancellationToken;
