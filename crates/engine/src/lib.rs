// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-engine: the keel reactor's execution pipeline
//!
//! Jobs flow queue -> worker -> executor; the executor commits
//! operations to the index and folds them into cached documents, then
//! read models (the document view, subscriptions) catch up off the
//! event bus. [`Reactor`] assembles the whole pipeline behind one
//! facade.

pub mod cache;
pub mod coordinator;
pub mod executor;
pub mod lifecycle;
pub mod queue;
pub mod reactor;
pub mod registry;
pub mod resolver;
pub mod subscriptions;
pub mod tracker;
pub mod verifier;
pub mod view;
pub mod worker;

pub use cache::{WriteCache, WriteCacheConfig};
pub use coordinator::{
    LoggingErrorHandler, ReadModel, ReadModelCoordinator, ReadModelPhase, SubscriptionErrorHandler,
};
pub use executor::{ExecutionOutcome, JobExecutor};
pub use lifecycle::{
    CreateDocumentInput, DeleteDocumentInput, RelationshipInput, UpgradeDocumentInput,
};
pub use queue::{JobLease, JobQueue};
pub use reactor::{MutationPlan, NewDocument, Reactor, ReactorBuilder};
pub use registry::DocumentModelRegistry;
pub use resolver::ModelResolver;
pub use subscriptions::{RelationshipChange, SubscriptionReadModel, SubscriptionSink};
pub use tracker::JobTracker;
pub use verifier::SignatureVerifier;
pub use view::{DocumentView, ViewRow};
pub use worker::JobWorker;
