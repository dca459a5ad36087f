// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync transport adapters
//!
//! A transport carries one envelope to one named remote. Channels own
//! retries and dead-lettering; a transport only reports whether this
//! delivery attempt worked.

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTransport, SentEnvelope};

use async_trait::async_trait;
use keel_core::SyncEnvelope;
use thiserror::Error;

/// Errors from envelope delivery
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("remote unreachable: {0}")]
    Unreachable(String),
    #[error("remote rejected envelope: {0}")]
    Rejected(String),
}

/// Adapter that delivers envelopes to a sync remote
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    async fn send(
        &self,
        remote_name: &str,
        envelope: &SyncEnvelope,
    ) -> Result<(), TransportError>;
}
