// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::transport::{ChannelTransport, TransportError};
use async_trait::async_trait;
use keel_core::SyncEnvelope;

/// Wrapper that adds tracing to any ChannelTransport
#[derive(Clone)]
pub struct TracedTransport<T> {
    inner: T,
}

impl<T> TracedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: ChannelTransport> ChannelTransport for TracedTransport<T> {
    async fn send(
        &self,
        remote_name: &str,
        envelope: &SyncEnvelope,
    ) -> Result<(), TransportError> {
        let span = tracing::info_span!("transport.send", remote = remote_name);
        let _guard = span.enter();

        let SyncEnvelope::Operations { operations } = envelope;
        tracing::debug!(operation_count = operations.len(), "sending envelope");

        let start = std::time::Instant::now();
        let result = self.inner.send(remote_name, envelope).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "delivered"),
            Err(e) => tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "delivery failed"
            ),
        }

        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
