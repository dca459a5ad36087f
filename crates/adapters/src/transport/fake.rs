// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake transport for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{ChannelTransport, TransportError};
use async_trait::async_trait;
use keel_core::SyncEnvelope;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Recorded delivery
#[derive(Debug, Clone)]
pub struct SentEnvelope {
    pub remote_name: String,
    pub envelope: SyncEnvelope,
}

/// Fake transport: records deliveries, fails on demand
#[derive(Clone, Default)]
pub struct FakeTransport {
    sent: Arc<Mutex<Vec<SentEnvelope>>>,
    fail_next: Arc<AtomicUsize>,
    fail_always: Arc<Mutex<Option<String>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` deliveries with `Unreachable`, then recover
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail every delivery until cleared
    pub fn fail_always(&self, message: impl Into<String>) {
        *self.fail_always.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn recover(&self) {
        self.fail_next.store(0, Ordering::SeqCst);
        *self.fail_always.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn sent(&self) -> Vec<SentEnvelope> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl ChannelTransport for FakeTransport {
    async fn send(
        &self,
        remote_name: &str,
        envelope: &SyncEnvelope,
    ) -> Result<(), TransportError> {
        if let Some(message) = self
            .fail_always
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(TransportError::Unreachable(message));
        }
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::Unreachable("scripted failure".to_string()));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentEnvelope {
                remote_name: remote_name.to_string(),
                envelope: envelope.clone(),
            });
        Ok(())
    }
}
