// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake signature handler for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{SignatureVerification, SigningError};
use async_trait::async_trait;
use keel_core::Operation;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Recorded verification call
#[derive(Debug, Clone)]
pub struct VerifyCall {
    pub operation_id: String,
    pub action_id: String,
    pub public_key: String,
}

/// Fake signature handler: accepts everything unless scripted otherwise
#[derive(Clone, Default)]
pub struct FakeSignatureHandler {
    verdicts: Arc<Mutex<HashMap<String, bool>>>,
    errors: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<VerifyCall>>>,
}

impl FakeSignatureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the verdict for one action id
    pub fn set_verdict(&self, action_id: impl Into<String>, valid: bool) {
        self.verdicts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(action_id.into(), valid);
    }

    /// Make verification of one action id error instead of answering
    pub fn fail_with(&self, action_id: impl Into<String>, message: impl Into<String>) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(action_id.into(), message.into());
    }

    pub fn calls(&self) -> Vec<VerifyCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SignatureVerification for FakeSignatureHandler {
    async fn verify(
        &self,
        operation: &Operation,
        public_key: &str,
    ) -> Result<bool, SigningError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(VerifyCall {
                operation_id: operation.id.clone(),
                action_id: operation.action.id.clone(),
                public_key: public_key.to_string(),
            });

        if let Some(message) = self
            .errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&operation.action.id)
        {
            return Err(SigningError::Backend(message.clone()));
        }

        Ok(self
            .verdicts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&operation.action.id)
            .copied()
            .unwrap_or(true))
    }
}
