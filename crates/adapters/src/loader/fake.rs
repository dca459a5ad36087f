// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake model loader for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{DocumentModelLoader, LoadedModel, LoaderError};
use async_trait::async_trait;
use keel_core::DocumentModel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake loader with scriptable results and per-type call counts
#[derive(Clone, Default)]
pub struct FakeLoader {
    models: Arc<Mutex<HashMap<String, LoadedModel>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, model: Arc<dyn DocumentModel>) {
        let loaded = LoadedModel::new(model);
        self.models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(loaded.model.document_type().to_string(), loaded);
    }

    pub fn register_loaded(&self, loaded: LoadedModel) {
        self.models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(loaded.model.document_type().to_string(), loaded);
    }

    /// Make loads of `document_type` fail with `message`
    pub fn fail_with(&self, document_type: impl Into<String>, message: impl Into<String>) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document_type.into(), message.into());
    }

    /// Stop failing loads of `document_type`
    pub fn recover_type(&self, document_type: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(document_type);
    }

    /// Add latency to every load (exercises single-flight paths)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    /// Number of times `document_type` has been requested
    pub fn load_count(&self, document_type: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|t| t.as_str() == document_type)
            .count()
    }

    /// All requested types, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl DocumentModelLoader for FakeLoader {
    async fn load(&self, document_type: &str) -> Result<LoadedModel, LoaderError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(document_type.to_string());

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(document_type)
        {
            return Err(LoaderError::Registry(message.clone()));
        }

        self.models
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(document_type)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(document_type.to_string()))
    }
}
