// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-registry model loader
//!
//! Fetches a JSON model descriptor from a registry service and hands it
//! to the factory registered for that document type. The registry decides
//! whether a type exists and with what configuration; the factory builds
//! the in-process model from the descriptor.

use super::{DocumentModelLoader, LoadedModel, LoaderError, ModelFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Loader backed by an HTTP model registry
#[derive(Clone)]
pub struct HttpRegistryLoader {
    base_url: String,
    factories: Arc<HashMap<String, ModelFactory>>,
}

impl HttpRegistryLoader {
    pub fn new(base_url: impl Into<String>, factories: HashMap<String, ModelFactory>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            factories: Arc::new(factories),
        }
    }

    fn descriptor_url(&self, document_type: &str) -> String {
        format!("{}/models/{}", self.base_url, document_type)
    }
}

#[async_trait]
impl DocumentModelLoader for HttpRegistryLoader {
    async fn load(&self, document_type: &str) -> Result<LoadedModel, LoaderError> {
        let factory = self
            .factories
            .get(document_type)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(document_type.to_string()))?;

        let url = self.descriptor_url(document_type);
        let requested_type = document_type.to_string();
        // ureq is blocking; keep it off the async runtime's workers.
        let descriptor = tokio::task::spawn_blocking(move || {
            let mut response = ureq::get(&url).call().map_err(|e| match e {
                ureq::Error::StatusCode(404) => LoaderError::NotFound(requested_type.clone()),
                other => LoaderError::Registry(other.to_string()),
            })?;
            response
                .body_mut()
                .read_json::<serde_json::Value>()
                .map_err(|e| LoaderError::InvalidDescriptor(e.to_string()))
        })
        .await
        .map_err(|e| LoaderError::Registry(format!("registry task failed: {e}")))??;

        tracing::debug!(document_type, "model descriptor fetched from registry");
        factory(descriptor)
    }
}
