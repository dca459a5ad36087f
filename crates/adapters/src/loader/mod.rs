// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Document-model loader adapters
//!
//! The resolver asks a loader for the model matching a document type it
//! has never seen. Rust cannot import code at runtime, so every loader
//! ultimately hands out models constructed in-process; what varies is
//! where the decision to construct them comes from (a static map, or a
//! remote HTTP registry).

mod http;
mod static_map;

pub use http::HttpRegistryLoader;
pub use static_map::StaticLoader;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeLoader;

use async_trait::async_trait;
use keel_core::{DocumentModel, UpgradeManifest};
use std::sync::Arc;
use thiserror::Error;

/// Errors from model loading
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("no model available for document type: {0}")]
    NotFound(String),
    #[error("registry request failed: {0}")]
    Registry(String),
    #[error("invalid model descriptor: {0}")]
    InvalidDescriptor(String),
}

/// A loaded model plus the upgrade manifests shipped with it
#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn DocumentModel>,
    pub upgrades: Vec<UpgradeManifest>,
}

impl LoadedModel {
    pub fn new(model: Arc<dyn DocumentModel>) -> Self {
        Self {
            model,
            upgrades: Vec::new(),
        }
    }

    pub fn with_upgrades(mut self, upgrades: Vec<UpgradeManifest>) -> Self {
        self.upgrades = upgrades;
        self
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("document_type", &self.model.document_type())
            .field("version", &self.model.version())
            .field("upgrades", &self.upgrades.len())
            .finish()
    }
}

/// Adapter that resolves a document type to its model
#[async_trait]
pub trait DocumentModelLoader: Send + Sync + 'static {
    async fn load(&self, document_type: &str) -> Result<LoadedModel, LoaderError>;
}

/// Builds a model from an opaque registry descriptor
pub type ModelFactory =
    Arc<dyn Fn(serde_json::Value) -> Result<LoadedModel, LoaderError> + Send + Sync>;
