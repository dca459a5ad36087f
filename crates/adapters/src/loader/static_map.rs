// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static-map loader for fixed model catalogs

use super::{DocumentModelLoader, LoadedModel, LoaderError};
use async_trait::async_trait;
use keel_core::DocumentModel;
use std::collections::HashMap;
use std::sync::Arc;

/// Loader backed by a map built at construction time.
///
/// Used by deployments that compile their whole model catalog in.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    models: HashMap<String, LoadedModel>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn DocumentModel>) -> Self {
        self.insert(LoadedModel::new(model));
        self
    }

    pub fn insert(&mut self, loaded: LoadedModel) {
        self.models
            .insert(loaded.model.document_type().to_string(), loaded);
    }
}

#[async_trait]
impl DocumentModelLoader for StaticLoader {
    async fn load(&self, document_type: &str) -> Result<LoadedModel, LoaderError> {
        self.models
            .get(document_type)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(document_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{Action, ModelError};

    struct NoteModel;

    impl DocumentModel for NoteModel {
        fn document_type(&self) -> &str {
            "note"
        }

        fn initial_state(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        fn reduce(
            &self,
            state: serde_json::Value,
            _action: &Action,
        ) -> Result<serde_json::Value, ModelError> {
            Ok(state)
        }
    }

    #[tokio::test]
    async fn returns_registered_model() {
        let loader = StaticLoader::new().with_model(Arc::new(NoteModel));
        let loaded = loader.load("note").await.unwrap();
        assert_eq!(loaded.model.document_type(), "note");
    }

    #[tokio::test]
    async fn unknown_type_is_not_found() {
        let loader = StaticLoader::new();
        assert!(matches!(
            loader.load("note").await,
            Err(LoaderError::NotFound(_))
        ));
    }
}
