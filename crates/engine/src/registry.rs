// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned document-model registry
//!
//! Holds every registered model keyed by (document type, version) plus
//! the upgrade manifests between versions. Reads vastly outnumber
//! writes, so the maps sit behind `RwLock`s with whole-value cloning of
//! the `Arc`ed models.

use keel_core::{DocumentModel, ReactorError, UpgradeFn, UpgradeManifest};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Registry of document models and upgrade manifests
#[derive(Default)]
pub struct DocumentModelRegistry {
    /// type -> version -> model (BTreeMap keeps "latest" cheap)
    modules: RwLock<HashMap<String, BTreeMap<u32, Arc<dyn DocumentModel>>>>,
    /// (type, from_version) -> manifest
    manifests: RwLock<HashMap<(String, u32), UpgradeManifest>>,
}

impl DocumentModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of models; any duplicate (type, version) rejects
    /// the whole batch before anything is inserted.
    pub fn register_modules(
        &self,
        models: Vec<Arc<dyn DocumentModel>>,
    ) -> Result<(), ReactorError> {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());

        let mut seen: Vec<(String, u32)> = Vec::new();
        for model in &models {
            let key = (model.document_type().to_string(), model.version());
            let registered = modules
                .get(&key.0)
                .map(|versions| versions.contains_key(&key.1))
                .unwrap_or(false);
            if registered || seen.contains(&key) {
                return Err(ReactorError::DuplicateModule {
                    document_type: key.0,
                    version: key.1,
                });
            }
            seen.push(key);
        }

        for model in models {
            tracing::debug!(
                document_type = model.document_type(),
                version = model.version(),
                "document model registered"
            );
            modules
                .entry(model.document_type().to_string())
                .or_default()
                .insert(model.version(), model);
        }
        Ok(())
    }

    /// Latest registered version of a model
    pub fn get_module(&self, document_type: &str) -> Result<Arc<dyn DocumentModel>, ReactorError> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules
            .get(document_type)
            .and_then(|versions| versions.values().next_back())
            .cloned()
            .ok_or_else(|| ReactorError::ModuleNotFound {
                document_type: document_type.to_string(),
                version: None,
            })
    }

    pub fn get_module_version(
        &self,
        document_type: &str,
        version: u32,
    ) -> Result<Arc<dyn DocumentModel>, ReactorError> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        modules
            .get(document_type)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| ReactorError::ModuleNotFound {
                document_type: document_type.to_string(),
                version: Some(version),
            })
    }

    pub fn has_module(&self, document_type: &str) -> bool {
        self.modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(document_type)
    }

    /// Registered document types, sorted
    pub fn document_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Remove every version of each listed type. Returns false when any
    /// type was not registered (the others are still removed).
    pub fn unregister_modules(&self, document_types: &[String]) -> bool {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        let mut all_found = true;
        for document_type in document_types {
            if modules.remove(document_type).is_none() {
                all_found = false;
            }
        }
        all_found
    }

    pub fn register_upgrade_manifest(
        &self,
        manifest: UpgradeManifest,
    ) -> Result<(), ReactorError> {
        let mut manifests = self.manifests.write().unwrap_or_else(|e| e.into_inner());
        let key = (manifest.document_type.clone(), manifest.from_version);
        if manifests.contains_key(&key) {
            return Err(ReactorError::DuplicateManifest {
                document_type: manifest.document_type,
                from: manifest.from_version,
                to: manifest.to_version,
            });
        }
        manifests.insert(key, manifest);
        Ok(())
    }

    pub fn get_upgrade_manifest(
        &self,
        document_type: &str,
        from_version: u32,
    ) -> Result<UpgradeManifest, ReactorError> {
        let manifests = self.manifests.read().unwrap_or_else(|e| e.into_inner());
        manifests
            .get(&(document_type.to_string(), from_version))
            .cloned()
            .ok_or_else(|| ReactorError::UpgradeManifestNotFound {
                document_type: document_type.to_string(),
                from: from_version,
                to: from_version + 1,
            })
    }

    /// Ordered manifests carrying `from` to `to`, one version at a time.
    /// Equal versions yield an empty path.
    pub fn compute_upgrade_path(
        &self,
        document_type: &str,
        from_version: u32,
        to_version: u32,
    ) -> Result<Vec<UpgradeManifest>, ReactorError> {
        if to_version == from_version {
            return Ok(Vec::new());
        }
        if to_version < from_version {
            return Err(ReactorError::DowngradeNotSupported {
                document_type: document_type.to_string(),
                from: from_version,
                to: to_version,
            });
        }

        let manifests = self.manifests.read().unwrap_or_else(|e| e.into_inner());
        let mut path = Vec::with_capacity((to_version - from_version) as usize);
        for at in from_version..to_version {
            let manifest = manifests
                .get(&(document_type.to_string(), at))
                .cloned()
                .ok_or(ReactorError::MissingUpgradeTransition {
                    document_type: document_type.to_string(),
                    at,
                })?;
            path.push(manifest);
        }
        Ok(path)
    }

    /// Reducer for a single upgrade step. Multi-version jumps must go
    /// through `compute_upgrade_path`.
    pub fn get_upgrade_reducer(
        &self,
        document_type: &str,
        from_version: u32,
        to_version: u32,
    ) -> Result<UpgradeFn, ReactorError> {
        if to_version != from_version + 1 {
            return Err(ReactorError::InvalidUpgradeStep {
                from: from_version,
                to: to_version,
            });
        }
        Ok(self
            .get_upgrade_manifest(document_type, from_version)?
            .upgrade)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
