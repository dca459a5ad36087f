// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model resolver: dynamic loading in front of the registry
//!
//! Unknown document types are fetched through the injected loader at
//! most once per process, no matter how many jobs ask concurrently
//! (single-flight). A type whose load fails is marked permanently
//! failed; later calls fail fast without re-attempting. Clearing that
//! state takes `reset_failed` or a process restart.

use crate::registry::DocumentModelRegistry;
use keel_adapters::DocumentModelLoader;
use keel_core::ReactorError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Resolver that loads missing models on demand
pub struct ModelResolver {
    registry: Arc<DocumentModelRegistry>,
    loader: Option<Arc<dyn DocumentModelLoader>>,
    in_flight: Mutex<HashMap<String, Arc<Notify>>>,
    failed: Mutex<HashSet<String>>,
}

impl ModelResolver {
    pub fn new(
        registry: Arc<DocumentModelRegistry>,
        loader: Arc<dyn DocumentModelLoader>,
    ) -> Self {
        Self {
            registry,
            loader: Some(loader),
            in_flight: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
        }
    }

    /// Resolver for static deployments with no dynamic loader: consults
    /// the registry only and never loads.
    pub fn null(registry: Arc<DocumentModelRegistry>) -> Self {
        Self {
            registry,
            loader: None,
            in_flight: Mutex::new(HashMap::new()),
            failed: Mutex::new(HashSet::new()),
        }
    }

    /// Make sure a model for `document_type` is registered, loading it
    /// if necessary.
    pub async fn ensure_model_loaded(&self, document_type: &str) -> Result<(), ReactorError> {
        loop {
            if self.registry.has_module(document_type) {
                return Ok(());
            }
            if self
                .failed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(document_type)
            {
                return Err(ReactorError::ModelLoadFailed {
                    document_type: document_type.to_string(),
                    reason: "previous load failed permanently".to_string(),
                });
            }
            let Some(loader) = self.loader.clone() else {
                return Err(ReactorError::ModuleNotFound {
                    document_type: document_type.to_string(),
                    version: None,
                });
            };

            // Leader inserts a notify slot; followers wait on it.
            let follow = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
                match in_flight.get(document_type) {
                    Some(notify) => Some(notify.clone()),
                    None => {
                        in_flight.insert(document_type.to_string(), Arc::new(Notify::new()));
                        None
                    }
                }
            };

            match follow {
                Some(notify) => {
                    let notified = notify.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // The load may have finished between lookup and
                    // registering as a waiter.
                    let still_in_flight = self
                        .in_flight
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .contains_key(document_type);
                    if still_in_flight {
                        notified.await;
                    }
                    // Loop re-checks registry and the failed set.
                }
                None => {
                    let outcome = self.run_load(&loader, document_type).await;
                    let notify = self
                        .in_flight
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(document_type);
                    if let Some(notify) = notify {
                        notify.notify_waiters();
                    }
                    return outcome;
                }
            }
        }
    }

    /// Clear the permanently-failed mark for a type
    pub fn reset_failed(&self, document_type: &str) {
        self.failed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(document_type);
    }

    pub fn registry(&self) -> &Arc<DocumentModelRegistry> {
        &self.registry
    }

    async fn run_load(
        &self,
        loader: &Arc<dyn DocumentModelLoader>,
        document_type: &str,
    ) -> Result<(), ReactorError> {
        match loader.load(document_type).await {
            Ok(loaded) => {
                tracing::info!(document_type, "document model loaded");
                // A concurrent static registration is not a failure.
                match self.registry.register_modules(vec![loaded.model]) {
                    Ok(()) | Err(ReactorError::DuplicateModule { .. }) => {}
                    Err(e) => return Err(e),
                }
                for manifest in loaded.upgrades {
                    match self.registry.register_upgrade_manifest(manifest) {
                        Ok(()) | Err(ReactorError::DuplicateManifest { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(document_type, error = %e, "document model load failed; marking type failed");
                self.failed
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(document_type.to_string());
                Err(ReactorError::ModelLoadFailed {
                    document_type: document_type.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
