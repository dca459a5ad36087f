// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signature verification ahead of job execution
//!
//! Runs before any state is touched: one bad signature aborts the whole
//! job. With no handler configured, verification is a no-op (trusted
//! deployments).

use keel_adapters::SignatureVerification;
use keel_core::{bail_if_cancelled, Action, CancellationToken, Operation, OperationWithContext, ReactorError};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Verifies signed actions and operations through an injected handler
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    handler: Option<Arc<dyn SignatureVerification>>,
}

impl SignatureVerifier {
    pub fn new(handler: Arc<dyn SignatureVerification>) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    /// Verifier that accepts everything (no handler configured)
    pub fn disabled() -> Self {
        Self { handler: None }
    }

    /// Check every signed action in a submission.
    ///
    /// The handler sees a reconstructed minimal operation whose id is
    /// deterministic over (document, scope, branch, action), so both
    /// sides sign the same bytes without coordinating ids.
    pub async fn verify_actions(
        &self,
        document_id: &str,
        branch: &str,
        actions: &[Action],
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let Some(handler) = &self.handler else {
            return Ok(());
        };
        bail_if_cancelled(cancel)?;

        for (index, action) in actions.iter().enumerate() {
            let Some(signer) = &action.signer else {
                continue;
            };
            let index = index as u64;
            if signer.signatures.is_empty() {
                return Err(ReactorError::InvalidSignature {
                    id: action.id.clone(),
                    index,
                });
            }

            let operation = reconstruct_operation(document_id, branch, action);
            let verdict = handler.verify(&operation, &signer.public_key).await;
            bail_if_cancelled(cancel)?;
            match verdict {
                Ok(true) => {}
                Ok(false) => {
                    return Err(ReactorError::InvalidSignature {
                        id: action.id.clone(),
                        index,
                    });
                }
                Err(e) => {
                    tracing::warn!(action_id = %action.id, error = %e, "signature check failed to run");
                    return Err(ReactorError::InvalidSignature {
                        id: action.id.clone(),
                        index,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check every signed operation in an inbound batch
    pub async fn verify_operations(
        &self,
        operations: &[OperationWithContext],
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let Some(handler) = &self.handler else {
            return Ok(());
        };
        bail_if_cancelled(cancel)?;

        for op in operations {
            let Some(signer) = &op.operation.action.signer else {
                continue;
            };
            if signer.signatures.is_empty() {
                return Err(ReactorError::InvalidSignature {
                    id: op.operation.id.clone(),
                    index: op.operation.index,
                });
            }

            let verdict = handler.verify(&op.operation, &signer.public_key).await;
            bail_if_cancelled(cancel)?;
            match verdict {
                Ok(true) => {}
                Ok(false) | Err(_) => {
                    return Err(ReactorError::InvalidSignature {
                        id: op.operation.id.clone(),
                        index: op.operation.index,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Minimal operation the signature handler verifies against.
///
/// The id must be reproducible from placement alone: sha256 over
/// document id, scope, branch, and action id.
fn reconstruct_operation(document_id: &str, branch: &str, action: &Action) -> Operation {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(action.scope.as_bytes());
    hasher.update(b"\x00");
    hasher.update(branch.as_bytes());
    hasher.update(b"\x00");
    hasher.update(action.id.as_bytes());
    let digest = hasher.finalize();
    let mut id = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(id, "{byte:02x}");
    }

    let mut operation = Operation::from_action(action.clone(), 0, 0);
    operation.id = id;
    operation
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod tests;
