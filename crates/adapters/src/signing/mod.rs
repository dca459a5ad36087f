// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signature verification adapters
//!
//! The verifier in keel-engine decides *what* to check; this seam decides
//! *how* a signature is checked against a public key (an external PKI,
//! a key server, a local keyring).

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSignatureHandler, VerifyCall};

use async_trait::async_trait;
use keel_core::Operation;
use thiserror::Error;

/// Errors from signature verification
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("unknown public key: {0}")]
    UnknownKey(String),
    #[error("verification backend failed: {0}")]
    Backend(String),
}

/// Adapter that checks one operation's signature against a public key.
///
/// Returning `Ok(false)` means "checked and invalid"; errors mean the
/// check itself could not run. The caller treats both as a rejected
/// signature.
#[async_trait]
pub trait SignatureVerification: Send + Sync + 'static {
    async fn verify(&self, operation: &Operation, public_key: &str)
        -> Result<bool, SigningError>;
}
