// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for the reactor's external collaborators

pub mod loader;
pub mod signing;
pub mod transport;
pub mod traced;

pub use loader::{
    DocumentModelLoader, HttpRegistryLoader, LoadedModel, LoaderError, ModelFactory, StaticLoader,
};
pub use signing::{SignatureVerification, SigningError};
pub use transport::{ChannelTransport, TransportError};
pub use traced::TracedTransport;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use loader::FakeLoader;
#[cfg(any(test, feature = "test-support"))]
pub use signing::{FakeSignatureHandler, VerifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use transport::{FakeTransport, SentEnvelope};
