// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation helpers shared by every storage-facing call
//!
//! Storage and sync calls take a `CancellationToken` and must check it
//! before starting and again after each await so that an aborted call
//! never leaves a partial mutation behind.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error returned when a call observes a cancelled token
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct CancelledError;

/// Return `Err(CancelledError)` if the token has been cancelled
pub fn bail_if_cancelled(cancel: &CancellationToken) -> Result<(), CancelledError> {
    if cancel.is_cancelled() {
        Err(CancelledError)
    } else {
        Ok(())
    }
}
