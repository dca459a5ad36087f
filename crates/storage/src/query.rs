// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Paging and filtering for index queries
//!
//! Cursors are ordinals: a page's `next_cursor` is the ordinal to pass
//! to the next call, or `None` when the log is exhausted.

use keel_core::OperationWithContext;
use serde::{Deserialize, Serialize};

/// Page-size request for index queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub limit: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

impl Paging {
    pub fn limit(limit: usize) -> Self {
        Self { limit }
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when exhausted
    pub next_cursor: Option<u64>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Narrowing filter for operation queries; all present fields must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_types: Option<Vec<String>>,
}

impl ViewFilter {
    pub fn matches(&self, op: &OperationWithContext) -> bool {
        let ctx = &op.context;
        let field_ok = |allowed: &Option<Vec<String>>, value: &str| {
            allowed
                .as_ref()
                .map(|list| list.iter().any(|v| v == value))
                .unwrap_or(true)
        };
        field_ok(&self.document_ids, &ctx.document_id)
            && field_ok(&self.scopes, &ctx.scope)
            && field_ok(&self.branches, &ctx.branch)
            && field_ok(&self.document_types, &ctx.document_type)
    }
}
