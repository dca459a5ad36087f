// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Index log entry with checksum verification
//!
//! Each line of `index.jsonl` carries one record: an operation accepted
//! into a stream, or a collection lifecycle marker. The ordinal is the
//! process-wide commit order; the CRC32 checksum covers the serialized
//! record so corruption is detected on replay.

use crate::error::StorageError;
use keel_core::OperationWithContext;
use serde::{Deserialize, Serialize};

/// What one log line records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexRecord {
    Operation(OperationWithContext),
    CollectionCreated {
        collection_id: String,
        name: String,
    },
    CollectionJoined {
        collection_id: String,
        document_id: String,
    },
    CollectionLeft {
        collection_id: String,
        document_id: String,
    },
}

/// A single entry in the operation index log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Globally monotonic commit order, assigned at commit time
    pub ordinal: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: u64,
    /// Identifies the writing process (future multi-writer merge)
    pub writer_id: String,
    pub record: IndexRecord,
    /// CRC32 of the serialized record
    pub checksum: u32,
}

impl IndexEntry {
    pub fn new(
        ordinal: u64,
        timestamp_micros: u64,
        writer_id: &str,
        record: IndexRecord,
    ) -> Self {
        let checksum = Self::calculate_checksum(&record);
        Self {
            ordinal,
            timestamp_micros,
            writer_id: writer_id.to_string(),
            record,
            checksum,
        }
    }

    fn calculate_checksum(record: &IndexRecord) -> u32 {
        let json = serde_json::to_string(record).unwrap_or_default();
        crc32fast::hash(json.as_bytes())
    }

    /// Verify the checksum matches the record
    pub fn verify(&self) -> bool {
        self.checksum == Self::calculate_checksum(&self.record)
    }

    /// Serialize to newline-delimited JSON (one line)
    pub fn to_line(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(StorageError::from)
    }

    /// Parse from a single line of JSON
    pub fn from_line(line: &str) -> Result<Self, StorageError> {
        serde_json::from_str(line).map_err(StorageError::from)
    }

    /// The contained operation, when this entry records one
    pub fn operation(&self) -> Option<&OperationWithContext> {
        match &self.record {
            IndexRecord::Operation(op) => Some(op),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
