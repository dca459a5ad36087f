// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only log file underneath the operation index
//!
//! The writer appends batches of entries and fsyncs once per batch. The
//! reader iterates entries in order and stops at the first corruption
//! (truncated write or checksum mismatch); corruption is never
//! auto-truncated on open; callers decide whether to `repair`.

use super::entry::IndexEntry;
use crate::error::StorageError;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Durable appender for `index.jsonl`
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    file: File,
}

impl LogWriter {
    /// Open or create the log file for appending
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Append a batch of entries with a single fsync.
    ///
    /// All lines are written before the sync, so a crash mid-batch
    /// leaves a truncated tail that replay detects and the batch is not
    /// considered committed.
    pub fn append_batch(&mut self, entries: &[IndexEntry]) -> Result<(), StorageError> {
        let mut buffer = String::new();
        for entry in entries {
            buffer.push_str(&entry.to_line()?);
            buffer.push('\n');
        }
        self.file.write_all(buffer.as_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator over log entries with corruption detection
pub struct LogIter {
    reader: Option<BufReader<File>>,
    line_number: u64,
    /// Byte offset after the last entry that parsed and verified
    last_valid_position: u64,
    position: u64,
}

impl LogIter {
    fn new(path: &Path) -> Result<Self, StorageError> {
        let reader = if path.exists() {
            Some(BufReader::new(File::open(path)?))
        } else {
            None
        };
        Ok(Self {
            reader,
            line_number: 0,
            last_valid_position: 0,
            position: 0,
        })
    }

    pub fn last_valid_position(&self) -> u64 {
        self.last_valid_position
    }
}

impl Iterator for LogIter {
    type Item = Result<IndexEntry, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;

        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(bytes_read) => {
                    self.line_number += 1;
                    self.position += bytes_read as u64;

                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let entry = match IndexEntry::from_line(trimmed) {
                        Ok(entry) => entry,
                        Err(e) => {
                            return Some(Err(StorageError::Corrupted {
                                line: self.line_number,
                                reason: e.to_string(),
                            }));
                        }
                    };

                    if !entry.verify() {
                        return Some(Err(StorageError::ChecksumMismatch {
                            line: self.line_number,
                        }));
                    }

                    self.last_valid_position = self.position;
                    return Some(Ok(entry));
                }
                Err(e) => return Some(Err(StorageError::Io(e))),
            }
        }
    }
}

/// Reader over an index log file
pub struct LogReader {
    path: PathBuf,
}

impl LogReader {
    /// A reader that treats a missing file as empty
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Iterate all entries in write order
    pub fn entries(&self) -> Result<LogIter, StorageError> {
        LogIter::new(&self.path)
    }

    /// Iterate entries with `ordinal > after`, stopping at corruption.
    ///
    /// Corruption mid-log is logged and treated as end-of-log for
    /// reads; `repair` truncates it for good.
    pub fn entries_after(
        &self,
        after: u64,
    ) -> Result<impl Iterator<Item = IndexEntry>, StorageError> {
        let iter = self.entries()?;
        Ok(iter
            .map_while(|result| match result {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(?e, "stopping log read at corrupted entry");
                    None
                }
            })
            .filter(move |entry| entry.ordinal > after))
    }
}

/// Truncate the log at the first corruption point.
///
/// Explicit crash recovery, never run on open. Returns the number of
/// bytes removed (0 when the log is clean).
pub fn repair(path: &Path) -> Result<u64, StorageError> {
    if !path.exists() {
        return Ok(0);
    }

    let reader = LogReader::open(path);
    let mut iter = reader.entries()?;
    let mut last_valid_position = 0u64;
    let mut had_corruption = false;

    while let Some(entry_result) = iter.next() {
        match entry_result {
            Ok(_) => last_valid_position = iter.last_valid_position(),
            Err(e) => {
                tracing::warn!(?e, "log corruption detected during repair");
                had_corruption = true;
                break;
            }
        }
    }

    if !had_corruption {
        return Ok(0);
    }

    let old_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(last_valid_position)?;
    file.sync_all()?;
    tracing::info!(position = last_valid_position, "log truncated at corruption point");
    Ok(old_size.saturating_sub(last_valid_position))
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
