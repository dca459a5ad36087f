// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync channels: the per-remote pipe between mailboxes and transport
//!
//! A channel owns three mailboxes and the remote's replication cursor.
//! Inbound envelopes land in the inbox for the manager to apply;
//! outbound flushes hand outbox batches to the transport. Transient
//! transport failures never reach the caller: they count against the
//! retry limit and eventually dead-letter the operation.

use crate::mailbox::Mailbox;
use async_trait::async_trait;
use chrono::Utc;
use keel_adapters::ChannelTransport;
use keel_core::{
    bail_if_cancelled, CancellationToken, ErrorInfo, IdGen, ReactorError, SyncEnvelope,
    SyncOperation, SyncOperationStatus, UuidIdGen,
};
use keel_storage::{RemoteCursor, SyncCursorStore};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One remote's sync pipe
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    fn channel_id(&self) -> &str;
    fn inbox(&self) -> &Arc<Mailbox<SyncOperation>>;
    fn outbox(&self) -> &Arc<Mailbox<SyncOperation>>;
    fn dead_letter(&self) -> &Arc<Mailbox<SyncOperation>>;

    /// Accept an inbound envelope from the remote
    async fn receive(
        &self,
        envelope: SyncEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError>;

    /// Push pending outbox entries through the transport
    async fn flush(&self, cancel: &CancellationToken) -> Result<(), ReactorError>;

    async fn init(&self, cancel: &CancellationToken) -> Result<(), ReactorError>;
    async fn shutdown(&self);
}

/// Retry budget for outbound delivery
#[derive(Debug, Clone, Copy)]
pub struct PollingChannelConfig {
    pub retry_limit: u32,
}

impl Default for PollingChannelConfig {
    fn default() -> Self {
        Self { retry_limit: 5 }
    }
}

/// Channel that drains its outbox on a poll cadence and acknowledges
/// with a cumulative cursor
pub struct PollingChannel {
    remote_name: String,
    cursors: SyncCursorStore,
    transport: Arc<dyn ChannelTransport>,
    config: PollingChannelConfig,
    inbox: Arc<Mailbox<SyncOperation>>,
    outbox: Arc<Mailbox<SyncOperation>>,
    dead_letter: Arc<Mailbox<SyncOperation>>,
    attempts: Mutex<HashMap<String, u32>>,
    shut_down: AtomicBool,
    ids: UuidIdGen,
}

impl PollingChannel {
    pub fn new(
        remote_name: impl Into<String>,
        cursors: SyncCursorStore,
        transport: Arc<dyn ChannelTransport>,
        config: PollingChannelConfig,
    ) -> Self {
        Self {
            remote_name: remote_name.into(),
            cursors,
            transport,
            config,
            inbox: Arc::new(Mailbox::new()),
            outbox: Arc::new(Mailbox::new()),
            dead_letter: Arc::new(Mailbox::new()),
            attempts: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
            ids: UuidIdGen,
        }
    }

    /// Acknowledge everything up to `ordinal` (cumulative).
    ///
    /// The cursor is clamped non-decreasing by the store; outbox entries
    /// fully covered by the stored cursor leave as `Applied`. Repeating
    /// an ordinal is a no-op.
    pub async fn update_cursor(
        &self,
        ordinal: u64,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let stored = self
            .cursors
            .put_cursor(
                RemoteCursor {
                    remote_name: self.remote_name.clone(),
                    cursor_ordinal: ordinal,
                    last_synced_at_utc_ms: Some(Utc::now().timestamp_millis()),
                },
                cancel,
            )
            .await
            .map_err(ReactorError::storage)?;

        let mut acked = self.outbox.drain_up_to_ordinal(stored.cursor_ordinal);
        for item in &mut acked {
            item.executed();
            self.attempts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&item.id);
        }
        if !acked.is_empty() {
            tracing::debug!(
                remote = %self.remote_name,
                cursor = stored.cursor_ordinal,
                acked = acked.len(),
                "outbox entries acknowledged"
            );
        }
        Ok(())
    }

    /// Acknowledged cursor position for this remote
    pub async fn cursor(&self, cancel: &CancellationToken) -> Result<u64, ReactorError> {
        let cursor = self
            .cursors
            .get_cursor(&self.remote_name, cancel)
            .await
            .map_err(ReactorError::storage)?;
        Ok(cursor.cursor_ordinal)
    }

    fn bump_attempts(&self, id: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let count = attempts.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl Channel for PollingChannel {
    fn channel_id(&self) -> &str {
        &self.remote_name
    }

    fn inbox(&self) -> &Arc<Mailbox<SyncOperation>> {
        &self.inbox
    }

    fn outbox(&self) -> &Arc<Mailbox<SyncOperation>> {
        &self.outbox
    }

    fn dead_letter(&self) -> &Arc<Mailbox<SyncOperation>> {
        &self.dead_letter
    }

    async fn receive(
        &self,
        envelope: SyncEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ReactorError::ChannelShutDown {
                channel_id: self.remote_name.clone(),
            });
        }
        bail_if_cancelled(cancel)?;

        let SyncEnvelope::Operations { operations } = envelope;
        let mut per_stream: BTreeMap<(String, String), Vec<_>> = BTreeMap::new();
        for op in operations {
            per_stream
                .entry((op.context.document_id.clone(), op.context.branch.clone()))
                .or_default()
                .push(op);
        }

        let batch: Vec<SyncOperation> = per_stream
            .into_iter()
            .map(|((document_id, branch), operations)| {
                SyncOperation::new(self.ids.next(), document_id, branch, operations)
                    .with_status(SyncOperationStatus::ExecutionPending)
            })
            .collect();
        self.inbox.add(batch);
        Ok(())
    }

    async fn flush(&self, cancel: &CancellationToken) -> Result<(), ReactorError> {
        bail_if_cancelled(cancel)?;
        for mut item in self.outbox.items() {
            bail_if_cancelled(cancel)?;
            // ExecutionPending means a prior flush delivered it; it sits
            // in the outbox awaiting the cursor ack.
            if !matches!(
                item.status,
                SyncOperationStatus::Unknown | SyncOperationStatus::TransportPending
            ) {
                continue;
            }
            let envelope = SyncEnvelope::operations(item.operations.clone());
            match self.transport.send(&self.remote_name, &envelope).await {
                Ok(()) => {
                    item.transported();
                    self.outbox.update(item);
                }
                Err(err) => {
                    let attempts = self.bump_attempts(&item.id);
                    if attempts > self.config.retry_limit {
                        tracing::warn!(
                            remote = %self.remote_name,
                            sync_op = %item.id,
                            attempts,
                            error = %err,
                            "delivery retries exhausted; dead-lettering"
                        );
                        self.outbox.remove(&item.id);
                        item.failed(ErrorInfo::from(&err));
                        self.dead_letter.add(vec![item]);
                    } else {
                        tracing::debug!(
                            remote = %self.remote_name,
                            sync_op = %item.id,
                            attempts,
                            error = %err,
                            "delivery failed; will retry"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn init(&self, cancel: &CancellationToken) -> Result<(), ReactorError> {
        let cursor = self.cursor(cancel).await?;
        tracing::info!(remote = %self.remote_name, cursor, "sync channel initialized");
        Ok(())
    }

    async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
