// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync manager: the registry of remotes and the glue between the
//! reactor and its channels
//!
//! Remotes are persisted as records in the cursor store and rebuilt on
//! startup. Outbound, the manager listens for committed operations and
//! batches the ones each remote should see into that remote's outbox,
//! skipping operations that arrived from the remote itself. Inbound,
//! inbox batches become Load jobs through the injected submitter; a
//! failed job dead-letters the batch instead of raising.

use crate::channel::{Channel, PollingChannel, PollingChannelConfig};
use crate::timer::{IntervalPollTimer, PollDelegate, PollTimerConfig};
use async_trait::async_trait;
use keel_adapters::ChannelTransport;
use keel_core::{
    handler, CancellationToken, ErrorInfo, EventBus, EventKind, IdGen, Job, JobStatus,
    OperationWithContext, ReactorError, ReactorEvent, SubscriberId, SyncEnvelope, SyncOperation,
    SyncOperationStatus, UuidIdGen,
};
use keel_storage::{OperationIndex, Paging, RemoteRecord, SyncCursorStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};

/// Hands inbound operation batches to the reactor as Load jobs
#[async_trait]
pub trait JobSubmitter: Send + Sync + 'static {
    /// Submit and wait for the terminal job record
    async fn submit_load(
        &self,
        document_id: &str,
        branch: &str,
        operations: Vec<OperationWithContext>,
        source_remote: Option<String>,
    ) -> Result<Job, ReactorError>;
}

/// Builds a channel for a remote record
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    async fn build(&self, record: &RemoteRecord) -> Result<Arc<dyn Channel>, ReactorError>;
}

/// Builds [`PollingChannel`]s over one shared transport; the transport
/// routes by remote name
pub struct PollingChannelFactory {
    cursors: SyncCursorStore,
    transport: Arc<dyn ChannelTransport>,
    config: PollingChannelConfig,
}

impl PollingChannelFactory {
    pub fn new(
        cursors: SyncCursorStore,
        transport: Arc<dyn ChannelTransport>,
        config: PollingChannelConfig,
    ) -> Self {
        Self {
            cursors,
            transport,
            config,
        }
    }
}

#[async_trait]
impl ChannelFactory for PollingChannelFactory {
    async fn build(&self, record: &RemoteRecord) -> Result<Arc<dyn Channel>, ReactorError> {
        Ok(Arc::new(PollingChannel::new(
            record.name.clone(),
            self.cursors.clone(),
            self.transport.clone(),
            self.config,
        )))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncManagerConfig {
    pub timer: PollTimerConfig,
    pub channel: PollingChannelConfig,
}

struct RemoteState {
    record: RemoteRecord,
    channel: Arc<dyn Channel>,
    timer: Arc<IntervalPollTimer>,
}

/// Per-channel delegate the poll timer drives
struct ChannelPollDelegate {
    channel: Arc<dyn Channel>,
}

#[async_trait]
impl PollDelegate for ChannelPollDelegate {
    async fn poll(&self, cancel: &CancellationToken) -> Result<(), ReactorError> {
        self.channel.flush(cancel).await
    }

    fn queue_depth(&self) -> Result<usize, ReactorError> {
        Ok(self.channel.inbox().len() + self.channel.outbox().len())
    }
}

/// Coordinates every configured sync remote
pub struct SyncManager {
    index: Arc<OperationIndex>,
    cursors: SyncCursorStore,
    bus: EventBus,
    submitter: Arc<dyn JobSubmitter>,
    factory: Arc<dyn ChannelFactory>,
    config: SyncManagerConfig,
    remotes: Mutex<HashMap<String, RemoteState>>,
    subscriber: Mutex<Option<SubscriberId>>,
    ids: UuidIdGen,
}

impl SyncManager {
    pub fn new(
        index: Arc<OperationIndex>,
        cursors: SyncCursorStore,
        bus: EventBus,
        submitter: Arc<dyn JobSubmitter>,
        factory: Arc<dyn ChannelFactory>,
        config: SyncManagerConfig,
    ) -> Self {
        Self {
            index,
            cursors,
            bus,
            submitter,
            factory,
            config,
            remotes: Mutex::new(HashMap::new()),
            subscriber: Mutex::new(None),
            ids: UuidIdGen,
        }
    }

    /// Rebuild persisted remotes and subscribe to the write fan-out
    pub async fn startup(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let records = self
            .cursors
            .list_remotes(cancel)
            .await
            .map_err(ReactorError::storage)?;
        for record in records {
            self.register_remote(record, cancel).await?;
        }

        let mut subscriber = self.subscriber.lock().unwrap_or_else(|e| e.into_inner());
        if subscriber.is_none() {
            let manager = Arc::downgrade(self);
            let id = self.bus.subscribe(
                &[EventKind::OperationsWritten],
                handler(move |event| {
                    let manager = manager.clone();
                    async move {
                        let ReactorEvent::OperationsWritten(payload) = event else {
                            return Ok(());
                        };
                        let Some(manager) = manager.upgrade() else {
                            return Ok(());
                        };
                        if let Err(err) = manager.handle_written(payload.operations).await {
                            tracing::warn!(error = %err, "outbound sync fan-out failed");
                        }
                        Ok(())
                    }
                }),
            );
            *subscriber = Some(id);
        }
        Ok(())
    }

    /// Unsubscribe, shut every channel down, drop the remotes
    pub async fn shutdown(&self) {
        if let Some(id) = self
            .subscriber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.bus.unsubscribe(id);
        }
        let states: Vec<RemoteState> = {
            let mut remotes = self.remotes.lock().unwrap_or_else(|e| e.into_inner());
            remotes.drain().map(|(_, state)| state).collect()
        };
        for state in states {
            state.timer.stop();
            state.channel.shutdown().await;
        }
    }

    /// Persist a remote record and bring its channel online, backfilling
    /// the outbox from the acknowledged cursor.
    ///
    /// Remote names are unique; one channel per name keeps cumulative
    /// cursor acks unambiguous.
    pub async fn add_remote(
        self: &Arc<Self>,
        record: RemoteRecord,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        {
            let remotes = self.remotes.lock().unwrap_or_else(|e| e.into_inner());
            if remotes.contains_key(&record.name) {
                return Err(ReactorError::DuplicateRemote {
                    name: record.name.clone(),
                });
            }
        }
        self.cursors
            .put_remote(&record, cancel)
            .await
            .map_err(ReactorError::storage)?;
        self.register_remote(record, cancel).await
    }

    /// Drop a remote: channel, timer, record, and cursor
    pub async fn remove_remote(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let state = self
            .remotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
        if let Some(state) = state {
            state.timer.stop();
            state.channel.shutdown().await;
        }
        self.cursors
            .delete_remote(name, cancel)
            .await
            .map_err(ReactorError::storage)?;
        self.cursors
            .delete_cursor(name, cancel)
            .await
            .map_err(ReactorError::storage)?;
        Ok(())
    }

    pub fn remote_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .remotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn channel(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.remotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|state| state.channel.clone())
    }

    /// Route an inbound envelope to the named remote's channel
    pub async fn receive(
        &self,
        remote_name: &str,
        envelope: SyncEnvelope,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let channel = self.channel(remote_name).ok_or_else(|| {
            ReactorError::Internal(format!("unknown sync remote: {remote_name}"))
        })?;
        channel.receive(envelope, cancel).await
    }

    async fn register_remote(
        self: &Arc<Self>,
        record: RemoteRecord,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        let channel = self.factory.build(&record).await?;
        channel.init(cancel).await?;

        // Inbound batches become Load jobs off the mailbox callback.
        // Weak references keep the mailbox-held closures from pinning
        // the channel alive after removal.
        let submitter = self.submitter.clone();
        let inbound_channel = Arc::downgrade(&channel);
        let remote_name = record.name.clone();
        channel.inbox().on_added(move |batch| {
            let Some(channel) = inbound_channel.upgrade() else {
                return;
            };
            let submitter = submitter.clone();
            let remote_name = remote_name.clone();
            let batch = batch.to_vec();
            tokio::spawn(async move {
                process_inbound(submitter, channel, remote_name, batch).await;
            });
        });

        // Entries arriving already terminal never wait for an ack.
        let outbox = Arc::downgrade(channel.outbox());
        channel.outbox().on_added(move |batch: &[SyncOperation]| {
            let Some(outbox) = Weak::upgrade(&outbox) else {
                return;
            };
            for item in batch {
                if item.status.is_terminal() {
                    outbox.remove(&item.id);
                }
            }
        });

        self.backfill_outbox(&record, channel.as_ref(), cancel).await?;

        let timer = Arc::new(IntervalPollTimer::new(
            Arc::new(ChannelPollDelegate {
                channel: channel.clone(),
            }),
            self.config.timer,
        ));
        timer.start();

        self.remotes.lock().unwrap_or_else(|e| e.into_inner()).insert(
            record.name.clone(),
            RemoteState {
                record,
                channel,
                timer,
            },
        );
        Ok(())
    }

    /// Refill the outbox with everything past the remote's cursor
    async fn backfill_outbox(
        &self,
        record: &RemoteRecord,
        channel: &dyn Channel,
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError> {
        // A remote may be registered before its collection sees a first write.
        if !self.index.collection_exists(&record.collection_id) {
            return Ok(());
        }

        let cursor = self
            .cursors
            .get_cursor(&record.name, cancel)
            .await
            .map_err(ReactorError::storage)?;

        let mut page_cursor = (cursor.cursor_ordinal > 0).then_some(cursor.cursor_ordinal);
        let mut pending: Vec<OperationWithContext> = Vec::new();
        loop {
            let page = self
                .index
                .find(
                    &record.collection_id,
                    page_cursor,
                    Some(&record.filter),
                    Paging::default(),
                    cancel,
                )
                .await
                .map_err(ReactorError::storage)?;
            pending.extend(
                page.items
                    .into_iter()
                    .filter(|op| op.context.source_remote != record.name),
            );
            match page.next_cursor {
                Some(next) => page_cursor = Some(next),
                None => break,
            }
        }

        let batch = self.batch_per_stream(pending);
        if !batch.is_empty() {
            tracing::info!(
                remote = %record.name,
                batches = batch.len(),
                "outbox backfilled from cursor"
            );
            channel.outbox().add(batch);
        }
        Ok(())
    }

    /// Fan a committed write out to every remote that should see it
    async fn handle_written(
        &self,
        operations: Vec<OperationWithContext>,
    ) -> Result<(), ReactorError> {
        let cancel = CancellationToken::new();
        let mut document_ids: Vec<String> = operations
            .iter()
            .map(|op| op.context.document_id.clone())
            .collect();
        document_ids.sort();
        document_ids.dedup();
        let memberships = self
            .index
            .get_collections_for_documents(&document_ids, &cancel)
            .await
            .map_err(ReactorError::storage)?;

        let targets: Vec<(RemoteRecord, Arc<dyn Channel>)> = {
            let remotes = self.remotes.lock().unwrap_or_else(|e| e.into_inner());
            remotes
                .values()
                .map(|state| (state.record.clone(), state.channel.clone()))
                .collect()
        };

        for (record, channel) in targets {
            let matching: Vec<OperationWithContext> = operations
                .iter()
                .filter(|op| {
                    op.context.source_remote != record.name
                        && record.filter.matches(op)
                        && memberships
                            .get(&op.context.document_id)
                            .map(|collections| {
                                collections.iter().any(|c| *c == record.collection_id)
                            })
                            .unwrap_or(false)
                })
                .cloned()
                .collect();
            let batch = self.batch_per_stream(matching);
            if !batch.is_empty() {
                channel.outbox().add(batch);
            }
        }
        Ok(())
    }

    fn batch_per_stream(&self, operations: Vec<OperationWithContext>) -> Vec<SyncOperation> {
        let mut per_stream: BTreeMap<(String, String), Vec<OperationWithContext>> =
            BTreeMap::new();
        for op in operations {
            per_stream
                .entry((op.context.document_id.clone(), op.context.branch.clone()))
                .or_default()
                .push(op);
        }
        per_stream
            .into_iter()
            .map(|((document_id, branch), operations)| {
                SyncOperation::new(self.ids.next(), document_id, branch, operations)
                    .with_status(SyncOperationStatus::TransportPending)
            })
            .collect()
    }
}

/// Apply one inbox batch through the reactor; the inbox entry leaves
/// either way, failures go to the dead letter with the job's error
async fn process_inbound(
    submitter: Arc<dyn JobSubmitter>,
    channel: Arc<dyn Channel>,
    remote_name: String,
    batch: Vec<SyncOperation>,
) {
    for mut item in batch {
        let outcome = submitter
            .submit_load(
                &item.document_id,
                &item.branch,
                item.operations.clone(),
                Some(remote_name.clone()),
            )
            .await;
        let error = match outcome {
            Ok(job) if job.status == JobStatus::Completed => None,
            Ok(job) => Some(
                job.error
                    .unwrap_or_else(|| ErrorInfo::new("load job failed")),
            ),
            Err(err) => Some(ErrorInfo::from(&err)),
        };
        channel.inbox().remove(&item.id);
        match error {
            None => {
                item.executed();
            }
            Some(error) => {
                tracing::warn!(
                    remote = %remote_name,
                    sync_op = %item.id,
                    error = %error.message,
                    "inbound batch failed; dead-lettering"
                );
                item.failed(error);
                channel.dead_letter().add(vec![item]);
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
