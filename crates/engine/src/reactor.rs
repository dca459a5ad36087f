// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reactor facade: the single entry point callers hold
//!
//! Wires the storage layer, job pipeline, read models, and optional
//! sync into one object. Writes become tracked jobs flowing through the
//! per-stream queue; reads hit the write cache and document view. A
//! completed job guarantees read-your-writes because pre-ready models
//! index before the tracker flips the job terminal.

use crate::cache::{WriteCache, WriteCacheConfig};
use crate::coordinator::{
    LoggingErrorHandler, ReadModel, ReadModelCoordinator, SubscriptionErrorHandler,
};
use crate::lifecycle::DOCUMENT_SCOPE;
use crate::queue::JobQueue;
use crate::registry::DocumentModelRegistry;
use crate::resolver::ModelResolver;
use crate::subscriptions::{SubscriptionReadModel, SubscriptionSink};
use crate::tracker::JobTracker;
use crate::verifier::SignatureVerifier;
use crate::view::DocumentView;
use crate::worker::JobWorker;
use async_trait::async_trait;
use chrono::Utc;
use keel_adapters::{ChannelTransport, DocumentModelLoader, SignatureVerification};
use keel_core::{
    Action, ActionKind, CancellationToken, Document, DocumentModel, ErrorInfo, EventBus, IdGen,
    Job, JobEventPayload, JobId, JobKind, JobRequest, OperationWithContext, ReactorConfig,
    ReactorError, ReactorEvent, UpgradeManifest, UuidIdGen,
};
use keel_storage::{
    migrate, KeyframeStore, OperationIndex, OperationIndexConfig, Page, Paging, SyncCursorStore,
    ViewFilter,
};
use keel_sync::{
    ChannelFactory, JobSubmitter, PollTimerConfig, PollingChannelConfig, PollingChannelFactory,
    SyncManager, SyncManagerConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What to create; a missing id is minted
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub document_id: Option<String>,
    pub document_type: String,
    pub slug: Option<String>,
    pub version: Option<u32>,
}

/// One entry of a `mutate_batch` call.
///
/// `depends_on` names other plans in the same batch by their `key`; the
/// reactor resolves keys to job ids before anything is queued.
#[derive(Debug, Clone)]
pub struct MutationPlan {
    pub key: String,
    pub document_id: String,
    pub scope: String,
    pub branch: String,
    pub actions: Vec<Action>,
    pub depends_on: Vec<String>,
}

/// The assembled document-synchronization reactor
pub struct Reactor {
    config: ReactorConfig,
    bus: EventBus,
    index: Arc<OperationIndex>,
    cache: Arc<WriteCache>,
    queue: Arc<JobQueue>,
    tracker: Arc<JobTracker>,
    worker: Arc<JobWorker>,
    coordinator: Arc<ReadModelCoordinator>,
    registry: Arc<DocumentModelRegistry>,
    view: Arc<DocumentView>,
    sync: Mutex<Option<Arc<SyncManager>>>,
    /// Types of documents created through this instance, for job
    /// requests submitted before the view has indexed the create
    created_types: Mutex<HashMap<String, String>>,
    ids: UuidIdGen,
    killed: AtomicBool,
}

impl Reactor {
    pub fn builder(config: ReactorConfig) -> ReactorBuilder {
        ReactorBuilder::new(config)
    }

    /// Submit a CREATE_DOCUMENT job; returns the (possibly minted)
    /// document id and the job to wait on
    pub async fn create(
        &self,
        document: NewDocument,
        collection_id: Option<String>,
    ) -> Result<(String, JobId), ReactorError> {
        let document_id = document
            .document_id
            .unwrap_or_else(|| self.ids.next());
        let input = serde_json::json!({
            "document_type": document.document_type,
            "slug": document.slug,
            "version": document.version,
            "collection_id": collection_id,
        });
        let action = Action::new(
            self.ids.next(),
            ActionKind::CREATE_DOCUMENT,
            DOCUMENT_SCOPE,
            Utc::now().timestamp_millis(),
            input,
        );
        self.created_types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document_id.clone(), document.document_type.clone());
        let job = self.request(
            &document_id,
            &document.document_type,
            DOCUMENT_SCOPE,
            Document::MAIN_BRANCH,
            JobKind::Mutate {
                actions: vec![action],
            },
            Vec::new(),
        );
        let job_id = self.submit(job).await?;
        Ok((document_id, job_id))
    }

    /// Submit actions against one stream of an existing document
    pub async fn mutate(
        &self,
        document_id: &str,
        scope: &str,
        branch: &str,
        actions: Vec<Action>,
    ) -> Result<JobId, ReactorError> {
        let document_type = self.resolve_document_type(document_id)?;
        let job = self.request(
            document_id,
            &document_type,
            scope,
            branch,
            JobKind::Mutate { actions },
            Vec::new(),
        );
        self.submit(job).await
    }

    /// Submit several plans at once; `depends_on` keys become job-id
    /// dependencies the queue enforces
    pub async fn mutate_batch(
        &self,
        plans: Vec<MutationPlan>,
    ) -> Result<HashMap<String, JobId>, ReactorError> {
        let mut job_ids: HashMap<String, JobId> = HashMap::with_capacity(plans.len());
        for plan in &plans {
            job_ids.insert(plan.key.clone(), JobId(self.ids.next()));
        }

        let mut jobs = Vec::with_capacity(plans.len());
        for plan in plans {
            let mut depends_on = Vec::with_capacity(plan.depends_on.len());
            for key in &plan.depends_on {
                let id = job_ids.get(key).ok_or_else(|| {
                    ReactorError::Internal(format!("unknown batch dependency key: {key}"))
                })?;
                depends_on.push(id.clone());
            }
            let document_type = self.resolve_document_type(&plan.document_id)?;
            let mut job = self.request(
                &plan.document_id,
                &document_type,
                &plan.scope,
                &plan.branch,
                JobKind::Mutate {
                    actions: plan.actions,
                },
                depends_on,
            );
            job.id = job_ids[&plan.key].clone();
            jobs.push(job);
        }
        for job in jobs {
            self.submit(job).await?;
        }
        Ok(job_ids)
    }

    /// Inject already-formed operations (the sync inbound path)
    pub async fn load(
        &self,
        document_id: &str,
        branch: &str,
        operations: Vec<OperationWithContext>,
        source_remote: Option<String>,
    ) -> Result<JobId, ReactorError> {
        let first = operations.first().ok_or_else(|| {
            ReactorError::Internal(format!("load for {document_id} carries no operations"))
        })?;
        let document_type = first.context.document_type.clone();
        let scope = first.context.scope.clone();
        let job = self.request(
            document_id,
            &document_type,
            &scope,
            branch,
            JobKind::Load {
                operations,
                source_remote,
            },
            Vec::new(),
        );
        self.submit(job).await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<JobId, ReactorError> {
        let action = Action::new(
            self.ids.next(),
            ActionKind::DELETE_DOCUMENT,
            DOCUMENT_SCOPE,
            Utc::now().timestamp_millis(),
            serde_json::json!({}),
        );
        self.mutate(document_id, DOCUMENT_SCOPE, Document::MAIN_BRANCH, vec![action])
            .await
    }

    pub async fn add_children(
        &self,
        parent_id: &str,
        child_ids: &[String],
    ) -> Result<JobId, ReactorError> {
        self.relationship_job(parent_id, child_ids, ActionKind::ADD_RELATIONSHIP)
            .await
    }

    pub async fn remove_children(
        &self,
        parent_id: &str,
        child_ids: &[String],
    ) -> Result<JobId, ReactorError> {
        self.relationship_job(parent_id, child_ids, ActionKind::REMOVE_RELATIONSHIP)
            .await
    }

    /// Current state of one stream; defaults to the document scope on
    /// the main branch
    pub async fn get(
        &self,
        document_id: &str,
        scope: Option<&str>,
        branch: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Document, ReactorError> {
        self.cache
            .get_state(
                document_id,
                scope.unwrap_or(DOCUMENT_SCOPE),
                branch.unwrap_or(Document::MAIN_BRANCH),
                None,
                cancel,
            )
            .await
    }

    pub async fn get_by_slug(
        &self,
        slug: &str,
        cancel: &CancellationToken,
    ) -> Result<Document, ReactorError> {
        let row = self
            .view
            .get_by_slug(slug)
            .ok_or_else(|| ReactorError::DocumentNotFound {
                document_id: slug.to_string(),
            })?;
        self.cache
            .get_state(&row.document_id, &row.scope, &row.branch, None, cancel)
            .await
    }

    pub async fn get_operations(
        &self,
        document_id: &str,
        scope: Option<&str>,
        branch: Option<&str>,
        paging: Option<Paging>,
        cancel: &CancellationToken,
    ) -> Result<Vec<OperationWithContext>, ReactorError> {
        let mut operations = self
            .index
            .get_stream_operations(
                document_id,
                scope.unwrap_or(DOCUMENT_SCOPE),
                branch.unwrap_or(Document::MAIN_BRANCH),
                0,
                None,
                cancel,
            )
            .await
            .map_err(ReactorError::storage)?;
        if let Some(paging) = paging {
            operations.truncate(paging.limit);
        }
        Ok(operations)
    }

    /// Page through a collection's operations in commit order
    pub async fn find(
        &self,
        collection_id: &str,
        cursor: Option<u64>,
        filter: Option<&ViewFilter>,
        paging: Option<Paging>,
        cancel: &CancellationToken,
    ) -> Result<Page<OperationWithContext>, ReactorError> {
        self.index
            .find(
                collection_id,
                cursor,
                filter,
                paging.unwrap_or_default(),
                cancel,
            )
            .await
            .map_err(ReactorError::storage)
    }

    pub fn get_job_status(&self, job_id: &JobId) -> Job {
        self.tracker.get_status(job_id)
    }

    /// Resolve once the job reaches a terminal status
    pub async fn wait_for_job(&self, job_id: &JobId) -> Job {
        self.tracker.wait_for_terminal(job_id).await
    }

    /// Document types with a registered model
    pub fn document_models(&self) -> Vec<String> {
        self.registry.document_types()
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn view(&self) -> &Arc<DocumentView> {
        &self.view
    }

    pub fn sync_manager(&self) -> Option<Arc<SyncManager>> {
        self.sync.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stop the worker, coordinator, and sync; a second call is a no-op
    pub async fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        let sync = self.sync.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sync) = sync {
            sync.shutdown().await;
        }
        self.worker.stop();
        self.coordinator.stop();
        self.cache.shutdown().await;
        tracing::info!("reactor stopped");
    }

    async fn relationship_job(
        &self,
        parent_id: &str,
        child_ids: &[String],
        kind: &str,
    ) -> Result<JobId, ReactorError> {
        let actions = child_ids
            .iter()
            .map(|child_id| {
                Action::new(
                    self.ids.next(),
                    kind,
                    DOCUMENT_SCOPE,
                    Utc::now().timestamp_millis(),
                    serde_json::json!({
                        "parent_id": parent_id,
                        "child_id": child_id,
                    }),
                )
            })
            .collect();
        self.mutate(parent_id, DOCUMENT_SCOPE, Document::MAIN_BRANCH, actions)
            .await
    }

    fn resolve_document_type(&self, document_id: &str) -> Result<String, ReactorError> {
        if let Some(document_type) = self.view.document_type(document_id) {
            return Ok(document_type);
        }
        self.created_types
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(document_id)
            .cloned()
            .ok_or_else(|| ReactorError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    fn request(
        &self,
        document_id: &str,
        document_type: &str,
        scope: &str,
        branch: &str,
        kind: JobKind,
        depends_on: Vec<JobId>,
    ) -> JobRequest {
        JobRequest {
            id: JobId(self.ids.next()),
            document_id: document_id.to_string(),
            document_type: document_type.to_string(),
            scope: scope.to_string(),
            branch: branch.to_string(),
            kind,
            depends_on,
            retry_count: 0,
            max_retries: self.config.executor.max_retries,
            queued_at_utc: Utc::now(),
        }
    }

    /// Register, announce, enqueue. A rejected enqueue fails the
    /// tracked job so callers polling status see the outcome.
    async fn submit(&self, job: JobRequest) -> Result<JobId, ReactorError> {
        let job_id = job.id.clone();
        self.tracker.register(&job_id);
        if let Err(err) = self
            .bus
            .emit(ReactorEvent::JobPending(JobEventPayload {
                job_id: job_id.clone(),
            }))
            .await
        {
            tracing::warn!(job_id = %job_id, error = %err, "job-pending subscriber failed");
        }
        if let Err(err) = self.queue.enqueue(job).await {
            self.tracker.mark_failed(&job_id, ErrorInfo::from(&err));
            return Err(err);
        }
        Ok(job_id)
    }
}

#[async_trait]
impl JobSubmitter for Reactor {
    async fn submit_load(
        &self,
        document_id: &str,
        branch: &str,
        operations: Vec<OperationWithContext>,
        source_remote: Option<String>,
    ) -> Result<Job, ReactorError> {
        let job_id = self
            .load(document_id, branch, operations, source_remote)
            .await?;
        Ok(self.tracker.wait_for_terminal(&job_id).await)
    }
}

/// Assembles a [`Reactor`] from a config plus injected adapters
pub struct ReactorBuilder {
    config: ReactorConfig,
    models: Vec<Arc<dyn DocumentModel>>,
    manifests: Vec<UpgradeManifest>,
    loader: Option<Arc<dyn DocumentModelLoader>>,
    signatures: Option<Arc<dyn SignatureVerification>>,
    subscription_sink: Option<Arc<dyn SubscriptionSink>>,
    error_handler: Arc<dyn SubscriptionErrorHandler>,
    channel_factory: Option<Arc<dyn ChannelFactory>>,
    transport: Option<Arc<dyn ChannelTransport>>,
}

impl ReactorBuilder {
    pub fn new(config: ReactorConfig) -> Self {
        Self {
            config,
            models: Vec::new(),
            manifests: Vec::new(),
            loader: None,
            signatures: None,
            subscription_sink: None,
            error_handler: Arc::new(LoggingErrorHandler),
            channel_factory: None,
            transport: None,
        }
    }

    pub fn with_models(mut self, models: Vec<Arc<dyn DocumentModel>>) -> Self {
        self.models.extend(models);
        self
    }

    pub fn with_upgrade_manifest(mut self, manifest: UpgradeManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn DocumentModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_signature_verification(
        mut self,
        handler: Arc<dyn SignatureVerification>,
    ) -> Self {
        self.signatures = Some(handler);
        self
    }

    pub fn with_subscription_sink(mut self, sink: Arc<dyn SubscriptionSink>) -> Self {
        self.subscription_sink = Some(sink);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn SubscriptionErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Enable sync with a custom channel factory
    pub fn with_channel_factory(mut self, factory: Arc<dyn ChannelFactory>) -> Self {
        self.channel_factory = Some(factory);
        self
    }

    /// Enable sync with polling channels over this transport
    pub fn with_transport(mut self, transport: Arc<dyn ChannelTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Run migrations, open the stores, start the pipeline, and bring
    /// persisted sync remotes online
    pub async fn build(self) -> Result<Arc<Reactor>, ReactorError> {
        let config = self.config;
        let root = config.storage_dir.clone();
        migrate(&root).map_err(ReactorError::storage)?;

        let index = Arc::new(
            OperationIndex::open(&root.join("index"), OperationIndexConfig::default())
                .map_err(ReactorError::storage)?,
        );
        let keyframes =
            Arc::new(KeyframeStore::open(root.join("keyframes")).map_err(ReactorError::storage)?);
        let cursors = SyncCursorStore::open(root.join("sync")).map_err(ReactorError::storage)?;

        let bus = EventBus::new();
        let registry = Arc::new(DocumentModelRegistry::new());
        registry.register_modules(self.models)?;
        for manifest in self.manifests {
            registry.register_upgrade_manifest(manifest)?;
        }
        let resolver = Arc::new(match self.loader {
            Some(loader) => ModelResolver::new(registry.clone(), loader),
            None => ModelResolver::null(registry.clone()),
        });
        let verifier = Arc::new(match self.signatures {
            Some(handler) => SignatureVerifier::new(handler),
            None => SignatureVerifier::disabled(),
        });

        let cache = Arc::new(WriteCache::new(
            WriteCacheConfig {
                max_documents: config.cache.max_documents,
                ring_capacity: config.cache.ring_capacity,
                keyframe_interval: config.cache.keyframe_interval,
            },
            index.clone(),
            keyframes.clone(),
            registry.clone(),
        ));
        cache.startup().await;

        let queue = Arc::new(JobQueue::new(bus.clone(), resolver.clone()));
        let tracker = Arc::new(JobTracker::new());
        let executor = Arc::new(crate::executor::JobExecutor::new(
            index.clone(),
            cache.clone(),
            resolver.clone(),
            verifier.clone(),
            bus.clone(),
        ));
        let worker = Arc::new(JobWorker::new(
            queue.clone(),
            executor,
            tracker.clone(),
            bus.clone(),
        ));

        let startup_cancel = CancellationToken::new();
        let view = Arc::new(DocumentView::open(root.join("view"), index.clone())?);
        view.init(&startup_cancel).await?;

        let mut read_models: Vec<Arc<dyn ReadModel>> = vec![view.clone()];
        if let Some(sink) = self.subscription_sink {
            read_models.push(Arc::new(SubscriptionReadModel::new(sink)));
        }
        let coordinator = Arc::new(ReadModelCoordinator::new(
            bus.clone(),
            read_models,
            self.error_handler,
        ));
        coordinator.start();
        worker.start();

        let factory: Option<Arc<dyn ChannelFactory>> = self.channel_factory.or_else(|| {
            self.transport.map(|transport| {
                Arc::new(PollingChannelFactory::new(
                    cursors.clone(),
                    transport,
                    PollingChannelConfig {
                        retry_limit: config.sync.retry_limit,
                    },
                )) as Arc<dyn ChannelFactory>
            })
        });

        let reactor = Arc::new(Reactor {
            config: config.clone(),
            bus: bus.clone(),
            index: index.clone(),
            cache,
            queue,
            tracker,
            worker,
            coordinator,
            registry,
            view,
            sync: Mutex::new(None),
            created_types: Mutex::new(HashMap::new()),
            ids: UuidIdGen,
            killed: AtomicBool::new(false),
        });

        if let Some(factory) = factory {
            let sync_config = SyncManagerConfig {
                timer: PollTimerConfig {
                    interval: config.sync.poll_interval,
                    backpressure_check_interval: config.sync.backpressure_check_interval,
                    max_queue_depth: config.sync.max_queue_depth,
                    base_backoff: config.sync.base_backoff,
                    max_backoff: config.sync.max_backoff,
                },
                channel: PollingChannelConfig {
                    retry_limit: config.sync.retry_limit,
                },
            };
            let manager = Arc::new(SyncManager::new(
                index,
                cursors,
                bus,
                reactor.clone() as Arc<dyn JobSubmitter>,
                factory,
                sync_config,
            ));
            manager.startup(&startup_cancel).await?;
            *reactor.sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(manager);
        }

        tracing::info!(storage_dir = %root.display(), "reactor started");
        Ok(reactor)
    }
}

#[cfg(test)]
#[path = "reactor_tests.rs"]
mod tests;
