// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-model coordinator: fans committed operations into projections
//!
//! Pre-ready models finish before `JobReadReady` is announced, so a
//! caller observing that event (or a completed job) reads its own
//! writes. Post-ready models run after the announcement; their failures
//! reach the error handler, never the writer.

use async_trait::async_trait;
use keel_core::{
    handler, CancellationToken, ErrorInfo, EventBus, EventKind, OperationWithContext,
    ReactorError, ReactorEvent, SubscriberId, WriteReadyPayload,
};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

/// When a read model is brought up to date relative to `JobReadReady`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadModelPhase {
    /// Must index before the write is announced readable; a failure
    /// fails the job
    PreReady,
    /// Indexes after the announcement; failures are reported, not
    /// propagated
    PostReady,
}

/// A projection fed from committed operations
#[async_trait]
pub trait ReadModel: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn phase(&self) -> ReadModelPhase;
    async fn index_operations(
        &self,
        operations: &[OperationWithContext],
        cancel: &CancellationToken,
    ) -> Result<(), ReactorError>;
}

/// Receives post-ready projection failures
pub trait SubscriptionErrorHandler: Send + Sync + 'static {
    fn on_error(&self, model: &str, error: &ReactorError);
}

/// Logs failures; the default handler
pub struct LoggingErrorHandler;

impl SubscriptionErrorHandler for LoggingErrorHandler {
    fn on_error(&self, model: &str, error: &ReactorError) {
        tracing::error!(model, %error, "post-ready read model failed");
    }
}

pub struct ReadModelCoordinator {
    bus: EventBus,
    pre_ready: Vec<Arc<dyn ReadModel>>,
    post_ready: Vec<Arc<dyn ReadModel>>,
    error_handler: Arc<dyn SubscriptionErrorHandler>,
    cancel: CancellationToken,
    subscriber: Mutex<Option<SubscriberId>>,
}

impl ReadModelCoordinator {
    pub fn new(
        bus: EventBus,
        models: Vec<Arc<dyn ReadModel>>,
        error_handler: Arc<dyn SubscriptionErrorHandler>,
    ) -> Self {
        let (pre_ready, post_ready) = models
            .into_iter()
            .partition(|model| model.phase() == ReadModelPhase::PreReady);
        Self {
            bus,
            pre_ready,
            post_ready,
            error_handler,
            cancel: CancellationToken::new(),
            subscriber: Mutex::new(None),
        }
    }

    /// Subscribe to `JobWriteReady`; a second call is a no-op
    pub fn start(self: &Arc<Self>) {
        let mut subscriber = self.subscriber.lock().unwrap_or_else(|e| e.into_inner());
        if subscriber.is_some() {
            return;
        }
        let coordinator = Arc::clone(self);
        let id = self.bus.subscribe(
            &[EventKind::JobWriteReady],
            handler(move |event| {
                let coordinator = coordinator.clone();
                async move {
                    let ReactorEvent::JobWriteReady(payload) = event else {
                        return Ok(());
                    };
                    coordinator
                        .handle(payload)
                        .await
                        .map_err(|e| ErrorInfo::from(&e))
                }
            }),
        );
        *subscriber = Some(id);
    }

    pub fn stop(&self) {
        if let Some(id) = self
            .subscriber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.bus.unsubscribe(id);
        }
        self.cancel.cancel();
    }

    async fn handle(&self, payload: WriteReadyPayload) -> Result<(), ReactorError> {
        self.run_models(&self.pre_ready, &payload.operations, true)
            .await?;

        // Read-your-writes holds from here; waiters react to this event,
        // so their failures must not fail the already-visible write.
        if let Err(err) = self
            .bus
            .emit(ReactorEvent::JobReadReady(payload.clone()))
            .await
        {
            tracing::warn!(job_id = %payload.job_id, error = %err, "read-ready subscriber failed");
        }

        self.run_models(&self.post_ready, &payload.operations, false)
            .await
    }

    async fn run_models(
        &self,
        models: &[Arc<dyn ReadModel>],
        operations: &[OperationWithContext],
        propagate: bool,
    ) -> Result<(), ReactorError> {
        if models.is_empty() {
            return Ok(());
        }

        let mut set = JoinSet::new();
        for model in models {
            let model = Arc::clone(model);
            let operations = operations.to_vec();
            let cancel = self.cancel.child_token();
            set.spawn(async move {
                let result = model.index_operations(&operations, &cancel).await;
                (model.name().to_string(), result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((name, Err(err))) => {
                    if propagate {
                        tracing::error!(model = %name, error = %err, "pre-ready read model failed");
                        first_error.get_or_insert(err);
                    } else {
                        self.error_handler.on_error(&name, &err);
                    }
                }
                Err(join_err) => {
                    let err = ReactorError::Internal(format!("read model panicked: {join_err}"));
                    if propagate {
                        first_error.get_or_insert(err);
                    } else {
                        self.error_handler.on_error("unknown", &err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
