// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus with sequential awaited delivery and aggregate errors

use crate::error::ErrorInfo;
use crate::event::{EventKind, ReactorEvent};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// What a subscriber returns for one delivered event
pub type HandlerResult = Result<(), ErrorInfo>;

type BoxedHandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A subscriber callback; build one with [`handler`]
pub type EventHandler = Arc<dyn Fn(ReactorEvent) -> BoxedHandlerFuture + Send + Sync>;

/// Wrap an async closure into an [`EventHandler`]
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(ReactorEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Handle for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// One or more subscribers failed while handling an event.
///
/// Every subscriber still ran; the errors are collected in delivery
/// order so partial failure is never silently swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event delivery failed for {} subscriber(s)", errors.len())]
pub struct EventBusAggregateError {
    pub errors: Vec<ErrorInfo>,
}

struct Subscriber {
    id: SubscriberId,
    kinds: Vec<EventKind>,
    handler: EventHandler,
}

/// Routes reactor events to registered subscribers.
///
/// `emit` snapshots the subscriber list first, so handlers registered
/// during an emit are deferred to the next one.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Subscribe to the given event kinds; delivery follows registration
    /// order
    pub fn subscribe(&self, kinds: &[EventKind], handler: EventHandler) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.push(Subscriber {
            id,
            kinds: kinds.to_vec(),
            handler,
        });
        id
    }

    /// Remove a subscriber; unknown ids are a no-op
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|s| s.id != id);
    }

    /// Deliver an event to every matching subscriber, sequentially.
    ///
    /// All subscribers are invoked even when earlier ones fail; the
    /// collected failures come back as one aggregate error.
    pub async fn emit(&self, event: ReactorEvent) -> Result<(), EventBusAggregateError> {
        let kind = event.kind();
        let snapshot: Vec<EventHandler> = {
            let subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
            subs.iter()
                .filter(|s| s.kinds.contains(&kind))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        let mut errors = Vec::new();
        for handler in snapshot {
            if let Err(err) = handler(event.clone()).await {
                tracing::warn!(event = event.name(), error = %err.message, "subscriber failed");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EventBusAggregateError { errors })
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
