// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mailboxes: ordered, id-keyed staging areas for sync operations
//!
//! A channel keeps three of these (inbox, outbox, dead letter). `add`
//! replaces items that share an id, preserving arrival order for the
//! rest, and tells every registered callback about the batch exactly
//! once, in registration order.

use keel_core::SyncOperation;
use std::sync::{Arc, Mutex};

/// Something a mailbox can hold
pub trait MailboxItem: Clone + Send + 'static {
    fn item_id(&self) -> &str;
    /// Greatest ordinal the item covers; 0 when unassigned
    fn max_ordinal(&self) -> u64;
}

impl MailboxItem for SyncOperation {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn max_ordinal(&self) -> u64 {
        SyncOperation::max_ordinal(self)
    }
}

type AddedCallback<T> = Arc<dyn Fn(&[T]) + Send + Sync>;

/// Ordered collection of sync items keyed by id
pub struct Mailbox<T: MailboxItem> {
    items: Mutex<Vec<T>>,
    callbacks: Mutex<Vec<AddedCallback<T>>>,
}

impl<T: MailboxItem> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MailboxItem> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    /// Insert or replace by id, then notify callbacks with the batch
    pub fn add(&self, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }
        {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            for item in &batch {
                match items.iter().position(|i| i.item_id() == item.item_id()) {
                    Some(at) => items[at] = item.clone(),
                    None => items.push(item.clone()),
                }
            }
        }
        let callbacks = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for callback in callbacks {
            callback(&batch);
        }
    }

    /// Run `callback` with every batch passed to later `add` calls
    pub fn on_added(&self, callback: impl Fn(&[T]) + Send + Sync + 'static) {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Replace an existing item in place without notifying callbacks
    pub fn update(&self, item: T) -> bool {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        match items.iter().position(|i| i.item_id() == item.item_id()) {
            Some(at) => {
                items[at] = item;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<T> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.iter().find(|i| i.item_id() == id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<T> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let at = items.iter().position(|i| i.item_id() == id)?;
        Some(items.remove(at))
    }

    pub fn items(&self) -> Vec<T> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items fully covered by an acknowledgment at `ordinal`
    pub fn items_up_to_ordinal(&self, ordinal: u64) -> Vec<T> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items
            .iter()
            .filter(|i| i.max_ordinal() <= ordinal)
            .cloned()
            .collect()
    }

    /// Remove and return items fully covered by an acknowledgment at
    /// `ordinal`; items with any ordinal beyond it stay put
    pub fn drain_up_to_ordinal(&self, ordinal: u64) -> Vec<T> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut drained = Vec::new();
        items.retain(|i| {
            if i.max_ordinal() <= ordinal {
                drained.push(i.clone());
                false
            } else {
                true
            }
        });
        drained
    }

    pub fn clear(&self) {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
