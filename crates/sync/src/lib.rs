// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! keel-sync: replication between keel reactors
//!
//! Per-remote channels move operation batches through id-keyed mailboxes
//! (inbox, outbox, dead letter) over a pluggable transport. A cumulative
//! cursor acknowledges delivery, poll timers with jittered backoff drive
//! flushing, and the sync manager wires channels to the reactor's event
//! bus and job queue.

pub mod channel;
pub mod mailbox;
pub mod manager;
pub mod timer;

pub use channel::{Channel, PollingChannel, PollingChannelConfig};
pub use mailbox::{Mailbox, MailboxItem};
pub use manager::{
    ChannelFactory, JobSubmitter, PollingChannelFactory, SyncManager, SyncManagerConfig,
};
pub use timer::{IntervalPollTimer, PollDelegate, PollTimerConfig};
