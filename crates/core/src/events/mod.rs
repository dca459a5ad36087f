// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus wiring the reactor's subsystems together
//!
//! Subscribers register for specific event kinds and are awaited in
//! registration order. Delivery never stops at a failing subscriber;
//! failures are bundled into an [`EventBusAggregateError`].

mod bus;

pub use bus::{
    handler, EventBus, EventBusAggregateError, EventHandler, HandlerResult, SubscriberId,
};
