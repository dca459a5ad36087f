// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interval poll timer driving channel flushes
//!
//! Ticks the delegate on a fixed interval, starting with an immediate
//! tick. The next tick is scheduled only after the delegate returns.
//! Delegate failures back off exponentially with jitter; a queue depth
//! past the threshold skips the tick and re-checks on a shorter
//! cadence; a depth probe error skips the tick and keeps the normal
//! interval.

use async_trait::async_trait;
use keel_core::{CancellationToken, ReactorError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// What the timer drives on each tick
#[async_trait]
pub trait PollDelegate: Send + Sync + 'static {
    async fn poll(&self, cancel: &CancellationToken) -> Result<(), ReactorError>;

    /// Pending-work depth consulted for backpressure
    fn queue_depth(&self) -> Result<usize, ReactorError>;
}

#[derive(Debug, Clone, Copy)]
pub struct PollTimerConfig {
    pub interval: Duration,
    /// Re-check cadence while backpressure holds ticks back
    pub backpressure_check_interval: Duration,
    pub max_queue_depth: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PollTimerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            backpressure_check_interval: Duration::from_millis(250),
            max_queue_depth: 100,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

struct TimerState {
    interval: Duration,
    failures: u32,
    paused: bool,
}

/// Repeating driver for one channel's poll cycle
pub struct IntervalPollTimer {
    delegate: Arc<dyn PollDelegate>,
    config: PollTimerConfig,
    state: Mutex<TimerState>,
    trigger: Notify,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IntervalPollTimer {
    pub fn new(delegate: Arc<dyn PollDelegate>, config: PollTimerConfig) -> Self {
        Self {
            delegate,
            state: Mutex::new(TimerState {
                interval: config.interval,
                failures: 0,
                paused: false,
            }),
            config,
            trigger: Notify::new(),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Begin ticking, with an immediate first tick; resets any backoff.
    /// A second call is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() || self.shutdown.is_cancelled() {
            return;
        }
        self.state.lock().unwrap_or_else(|e| e.into_inner()).failures = 0;
        let timer = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            timer.run().await;
        }));
    }

    /// Stop for good; a tick in flight finishes but never reschedules
    pub fn stop(&self) {
        self.shutdown.cancel();
        self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    /// Hold timed ticks; `trigger_now` still works
    pub fn pause(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused = false;
    }

    /// Tick as soon as possible, bypassing pause and backpressure;
    /// ignored once stopped
    pub fn trigger_now(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.trigger.notify_one();
    }

    /// Change the tick interval; takes effect at the next reschedule,
    /// a pending timer keeps its old deadline
    pub fn set_interval(&self, interval: Duration) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).interval = interval;
    }

    fn current_interval(&self) -> Duration {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).interval
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).paused
    }

    fn reset_failures(&self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).failures = 0;
    }

    /// Exponential backoff with jitter in the upper half of the window
    fn next_backoff(&self) -> Duration {
        let failures = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.failures += 1;
            state.failures
        };
        let exponent = failures.saturating_sub(1).min(20);
        let backoff = std::cmp::min(
            self.config.max_backoff,
            self.config.base_backoff * 2u32.pow(exponent),
        );
        backoff / 2 + backoff.mul_f64(rand::random::<f64>() / 2.0)
    }

    async fn run(self: Arc<Self>) {
        let mut delay = Duration::ZERO;
        loop {
            let manual = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = self.trigger.notified() => true,
                _ = tokio::time::sleep(delay) => false,
            };

            if !manual {
                if self.is_paused() {
                    delay = self.current_interval();
                    continue;
                }
                match self.delegate.queue_depth() {
                    Ok(depth) if depth > self.config.max_queue_depth => {
                        tracing::debug!(depth, "backpressure holding poll back");
                        delay = self.config.backpressure_check_interval;
                        continue;
                    }
                    // A broken depth probe skips the tick but never wedges
                    // the schedule.
                    Err(err) => {
                        tracing::warn!(error = %err, "queue depth probe failed; skipping tick");
                        delay = self.current_interval();
                        continue;
                    }
                    Ok(_) => {}
                }
            }

            let cancel = self.shutdown.child_token();
            let result = self.delegate.poll(&cancel).await;
            if self.shutdown.is_cancelled() {
                return;
            }
            delay = match result {
                Ok(()) => {
                    self.reset_failures();
                    self.current_interval()
                }
                Err(err) => {
                    let backoff = self.next_backoff();
                    tracing::warn!(error = %err, ?backoff, "poll failed; backing off");
                    backoff
                }
            };
        }
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
