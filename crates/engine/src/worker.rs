// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job worker: the loop between queue and executor
//!
//! The bus handler only wakes the loop; execution happens on the
//! worker's own task so `enqueue` never waits on a running job.
//! Retryable failures go back through the queue with a bumped retry
//! count; everything else fails the job in the tracker.

use crate::executor::JobExecutor;
use crate::queue::{JobLease, JobQueue};
use crate::tracker::JobTracker;
use keel_core::{
    handler, CancellationToken, ErrorInfo, EventBus, EventKind, JobEventPayload,
    JobFailedPayload, JobId, ReactorEvent, SubscriberId,
};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub struct JobWorker {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    tracker: Arc<JobTracker>,
    bus: EventBus,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    subscriber: Mutex<Option<SubscriberId>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobWorker {
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<JobExecutor>,
        tracker: Arc<JobTracker>,
        bus: EventBus,
    ) -> Self {
        Self {
            queue,
            executor,
            tracker,
            bus,
            wake: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            subscriber: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to queue announcements and start draining; a second
    /// call is a no-op
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.is_some() {
            return;
        }

        let wake = self.wake.clone();
        let id = self.bus.subscribe(
            &[EventKind::QueueJobAvailable],
            handler(move |_| {
                let wake = wake.clone();
                async move {
                    wake.notify_one();
                    Ok(())
                }
            }),
        );
        *self.subscriber.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);

        let worker = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            worker.run().await;
        }));
    }

    /// Unsubscribe and stop the loop after the in-flight job finishes
    pub fn stop(&self) {
        if let Some(id) = self
            .subscriber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            self.bus.unsubscribe(id);
        }
        self.shutdown.cancel();
        self.wake.notify_one();
        // The loop observes the cancelled token and exits on its own;
        // dropping the handle detaches it.
        self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.drain().await;
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
            }
        }
    }

    async fn drain(&self) {
        while !self.shutdown.is_cancelled() {
            let Some(lease) = self.queue.dequeue_next() else {
                break;
            };
            self.process(lease).await;
        }
    }

    async fn process(&self, lease: JobLease) {
        let job = lease.job().clone();
        self.tracker.mark_running(&job.id);
        self.announce(ReactorEvent::JobRunning(JobEventPayload {
            job_id: job.id.clone(),
        }))
        .await;
        tracing::debug!(job_id = %job.id, stream = %job.stream_key(), "executing job");

        let cancel = self.shutdown.child_token();
        match self.executor.execute(&job, &cancel).await {
            Ok(outcome) => {
                self.tracker
                    .mark_completed(&job.id, outcome.consistency_token, None);
                lease.complete().await;
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(job_id = %job.id, error = %err, "job failed; retrying");
                lease.fail().await;
                let exhausted = !self.queue.retry(job.clone()).await.unwrap_or(false);
                if exhausted {
                    self.fail_job(&job.id, ErrorInfo::from(&err)).await;
                }
            }
            Err(err) => {
                tracing::warn!(job_id = %job.id, error = %err, "job failed");
                self.fail_job(&job.id, ErrorInfo::from(&err)).await;
                lease.fail().await;
            }
        }
    }

    async fn fail_job(&self, job_id: &JobId, error: ErrorInfo) {
        self.tracker.mark_failed(job_id, error.clone());
        self.announce(ReactorEvent::JobFailed(JobFailedPayload {
            job_id: job_id.clone(),
            error,
        }))
        .await;
    }

    /// Lifecycle announcements are informational; subscriber failures
    /// only get logged.
    async fn announce(&self, event: ReactorEvent) {
        let name = event.name();
        if let Err(err) = self.bus.emit(event).await {
            tracing::warn!(event = name, error = %err, "event subscriber failed");
        }
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
