// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job tracker: the caller-visible record of every job's progress
//!
//! Whole-record replacement under one lock; no partial updates. Unknown
//! job ids synthesize a minimal Pending record so status queries never
//! error on a job the caller only just submitted.

use keel_core::{Clock, ConsistencyToken, ErrorInfo, Job, JobId, SystemClock};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// In-memory job status map
pub struct JobTracker<C: Clock = SystemClock> {
    jobs: Mutex<HashMap<String, Job>>,
    changed: Notify,
    clock: C,
}

impl JobTracker<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for JobTracker<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> JobTracker<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            changed: Notify::new(),
            clock,
        }
    }

    pub fn register(&self, job_id: &JobId) {
        let job = Job::pending(job_id.clone(), self.clock.now_utc());
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.0.clone(), job);
        self.changed.notify_waiters();
    }

    pub fn mark_running(&self, job_id: &JobId) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let record = self.record_for(&jobs, job_id).running();
        jobs.insert(job_id.0.clone(), record);
        drop(jobs);
        self.changed.notify_waiters();
    }

    pub fn mark_completed(
        &self,
        job_id: &JobId,
        token: ConsistencyToken,
        result: Option<serde_json::Value>,
    ) {
        let now = self.clock.now_utc();
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let record = self.record_for(&jobs, job_id).completed(token, result, now);
        jobs.insert(job_id.0.clone(), record);
        drop(jobs);
        self.changed.notify_waiters();
    }

    pub fn mark_failed(&self, job_id: &JobId, error: ErrorInfo) {
        let now = self.clock.now_utc();
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let record = self.record_for(&jobs, job_id).failed(error, now);
        jobs.insert(job_id.0.clone(), record);
        drop(jobs);
        self.changed.notify_waiters();
    }

    /// Current record; unknown ids come back as a synthesized Pending
    pub fn get_status(&self, job_id: &JobId) -> Job {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        self.record_for(&jobs, job_id)
    }

    /// Resolve once the job reaches Completed or Failed
    pub async fn wait_for_terminal(&self, job_id: &JobId) -> Job {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let job = self.get_status(job_id);
            if job.status.is_terminal() {
                return job;
            }
            notified.await;
        }
    }

    fn record_for(&self, jobs: &HashMap<String, Job>, job_id: &JobId) -> Job {
        jobs.get(&job_id.0)
            .cloned()
            .unwrap_or_else(|| Job::pending(job_id.clone(), self.clock.now_utc()))
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
