// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue: per-stream FIFO lanes with dependency gating
//!
//! One lane per `(document_id, scope, branch)`. Dequeue is serial per
//! document: while any job for a document runs, that document's lanes
//! are skipped. `depends_on` gates a lane's front job until every named
//! job has completed. Enqueue announces `QueueJobAvailable` on the bus;
//! completion re-announces lanes the finished job may have unblocked.

use crate::resolver::ModelResolver;
use keel_core::{
    ActionKind, EventBus, JobId, JobKind, JobRequest, QueueJobAvailablePayload, ReactorError,
    ReactorEvent,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

type DrainedCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct QueueState {
    lanes: BTreeMap<String, VecDeque<JobRequest>>,
    completed: HashSet<JobId>,
    running: HashMap<JobId, String>,
    paused: bool,
    blocked: bool,
    on_drained: Vec<DrainedCallback>,
}

impl QueueState {
    fn front_is_eligible(&self, lane: &VecDeque<JobRequest>) -> bool {
        if self.paused {
            return false;
        }
        let Some(front) = lane.front() else {
            return false;
        };
        front.depends_on.iter().all(|id| self.completed.contains(id))
            && !self.running.values().any(|doc| *doc == front.document_id)
    }

    fn eligible_lanes(&self) -> Vec<QueueJobAvailablePayload> {
        self.lanes
            .values()
            .filter(|lane| self.front_is_eligible(lane))
            .filter_map(|lane| lane.front())
            .map(|job| QueueJobAvailablePayload {
                document_id: job.document_id.clone(),
                scope: job.scope.clone(),
                branch: job.branch.clone(),
            })
            .collect()
    }

    fn is_drained(&self) -> bool {
        self.running.is_empty() && self.lanes.values().all(|lane| lane.is_empty())
    }

    fn take_drained_callbacks(&mut self) -> Vec<DrainedCallback> {
        if self.is_drained() {
            std::mem::take(&mut self.on_drained)
        } else {
            Vec::new()
        }
    }
}

fn lane_key(document_id: &str, scope: &str, branch: &str) -> String {
    format!("{document_id}:{scope}:{branch}")
}

/// A dequeued job; dropping it without `complete`/`fail` leaks the
/// document's serial slot, so the worker must resolve every lease.
pub struct JobLease {
    job: JobRequest,
    queue: Arc<JobQueue>,
}

impl JobLease {
    pub fn job(&self) -> &JobRequest {
        &self.job
    }

    pub fn into_job(self) -> (JobRequest, Arc<JobQueue>) {
        (self.job, self.queue)
    }

    /// Mark the job done; its id satisfies other jobs' dependencies
    pub async fn complete(self) {
        self.queue.finish(&self.job.id, true).await;
    }

    /// Mark the job failed; dependents waiting on it stay gated
    pub async fn fail(self) {
        self.queue.finish(&self.job.id, false).await;
    }
}

/// Shared job queue feeding the worker
pub struct JobQueue {
    bus: EventBus,
    resolver: Arc<ModelResolver>,
    inner: Mutex<QueueState>,
}

impl JobQueue {
    pub fn new(bus: EventBus, resolver: Arc<ModelResolver>) -> Self {
        Self {
            bus,
            resolver,
            inner: Mutex::new(QueueState::default()),
        }
    }

    /// Queue a job and announce its lane.
    ///
    /// A job carrying `CREATE_DOCUMENT` resolves its document model
    /// here, so a model that cannot load fails the submission
    /// immediately instead of poisoning the lane later.
    pub async fn enqueue(&self, job: JobRequest) -> Result<(), ReactorError> {
        {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.blocked {
                return Err(ReactorError::QueueBlocked);
            }
        }

        if creates_document(&job) {
            self.resolver.ensure_model_loaded(&job.document_type).await?;
        }

        let (announce, paused) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.blocked {
                return Err(ReactorError::QueueBlocked);
            }
            let payload = QueueJobAvailablePayload {
                document_id: job.document_id.clone(),
                scope: job.scope.clone(),
                branch: job.branch.clone(),
            };
            let key = job.stream_key();
            inner.lanes.entry(key).or_default().push_back(job);
            (payload, inner.paused)
        };

        if !paused {
            self.announce(vec![announce]).await;
        }
        Ok(())
    }

    /// Take the front job of one lane, if it is eligible to run
    pub fn dequeue(
        self: &Arc<Self>,
        document_id: &str,
        scope: &str,
        branch: &str,
    ) -> Option<JobLease> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = lane_key(document_id, scope, branch);
        let eligible = inner
            .lanes
            .get(&key)
            .map(|lane| inner.front_is_eligible(lane))
            .unwrap_or(false);
        if !eligible {
            return None;
        }
        let job = inner.lanes.get_mut(&key)?.pop_front()?;
        inner.running.insert(job.id.clone(), job.document_id.clone());
        Some(JobLease {
            job,
            queue: Arc::clone(self),
        })
    }

    /// Take the first eligible job across all lanes, in lane-key order
    pub fn dequeue_next(self: &Arc<Self>) -> Option<JobLease> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let key = inner
            .lanes
            .iter()
            .find(|(_, lane)| inner.front_is_eligible(lane))
            .map(|(key, _)| key.clone())?;
        let job = inner.lanes.get_mut(&key)?.pop_front()?;
        inner.running.insert(job.id.clone(), job.document_id.clone());
        Some(JobLease {
            job,
            queue: Arc::clone(self),
        })
    }

    /// Re-queue a failed-but-retryable job at the front of its lane.
    ///
    /// Returns `false` once retries are exhausted; the caller then fails
    /// the job for good.
    pub async fn retry(&self, mut job: JobRequest) -> Result<bool, ReactorError> {
        if job.retry_count >= job.max_retries {
            return Ok(false);
        }
        job.retry_count += 1;

        let (announce, paused) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let payload = QueueJobAvailablePayload {
                document_id: job.document_id.clone(),
                scope: job.scope.clone(),
                branch: job.branch.clone(),
            };
            let key = job.stream_key();
            inner.lanes.entry(key).or_default().push_front(job);
            (payload, inner.paused)
        };
        if !paused {
            self.announce(vec![announce]).await;
        }
        Ok(true)
    }

    pub fn size(&self, document_id: &str, scope: &str, branch: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .lanes
            .get(&lane_key(document_id, scope, branch))
            .map(|lane| lane.len())
            .unwrap_or(0)
    }

    pub fn total_size(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.lanes.values().map(|lane| lane.len()).sum()
    }

    /// Whether anything is queued or running
    pub fn has_jobs(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        !inner.is_drained()
    }

    /// Drop a queued job wherever it sits; running jobs are untouched
    pub fn remove(&self, job_id: &JobId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for lane in inner.lanes.values_mut() {
            let before = lane.len();
            lane.retain(|job| job.id != *job_id);
            removed |= lane.len() < before;
        }
        removed
    }

    pub fn clear(&self, document_id: &str, scope: &str, branch: &str) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = inner
            .lanes
            .remove(&lane_key(document_id, scope, branch))
            .map(|lane| lane.len())
            .unwrap_or(0);
        for callback in inner.take_drained_callbacks() {
            callback();
        }
        dropped
    }

    pub fn clear_all(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = inner.lanes.values().map(|lane| lane.len()).sum();
        inner.lanes.clear();
        for callback in inner.take_drained_callbacks() {
            callback();
        }
        dropped
    }

    /// Refuse new jobs; `on_drained` fires once queued and running work
    /// hits zero (immediately when already drained)
    pub fn block(&self, on_drained: Option<DrainedCallback>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.blocked = true;
        if let Some(callback) = on_drained {
            if inner.is_drained() {
                callback();
            } else {
                inner.on_drained.push(callback);
            }
        }
    }

    pub fn unblock(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.blocked = false;
    }

    /// Stop handing out jobs; queued work stays put
    pub fn pause(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.paused = true;
    }

    /// Resume delivery, re-announcing every lane with eligible work
    pub async fn resume(&self) {
        let announce = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.paused = false;
            inner.eligible_lanes()
        };
        self.announce(announce).await;
    }

    async fn finish(&self, job_id: &JobId, completed: bool) {
        let (announce, callbacks) = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.running.remove(job_id);
            if completed {
                inner.completed.insert(job_id.clone());
            }
            let callbacks = inner.take_drained_callbacks();
            (inner.eligible_lanes(), callbacks)
        };
        for callback in callbacks {
            callback();
        }
        self.announce(announce).await;
    }

    async fn announce(&self, payloads: Vec<QueueJobAvailablePayload>) {
        for payload in payloads {
            if let Err(err) = self
                .bus
                .emit(ReactorEvent::QueueJobAvailable(payload))
                .await
            {
                tracing::warn!(error = %err, "queue announcement subscriber failed");
            }
        }
    }
}

fn creates_document(job: &JobRequest) -> bool {
    match &job.kind {
        JobKind::Mutate { actions } => actions
            .iter()
            .any(|action| ActionKind::parse(&action.kind) == ActionKind::CreateDocument),
        JobKind::Load { operations, .. } => operations.iter().any(|op| {
            ActionKind::parse(&op.operation.action.kind) == ActionKind::CreateDocument
        }),
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
