//! Per-job progress event bus.
//!
//! Unlike a single broadcast channel, subscriptions here are keyed by
//! job id: each subscriber gets its own bounded `mpsc` channel and only
//! sees events for the job it asked about. Publishing is synchronous
//! and never blocks: a full buffer marks the subscriber dead and
//! unsubscribes it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use genflow_core::job::{Job, JobStatus};
use genflow_core::types::JobId;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::stream::ProgressStream;

/// Buffer capacity of each subscriber channel.
pub const CHANNEL_CAPACITY: usize = 64;

/// A single progress update for one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobEvent {
    /// An in-flight update for a running job.
    pub fn running(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Running,
            progress,
            progress_message: Some(message.into()),
            error_message: None,
        }
    }

    /// Snapshot the current state of a job record.
    ///
    /// This is what the worker publishes as the final event after a
    /// terminal transition, whatever the outcome was.
    pub fn from_job(job: &Job) -> Self {
        Self {
            status: job.status,
            progress: job.progress,
            progress_message: job.progress_message.clone(),
            error_message: job.error_message.clone(),
        }
    }

    /// Whether this event ends a subscriber's stream.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

type SubscriberMap = HashMap<JobId, HashMap<u64, mpsc::Sender<JobEvent>>>;

/// Per-job publish/subscribe hub for [`JobEvent`]s.
///
/// Designed to be shared as `Arc<ProgressBus>` between the dispatcher
/// (publisher) and any number of stream consumers. Publishing to a job
/// id with no subscribers is a no-op; events preceding the first
/// subscriber are dropped, not buffered.
#[derive(Default)]
pub struct ProgressBus {
    subscribers: Mutex<SubscriberMap>,
    next_subscription_id: AtomicU64,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a subscriber stream for a job id.
    pub fn subscribe(self: &Arc<Self>, job_id: JobId) -> ProgressStream {
        let (subscription_id, rx) = self.register(job_id);
        ProgressStream::new(Arc::clone(self), job_id, subscription_id, rx)
    }

    /// Register a new bounded channel for a job id. Exposed for
    /// [`ProgressStream`]; external callers go through
    /// [`subscribe`](Self::subscribe).
    pub(crate) fn register(&self, job_id: JobId) -> (u64, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);

        let mut subs = self.subscribers.lock().expect("bus lock poisoned");
        subs.entry(job_id).or_default().insert(id, tx);

        (id, rx)
    }

    /// Remove a subscription. No-op when it was already removed.
    pub fn unsubscribe(&self, job_id: JobId, subscription_id: u64) {
        let mut subs = self.subscribers.lock().expect("bus lock poisoned");
        if let Some(channels) = subs.get_mut(&job_id) {
            channels.remove(&subscription_id);
            if channels.is_empty() {
                subs.remove(&job_id);
            }
        }
    }

    /// Deliver an event to every current subscriber of a job.
    ///
    /// Best-effort and non-blocking: a subscriber whose buffer is full
    /// (or whose receiver is gone) is dropped from the registry instead
    /// of stalling the publisher.
    pub fn publish(&self, job_id: JobId, event: JobEvent) {
        let mut subs = self.subscribers.lock().expect("bus lock poisoned");
        let Some(channels) = subs.get_mut(&job_id) else {
            return;
        };

        let mut dead: Vec<u64> = Vec::new();
        for (&id, tx) in channels.iter() {
            if tx.try_send(event.clone()).is_err() {
                dead.push(id);
            }
        }

        for id in dead {
            tracing::warn!(
                job_id = %job_id,
                subscription_id = id,
                "Dropping dead progress subscriber",
            );
            channels.remove(&id);
        }
        if channels.is_empty() {
            subs.remove(&job_id);
        }
    }

    /// Number of live subscriptions for a job id.
    pub fn subscriber_count(&self, job_id: JobId) -> usize {
        self.subscribers
            .lock()
            .expect("bus lock poisoned")
            .get(&job_id)
            .map_or(0, HashMap::len)
    }
}
