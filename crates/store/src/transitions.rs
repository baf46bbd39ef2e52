//! Status-transition helpers over a [`JobStore`].
//!
//! Each helper performs its check-and-write inside a single
//! [`JobStore::update`] call. That is what resolves the cancellation
//! race: when an external cancel lands between the worker's backend
//! call returning and its terminal write, the terminal helpers see the
//! cancelled status inside the same atomic mutation and leave it
//! untouched.

use genflow_core::job::{Job, JobStatus};
use genflow_core::types::JobId;

use crate::store::{JobStore, StoreError};

/// Transition a pending job to running and stamp `started_at`.
///
/// Returns the updated record, or `None` when the job does not exist.
/// A job that is no longer pending is returned unchanged; the caller
/// inspects the status to decide whether to proceed.
pub async fn mark_started(
    store: &dyn JobStore,
    id: JobId,
) -> Result<Option<Job>, StoreError> {
    store
        .update(
            id,
            Box::new(|job| {
                if job.status.can_transition_to(JobStatus::Running) {
                    job.status = JobStatus::Running;
                    job.started_at = Some(chrono::Utc::now());
                }
            }),
        )
        .await
}

/// Record a progress update for a running job.
///
/// Progress is monotone while running: the stored percentage only ever
/// rises, so the advisory poll-ramp estimate cannot move it backwards.
/// Updates against a job that is no longer running are dropped.
pub async fn update_progress(
    store: &dyn JobStore,
    id: JobId,
    percent: u8,
    message: &str,
) -> Result<Option<Job>, StoreError> {
    let message = message.to_string();
    store
        .update(
            id,
            Box::new(move |job| {
                if job.status == JobStatus::Running {
                    job.progress = job.progress.max(percent.min(100));
                    job.progress_message = Some(message);
                }
            }),
        )
        .await
}

/// Results captured at the completed transition.
#[derive(Debug, Default, Clone)]
pub struct JobResult {
    pub text: Option<String>,
    pub files: Option<Vec<String>>,
}

/// Mark a running job completed, pin progress to 100, and store its
/// result. A job already cancelled (or otherwise terminal) is left
/// untouched.
pub async fn complete(
    store: &dyn JobStore,
    id: JobId,
    result: JobResult,
) -> Result<Option<Job>, StoreError> {
    store
        .update(
            id,
            Box::new(move |job| {
                if job.status.can_transition_to(JobStatus::Completed) {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.completed_at = Some(chrono::Utc::now());
                    job.result_text = result.text;
                    job.result_files = result.files;
                }
            }),
        )
        .await
}

/// Mark a job failed with a human-readable error. Terminal jobs are
/// left untouched (a cancel that won the race is not downgraded).
pub async fn fail(
    store: &dyn JobStore,
    id: JobId,
    error: &str,
) -> Result<Option<Job>, StoreError> {
    let error = error.to_string();
    store
        .update(
            id,
            Box::new(move |job| {
                if job.status.can_transition_to(JobStatus::Failed) {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(chrono::Utc::now());
                    job.error_message = Some(error);
                }
            }),
        )
        .await
}

/// Cancel a pending or running job.
///
/// Returns `true` when the job was cancelled by this call, `false`
/// when it was already terminal or does not exist.
pub async fn cancel(store: &dyn JobStore, id: JobId) -> Result<bool, StoreError> {
    let cancelled = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = std::sync::Arc::clone(&cancelled);

    store
        .update(
            id,
            Box::new(move |job| {
                if job.status.can_transition_to(JobStatus::Cancelled) {
                    job.status = JobStatus::Cancelled;
                    job.completed_at = Some(chrono::Utc::now());
                    flag.store(true, std::sync::atomic::Ordering::Relaxed);
                }
            }),
        )
        .await?;

    Ok(cancelled.load(std::sync::atomic::Ordering::Relaxed))
}
