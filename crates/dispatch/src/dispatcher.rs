//! The FIFO job queue and its single worker loop.
//!
//! One background task consumes the queue, one job at a time. Producers
//! only ever touch the queue sender, so enqueueing from concurrent
//! request handlers is safe. Cancellation is cooperative: an in-flight
//! backend call is not preempted, but its terminal write is guarded so
//! an external cancel is never downgraded back to completed or failed.

use std::sync::Arc;
use std::time::Duration;

use genflow_comfyui::ComfyUIService;
use genflow_core::job::JobStatus;
use genflow_core::types::JobId;
use genflow_core::{progress_fn, ProgressCallback};
use genflow_events::{JobEvent, ProgressBus};
use genflow_store::{transitions, JobStore, StoreError};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::backend::GenerationBackend;
use crate::executor::execute_job;

/// Shared collaborators the worker needs for every job.
struct WorkerContext {
    store: Arc<dyn JobStore>,
    bus: Arc<ProgressBus>,
    backend: Arc<dyn GenerationBackend>,
    comfyui: Arc<ComfyUIService>,
}

/// Single-consumer dispatch queue.
///
/// Created once at process startup via [`JobDispatcher::start`] and
/// shared as `Arc<JobDispatcher>`; torn down with
/// [`shutdown`](Self::shutdown).
pub struct JobDispatcher {
    queue_tx: mpsc::UnboundedSender<JobId>,
    store: Arc<dyn JobStore>,
    bus: Arc<ProgressBus>,
    cancel: CancellationToken,
    worker_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl JobDispatcher {
    /// Spawn the worker task and return the shared dispatcher handle.
    pub fn start(
        store: Arc<dyn JobStore>,
        bus: Arc<ProgressBus>,
        backend: Arc<dyn GenerationBackend>,
        comfyui: Arc<ComfyUIService>,
        shutdown_timeout: Duration,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let ctx = WorkerContext {
            store: Arc::clone(&store),
            bus: Arc::clone(&bus),
            backend,
            comfyui,
        };
        let worker_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            worker_loop(ctx, queue_rx, worker_cancel).await;
        });

        tracing::info!("Job dispatcher started");

        Arc::new(Self {
            queue_tx,
            store,
            bus,
            cancel,
            worker_handle: Mutex::new(Some(handle)),
            shutdown_timeout,
        })
    }

    /// Append a job id to the FIFO.
    ///
    /// The queue holds ids, not records: the worker re-fetches the job
    /// and silently drops ids whose record is gone or no longer
    /// pending.
    pub fn enqueue(&self, job_id: JobId) {
        if self.queue_tx.send(job_id).is_err() {
            tracing::warn!(job_id = %job_id, "Enqueue after dispatcher shutdown, dropping");
        }
    }

    /// Cancel a pending or running job.
    ///
    /// Pending jobs are cancelled immediately (the worker's own
    /// pre-check will skip them). For running jobs this is cooperative:
    /// the in-flight backend call keeps running, but its result is
    /// discarded by the guarded terminal transition. Returns whether
    /// this call cancelled the job.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<bool, StoreError> {
        let cancelled = transitions::cancel(self.store.as_ref(), job_id).await?;

        if cancelled {
            tracing::info!(job_id = %job_id, "Job cancelled");
            if let Some(job) = self.store.get(job_id).await? {
                self.bus.publish(job_id, JobEvent::from_job(&job));
            }
        }

        Ok(cancelled)
    }

    /// Signal the worker to stop and wait for the in-flight job.
    ///
    /// The wait is bounded by the configured shutdown timeout; on
    /// expiry the in-flight job is abandoned (its record keeps whatever
    /// status it had) and a warning is logged.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job dispatcher");
        self.cancel.cancel();

        let handle = self.worker_handle.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.shutdown_timeout, handle)
                .await
                .is_err()
            {
                tracing::warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Worker did not stop in time, abandoning in-flight job",
                );
            }
        }

        tracing::info!("Job dispatcher shut down");
    }
}

/// Consume the queue until cancelled. Never exits because of a job
/// failure.
async fn worker_loop(
    ctx: WorkerContext,
    mut queue_rx: mpsc::UnboundedReceiver<JobId>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job worker shutting down");
                break;
            }
            next = queue_rx.recv() => {
                match next {
                    Some(job_id) => process_one(&ctx, job_id).await,
                    // All senders dropped; nothing more will arrive.
                    None => break,
                }
            }
        }
    }
}

/// Run one dequeued job through its full life cycle.
async fn process_one(ctx: &WorkerContext, job_id: JobId) {
    tracing::info!(job_id = %job_id, "Processing job");

    let job = match ctx.store.get(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            // Record removed out of band; the queue only held the id.
            tracing::warn!(job_id = %job_id, "Job not found in store, dropping");
            return;
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to load job");
            return;
        }
    };

    if job.status != JobStatus::Pending {
        tracing::warn!(
            job_id = %job_id,
            status = %job.status,
            "Job is not pending, dropping",
        );
        return;
    }

    let started = match transitions::mark_started(ctx.store.as_ref(), job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            tracing::warn!(job_id = %job_id, "Job disappeared before start");
            return;
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job started");
            return;
        }
    };

    // A cancel can land between the pre-check and the transition; the
    // guarded transition left the record untouched in that case.
    if started.status != JobStatus::Running {
        tracing::info!(
            job_id = %job_id,
            status = %started.status,
            "Job no longer runnable, skipping",
        );
        publish_final(ctx, job_id).await;
        return;
    }

    ctx.bus.publish(job_id, JobEvent::from_job(&started));

    let progress = progress_callback(ctx, job_id);
    let outcome = execute_job(
        &started,
        ctx.backend.as_ref(),
        ctx.comfyui.as_ref(),
        &progress,
    )
    .await;

    let terminal = match outcome {
        Ok(result) => transitions::complete(ctx.store.as_ref(), job_id, result).await,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Job failed");
            transitions::fail(ctx.store.as_ref(), job_id, &e.to_string()).await
        }
    };
    if let Err(e) = terminal {
        tracing::error!(job_id = %job_id, error = %e, "Failed to record terminal status");
    }

    // Always emit the terminal event, whatever the outcome; this is
    // what lets subscriber streams finish.
    publish_final(ctx, job_id).await;
}

/// Build the per-job progress callback: update the record, then
/// publish. Updates for a job that is no longer running are dropped:
/// the worker stops forwarding progress once an external cancel lands.
fn progress_callback(ctx: &WorkerContext, job_id: JobId) -> ProgressCallback {
    let store = Arc::clone(&ctx.store);
    let bus = Arc::clone(&ctx.bus);

    progress_fn(move |pct, msg| {
        let store = Arc::clone(&store);
        let bus = Arc::clone(&bus);
        async move {
            match transitions::update_progress(store.as_ref(), job_id, pct, &msg).await {
                // Publish the stored (monotone-clamped) value, not the
                // raw report.
                Ok(Some(job)) if job.status == JobStatus::Running => {
                    bus.publish(job_id, JobEvent::running(job.progress, msg));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to update progress");
                }
            }
        }
    })
}

/// Publish the job's current stored state as the stream-ending event.
async fn publish_final(ctx: &WorkerContext, job_id: JobId) {
    match ctx.store.get(job_id).await {
        Ok(Some(job)) => ctx.bus.publish(job_id, JobEvent::from_job(&job)),
        Ok(None) => {}
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "Failed to load job for final event");
        }
    }
}
