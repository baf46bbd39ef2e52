//! End-to-end tests for the job dispatcher.
//!
//! These run real jobs through the queue with the mock backend (zero
//! delay) and an unreachable-but-never-contacted ComfyUI service, and
//! observe outcomes through the store and the progress bus.

use std::sync::Arc;
use std::time::Duration;

use genflow_comfyui::ComfyUIService;
use genflow_core::job::{Job, JobStatus, JobType, ServiceMode};
use genflow_dispatch::{JobDispatcher, MockBackend};
use genflow_events::{ProgressBus, StreamItem};
use genflow_store::{JobStore, MemoryJobStore};
use serde_json::json;

struct Harness {
    store: Arc<MemoryJobStore>,
    bus: Arc<ProgressBus>,
    dispatcher: Arc<JobDispatcher>,
    // Keeps the workflow/output directories alive for the test.
    _dirs: tempfile::TempDir,
}

fn harness(backend: MockBackend) -> Harness {
    let dirs = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(MemoryJobStore::new());
    let bus = Arc::new(ProgressBus::new());
    // Never contacted in these tests: the real path fails on workflow
    // resolution before any HTTP happens.
    let comfyui = Arc::new(ComfyUIService::new(
        "http://127.0.0.1:8188".to_string(),
        dirs.path().join("workflows"),
        dirs.path().join("outputs"),
    ));

    let dispatcher = JobDispatcher::start(
        store.clone() as Arc<dyn JobStore>,
        Arc::clone(&bus),
        Arc::new(backend),
        comfyui,
        Duration::from_secs(5),
    );

    Harness {
        store,
        bus,
        dispatcher,
        _dirs: dirs,
    }
}

async fn submit(h: &Harness, job: Job) -> uuid::Uuid {
    let id = job.id;
    h.store.save(&job).await.expect("save job");
    h.dispatcher.enqueue(id);
    id
}

/// Poll the store until the job reaches a terminal status.
///
/// The bus keeps no backlog for late subscribers, so an
/// instant mock job can finish before a late subscription, so the
/// store is the authoritative place to wait.
async fn wait_terminal(h: &Harness, id: uuid::Uuid) -> Job {
    let wait = async {
        loop {
            let job = h
                .store
                .get(id)
                .await
                .expect("store get")
                .expect("job should still exist");
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("job should reach a terminal status")
}

#[tokio::test]
async fn mock_image_job_completes_with_requested_count() {
    let h = harness(MockBackend::instant());
    let id = submit(
        &h,
        Job::new(JobType::Image, ServiceMode::Mock, json!({"n": 3})),
    )
    .await;

    let job = wait_terminal(&h, id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.result_files.as_ref().map(Vec::len), Some(3));
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert!(job.error_message.is_none());

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn mock_llm_job_completes_with_text() {
    let h = harness(MockBackend::instant());
    let id = submit(
        &h,
        Job::new(JobType::Llm, ServiceMode::Mock, json!({"prompt": "hi"})),
    )
    .await;

    let job = wait_terminal(&h, id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.result_text.as_deref().unwrap_or("").contains("hi"));
    assert!(job.result_files.is_none());

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn full_error_rate_fails_the_job_with_a_message() {
    let h = harness(MockBackend::instant().with_error_rate(1.0));
    let id = submit(&h, Job::new(JobType::Image, ServiceMode::Mock, json!({}))).await;

    let job = wait_terminal(&h, id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(!job.error_message.as_deref().unwrap_or("").is_empty());
    assert!(job.completed_at.is_some());

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn job_failure_does_not_kill_the_worker() {
    let h = harness(MockBackend::instant());

    // An id with no record is dropped silently...
    h.dispatcher.enqueue(uuid::Uuid::new_v4());

    // ...and the next job still executes.
    let id = submit(&h, Job::new(JobType::Image, ServiceMode::Mock, json!({}))).await;
    let job = wait_terminal(&h, id).await;
    assert_eq!(job.status, JobStatus::Completed);

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn cancelled_pending_job_never_runs() {
    let h = harness(MockBackend::instant());
    let job = Job::new(JobType::Video, ServiceMode::Mock, json!({}));
    let id = job.id;
    h.store.save(&job).await.unwrap();

    // Cancel before the worker ever sees the job.
    assert!(h.dispatcher.cancel_job(id).await.unwrap());
    h.dispatcher.enqueue(id);

    // Run another job to be sure the worker has moved past ours.
    let other = submit(&h, Job::new(JobType::Image, ServiceMode::Mock, json!({}))).await;
    wait_terminal(&h, other).await;

    let job = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.started_at.is_none(), "cancelled job must never start");

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn cancel_publishes_a_terminal_event() {
    let h = harness(MockBackend::instant());
    let job = Job::new(JobType::Image, ServiceMode::Mock, json!({}));
    let id = job.id;
    h.store.save(&job).await.unwrap();

    let mut stream = h.bus.subscribe(id);
    assert!(h.dispatcher.cancel_job(id).await.unwrap());

    let item = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("event should arrive")
        .expect("stream should yield");
    assert!(matches!(
        item,
        StreamItem::Event(e) if e.status == JobStatus::Cancelled
    ));
    assert!(stream.next().await.is_none());

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn cancel_of_terminal_job_reports_false() {
    let h = harness(MockBackend::instant());
    let id = submit(&h, Job::new(JobType::Image, ServiceMode::Mock, json!({}))).await;
    wait_terminal(&h, id).await;

    assert!(!h.dispatcher.cancel_job(id).await.unwrap());

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn real_llm_job_fails_as_configuration_error() {
    let h = harness(MockBackend::instant());
    let id = submit(
        &h,
        Job::new(JobType::Llm, ServiceMode::Real, json!({"prompt": "hi"})),
    )
    .await;

    let job = wait_terminal(&h, id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("not supported"));

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn real_job_without_any_workflow_fails_before_progressing() {
    let h = harness(MockBackend::instant());
    let id = submit(
        &h,
        Job::new(JobType::Image, ServiceMode::Real, json!({"prompt": "x"})),
    )
    .await;

    let job = wait_terminal(&h, id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("No ComfyUI workflow"));
    // Fails during workflow resolution: progress never passes "Starting".
    assert!(job.progress <= 1);

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn progress_events_are_monotone_per_job() {
    let h = harness(MockBackend::instant());
    let job = Job::new(JobType::Image, ServiceMode::Mock, json!({"n": 1}));
    let id = job.id;
    h.store.save(&job).await.unwrap();

    let mut stream = h.bus.subscribe(id);
    h.dispatcher.enqueue(id);

    let mut last = 0u8;
    let collect = async {
        while let Some(item) = stream.next().await {
            if let StreamItem::Event(event) = item {
                assert!(event.progress >= last, "progress must not decrease");
                last = event.progress;
                if event.status.is_terminal() {
                    assert_eq!(event.status, JobStatus::Completed);
                    assert_eq!(event.progress, 100);
                    break;
                }
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("stream should finish");

    h.dispatcher.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_worker() {
    let h = harness(MockBackend::instant());
    h.dispatcher.shutdown().await;

    // Enqueue after shutdown must not panic; the id is simply dropped.
    h.dispatcher.enqueue(uuid::Uuid::new_v4());
}
