//! Per-job execution routing: mock backend or ComfyUI.

use genflow_comfyui::{inject_params, ComfyUIService, ComfyUIServiceError, WorkflowStoreError};
use genflow_core::job::{Job, JobType, ServiceMode};
use genflow_core::ProgressCallback;
use genflow_store::transitions::JobResult;

use crate::backend::{BackendError, BackendOutput, GenerationBackend};

/// Errors from executing a single job. All of them surface as a failed
/// transition; none is retried.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The job asks for something the system is not configured to do.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Workflow(#[from] WorkflowStoreError),

    #[error(transparent)]
    Service(#[from] ComfyUIServiceError),
}

/// Run a job to completion and return its result.
///
/// The caller owns all store writes: this function only performs the
/// work and reports progress through the callback.
pub async fn execute_job(
    job: &Job,
    backend: &dyn GenerationBackend,
    comfyui: &ComfyUIService,
    progress: &ProgressCallback,
) -> Result<JobResult, ExecuteError> {
    progress(1, "Starting".to_string()).await;

    match job.mode {
        ServiceMode::Mock => execute_mock(job, backend, progress).await,
        ServiceMode::Real => execute_real(job, comfyui, progress).await,
    }
}

async fn execute_mock(
    job: &Job,
    backend: &dyn GenerationBackend,
    progress: &ProgressCallback,
) -> Result<JobResult, ExecuteError> {
    let output = backend.run(job, progress).await?;

    Ok(match output {
        BackendOutput::Text(text) => JobResult {
            text: Some(text),
            files: None,
        },
        BackendOutput::Files(files) => JobResult {
            text: None,
            files: Some(files),
        },
    })
}

async fn execute_real(
    job: &Job,
    comfyui: &ComfyUIService,
    progress: &ProgressCallback,
) -> Result<JobResult, ExecuteError> {
    // LLM is always mock; a real LLM job is a configuration mistake,
    // not a crash.
    if job.job_type == JobType::Llm {
        return Err(ExecuteError::Configuration(
            "Real text generation is not supported. LLM jobs always run in mock mode.".into(),
        ));
    }

    let workflow_name = resolve_workflow_name(job, comfyui).await?;
    let workflow = comfyui.workflows().load(&workflow_name).await?;
    progress(5, format!("Loaded workflow: {workflow_name}")).await;

    let workflow = inject_params(&workflow, &job.request_payload);
    progress(10, "Parameters injected".to_string()).await;

    let output_files = comfyui.submit(&workflow, progress).await?;

    progress(98, "Outputs saved".to_string()).await;
    Ok(JobResult {
        text: None,
        files: Some(output_files),
    })
}

/// The workflow named in the request, or the first stored one.
async fn resolve_workflow_name(
    job: &Job,
    comfyui: &ComfyUIService,
) -> Result<String, ExecuteError> {
    let requested = job
        .request_payload
        .get("workflow")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");

    if !requested.is_empty() {
        return Ok(requested.to_string());
    }

    let stored = comfyui.workflows().list().await?;
    stored.into_iter().next().ok_or_else(|| {
        ExecuteError::Configuration(
            "No ComfyUI workflow specified and no workflows are available. \
             Upload a workflow in Settings > Models."
                .into(),
        )
    })
}
