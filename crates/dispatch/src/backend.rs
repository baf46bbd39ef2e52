//! The generation backend collaborator interface.

use async_trait::async_trait;
use genflow_core::job::Job;
use genflow_core::ProgressCallback;

/// What a backend produced for a finished job.
#[derive(Debug, Clone)]
pub enum BackendOutput {
    /// Generated text (LLM jobs).
    Text(String),
    /// Paths or URLs of generated files (image/video jobs).
    Files(Vec<String>),
}

/// Errors from a generation backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// A deliberately simulated failure (mock backend error rate).
    #[error("{0}")]
    Simulated(String),

    /// Any other backend failure.
    #[error("Backend failure: {0}")]
    Other(String),
}

/// Performs the actual generation work for a job.
///
/// Implementations report progress through the callback; the dispatcher
/// wires that callback to the job record and the progress bus.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn run(
        &self,
        job: &Job,
        progress: &ProgressCallback,
    ) -> Result<BackendOutput, BackendError>;
}
