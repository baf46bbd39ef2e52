//! Simulated generation backend.
//!
//! Sleeps for a configurable random delay per job type, fails with a
//! simulated server error at a configurable rate, and returns
//! placeholder results. Useful for demos, load tests, and exercising
//! the full job life cycle without a GPU.

use std::time::Duration;

use async_trait::async_trait;
use genflow_core::job::{Job, JobType};
use genflow_core::{GenConfig, ProgressCallback};
use rand::Rng;

use crate::backend::{BackendError, BackendOutput, GenerationBackend};

/// Placeholder file returned for mock image/video generations.
const PLACEHOLDER_FILE: &str = "/static/img/placeholder.png";

/// Configurable mock backend.
pub struct MockBackend {
    /// Fraction of runs that fail with a simulated error (0.0-1.0).
    error_rate: f64,
    llm_delay: (f64, f64),
    image_delay: (f64, f64),
    video_delay: (f64, f64),
}

impl MockBackend {
    pub fn new(config: &GenConfig) -> Self {
        Self {
            error_rate: config.mock_error_rate,
            llm_delay: config.mock_llm_delay,
            image_delay: config.mock_image_delay,
            video_delay: config.mock_video_delay,
        }
    }

    /// A backend with no delay and no simulated errors.
    pub fn instant() -> Self {
        Self {
            error_rate: 0.0,
            llm_delay: (0.0, 0.0),
            image_delay: (0.0, 0.0),
            video_delay: (0.0, 0.0),
        }
    }

    /// Override the simulated error rate.
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    fn delay_range(&self, job_type: JobType) -> (f64, f64) {
        match job_type {
            JobType::Llm => self.llm_delay,
            JobType::Image => self.image_delay,
            JobType::Video => self.video_delay,
        }
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn run(
        &self,
        job: &Job,
        progress: &ProgressCallback,
    ) -> Result<BackendOutput, BackendError> {
        progress(10, "Processing mock request".to_string()).await;

        // Roll the dice before any await; ThreadRng is not Send.
        let (delay, failed) = {
            let mut rng = rand::rng();
            let (min, max) = self.delay_range(job.job_type);
            let delay = if max > min {
                rng.random_range(min..=max)
            } else {
                min
            };
            (delay, rng.random::<f64>() < self.error_rate)
        };

        tokio::time::sleep(Duration::from_secs_f64(delay)).await;

        if failed {
            return Err(BackendError::Simulated(format!(
                "Mock error: simulated {} generation failure",
                job.job_type
            )));
        }

        let output = match job.job_type {
            JobType::Llm => BackendOutput::Text(mock_completion(&job.request_payload)),
            JobType::Image | JobType::Video => {
                let count = job
                    .request_payload
                    .get("n")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(1) as usize;
                BackendOutput::Files(vec![PLACEHOLDER_FILE.to_string(); count])
            }
        };

        progress(90, "Finalizing".to_string()).await;
        Ok(output)
    }
}

/// Canned completion text, echoing the request prompt when present.
fn mock_completion(payload: &serde_json::Value) -> String {
    match payload.get("prompt").and_then(serde_json::Value::as_str) {
        Some(prompt) => format!("Mock completion for: {prompt}"),
        None => "Mock completion.".to_string(),
    }
}
