//! The [`Job`] record and its life-cycle state machine.
//!
//! A job moves through `Pending -> Running -> {Completed | Failed |
//! Cancelled}`, with `Pending -> Cancelled` also allowed (a job may be
//! cancelled before the worker picks it up). Terminal states are final.
//! [`JobStatus::can_transition_to`] is the single source of truth for
//! valid transitions; every status write in the store helpers goes
//! through it.

use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// Kind of generation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Llm,
    Image,
    Video,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobType::Llm => "llm",
            JobType::Image => "image",
            JobType::Video => "video",
        };
        f.write_str(s)
    }
}

/// Whether a job is simulated locally or executed on a ComfyUI server.
///
/// LLM jobs are always [`Mock`](ServiceMode::Mock); there is no real
/// text-generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    Mock,
    Real,
}

impl std::fmt::Display for ServiceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ServiceMode::Mock => "mock",
            ServiceMode::Real => "real",
        })
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed, failed, and cancelled jobs accept no further
    /// transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a valid transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Pending => matches!(next, JobStatus::Running | JobStatus::Cancelled),
            JobStatus::Running => next.is_terminal(),
            // Terminal states are final.
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        })
    }
}

/// One user-initiated generation request and its tracked life cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub mode: ServiceMode,
    pub status: JobStatus,

    /// Original request, stored verbatim and never mutated.
    pub request_payload: serde_json::Value,

    /// Completion percentage (0-100). Only meaningful while running;
    /// pinned to 100 on completion.
    pub progress: u8,
    pub progress_message: Option<String>,

    /// Set exactly once, at the completed transition.
    pub result_text: Option<String>,
    pub result_files: Option<Vec<String>>,
    /// Set exactly once, at the failed transition.
    pub error_message: Option<String>,

    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// Create a new pending job with a fresh UUID.
    pub fn new(job_type: JobType, mode: ServiceMode, request_payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            job_type,
            mode,
            status: JobStatus::Pending,
            request_payload,
            progress: 0,
            progress_message: None,
            result_text: None,
            result_files: None,
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Wall-clock execution time, once both timestamps exist.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

/// Filter parameters for job listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<usize>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<usize>,
}

/// Default page size for job listing.
pub const DEFAULT_LIMIT: usize = 50;

/// Maximum page size for job listing.
pub const MAX_LIMIT: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        // A job only fails out of Running; cancellation is the one way
        // to end a job that never started.
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn running_transitions_to_all_terminals() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                JobStatus::Pending,
                JobStatus::Running,
                JobStatus::Completed,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_serializes_lowercase() {
        let s = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(s, "\"cancelled\"");
    }

    #[test]
    fn new_job_is_pending_with_no_timestamps() {
        let job = Job::new(
            JobType::Image,
            ServiceMode::Mock,
            serde_json::json!({"prompt": "a cat"}),
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.duration_seconds().is_none());
    }
}
