//! Shared domain types for the genflow generation platform.
//!
//! This crate defines the [`Job`] record and its life-cycle state
//! machine, the progress-callback type threaded through job execution,
//! common error types, and environment-driven configuration. It has no
//! I/O of its own; persistence, HTTP, and scheduling live in the
//! sibling crates.

pub mod config;
pub mod error;
pub mod job;
pub mod progress;
pub mod types;

pub use config::GenConfig;
pub use error::CoreError;
pub use job::{Job, JobFilter, JobStatus, JobType, ServiceMode};
pub use progress::{noop_progress, progress_fn, ProgressCallback, ProgressFuture};
