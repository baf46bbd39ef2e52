//! ComfyUI HTTP client library.
//!
//! Everything needed to run a generation job against a ComfyUI server:
//! REST API wrappers, named workflow storage, runtime parameter
//! injection into workflow graphs, and the submit -> poll -> download
//! protocol that turns a queued prompt into local output files.

pub mod api;
pub mod inject;
pub mod service;
pub mod workflows;

pub use api::{ComfyUIApi, ComfyUIApiError, OutputFile, SubmitResponse};
pub use inject::inject_params;
pub use service::{ComfyUIService, ComfyUIServiceError};
pub use workflows::{WorkflowStore, WorkflowStoreError};
