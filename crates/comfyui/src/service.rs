//! The submit -> poll -> download protocol.
//!
//! ComfyUI's queue is asynchronous: a `POST /prompt` returns
//! immediately with a prompt id, and results only appear in the history
//! endpoint once execution finishes. The server exposes no real
//! completion percentage, so the progress reported while polling is a
//! capped time-based ramp, advisory only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use genflow_core::ProgressCallback;

use crate::api::{ComfyUIApi, ComfyUIApiError, OutputFile};
use crate::workflows::WorkflowStore;

/// Interval between history polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the total wait for one submission.
const MAX_WAIT: Duration = Duration::from_secs(600);

/// Elapsed time at which the advisory estimate reaches its cap.
const RAMP_WINDOW_SECS: u64 = 30;

/// Cap on the advisory progress estimate while polling.
const RAMP_CAP: u8 = 80;

/// File extensions routed to the `videos/` output subdirectory;
/// everything else lands in `images/`.
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "webm", "gif"];

/// Errors from the submit/poll/download protocol.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIServiceError {
    /// An HTTP call to the ComfyUI server failed.
    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    /// The server reported a render error in the history. Deterministic,
    /// never retried.
    #[error("ComfyUI error: {0}")]
    Render(String),

    /// The wait bound elapsed without any output being collected.
    #[error("ComfyUI job {prompt_id} timed out or produced no output after {waited_secs}s")]
    Timeout { prompt_id: String, waited_secs: u64 },

    /// Writing a downloaded file to the outputs directory failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// High-level client for running generations on a ComfyUI server.
///
/// Owns the REST API wrapper, the named workflow store, and the local
/// outputs directory.
pub struct ComfyUIService {
    api: ComfyUIApi,
    workflows: WorkflowStore,
    outputs_dir: PathBuf,
}

impl ComfyUIService {
    pub fn new(base_url: String, workflows_dir: PathBuf, outputs_dir: PathBuf) -> Self {
        Self {
            api: ComfyUIApi::new(base_url),
            workflows: WorkflowStore::new(workflows_dir),
            outputs_dir,
        }
    }

    /// The underlying REST API client.
    pub fn api(&self) -> &ComfyUIApi {
        &self.api
    }

    /// The named workflow store.
    pub fn workflows(&self) -> &WorkflowStore {
        &self.workflows
    }

    /// Whether the ComfyUI server answers its liveness probe.
    pub async fn is_available(&self) -> bool {
        self.api.is_available().await
    }

    /// Submit a workflow, poll for completion, and download outputs.
    ///
    /// Returns the local paths of the downloaded files. A failure to
    /// download one file is logged and skipped; the submission only
    /// fails when nothing at all was collected within the wait bound.
    pub async fn submit(
        &self,
        workflow: &serde_json::Value,
        progress: &ProgressCallback,
    ) -> Result<Vec<String>, ComfyUIServiceError> {
        let client_id = uuid::Uuid::new_v4().to_string();

        let submitted = self.api.submit_workflow(workflow, &client_id).await?;
        let prompt_id = submitted.prompt_id;
        tracing::info!(prompt_id = %prompt_id, "ComfyUI prompt queued");

        progress(5, "Queued in ComfyUI".to_string()).await;

        let mut output_files: Vec<String> = Vec::new();
        let mut elapsed = Duration::ZERO;

        while elapsed < MAX_WAIT {
            tokio::time::sleep(POLL_INTERVAL).await;
            elapsed += POLL_INTERVAL;

            let history = match self.api.get_history(&prompt_id).await {
                Ok(history) => history,
                // A failed poll is indistinguishable from "still
                // running"; keep waiting.
                Err(e) => {
                    tracing::debug!(prompt_id = %prompt_id, error = %e, "History poll failed");
                    continue;
                }
            };

            let Some(entry) = history.get(prompt_id.as_str()) else {
                let pct = estimate_progress(elapsed.as_secs());
                progress(
                    pct,
                    format!("Generating... ({}s elapsed)", elapsed.as_secs()),
                )
                .await;
                continue;
            };

            if let Some(error) = history_error(entry) {
                return Err(ComfyUIServiceError::Render(error));
            }

            for file in collect_output_files(entry) {
                match self.download_output(&file).await {
                    Ok(path) => output_files.push(path.to_string_lossy().into_owned()),
                    Err(e) => {
                        tracing::error!(
                            filename = %file.filename,
                            error = %e,
                            "Failed to download output, skipping",
                        );
                    }
                }
            }

            progress(95, "Downloading outputs".to_string()).await;
            break;
        }

        if output_files.is_empty() {
            return Err(ComfyUIServiceError::Timeout {
                prompt_id,
                waited_secs: elapsed.as_secs(),
            });
        }

        Ok(output_files)
    }

    /// Download one generated file and store it under the outputs
    /// directory, partitioned by media kind.
    async fn download_output(&self, file: &OutputFile) -> Result<PathBuf, ComfyUIServiceError> {
        let bytes = self.api.download_view(file).await?;

        let subdir = media_subdir(&file.filename);
        let dir = self.outputs_dir.join(subdir);
        tokio::fs::create_dir_all(&dir).await?;

        let local_path = dir.join(unique_local_name(&file.filename));
        tokio::fs::write(&local_path, bytes).await?;

        tracing::info!(path = %local_path.display(), "Saved ComfyUI output");
        Ok(local_path)
    }
}

/// Advisory progress estimate while the prompt is still executing:
/// proportional to elapsed time, capped at [`RAMP_CAP`].
fn estimate_progress(elapsed_secs: u64) -> u8 {
    let pct = elapsed_secs * RAMP_CAP as u64 / RAMP_WINDOW_SECS;
    pct.min(RAMP_CAP as u64) as u8
}

/// Extract a server-reported error from a history entry, if any.
fn history_error(entry: &serde_json::Value) -> Option<String> {
    entry.get("error").map(|error| match error.as_str() {
        Some(text) => text.to_string(),
        None => error.to_string(),
    })
}

/// Walk every output node in a history entry and collect the emitted
/// file descriptors (image, video, and animated-image kinds).
fn collect_output_files(entry: &serde_json::Value) -> Vec<OutputFile> {
    let mut files = Vec::new();

    let Some(outputs) = entry.get("outputs").and_then(serde_json::Value::as_object) else {
        return files;
    };

    for node_output in outputs.values() {
        for kind in ["images", "videos", "gifs"] {
            let Some(list) = node_output.get(kind).and_then(serde_json::Value::as_array) else {
                continue;
            };
            for descriptor in list {
                match serde_json::from_value::<OutputFile>(descriptor.clone()) {
                    Ok(file) => files.push(file),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping malformed output descriptor");
                    }
                }
            }
        }
    }

    files
}

/// Output subdirectory for a filename, by extension.
fn media_subdir(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        "videos"
    } else {
        "images"
    }
}

/// Collision-avoiding local filename: an 8-hex-char prefix plus the
/// original name.
fn unique_local_name(filename: &str) -> String {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{filename}", &tag[..8])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn estimate_is_monotone_and_capped() {
        let mut last = 0;
        for secs in 0..120 {
            let pct = estimate_progress(secs);
            assert!(pct >= last, "estimate must not decrease");
            assert!(pct <= RAMP_CAP);
            last = pct;
        }
        assert_eq!(estimate_progress(600), RAMP_CAP);
    }

    #[test]
    fn history_error_prefers_plain_text() {
        assert_eq!(
            history_error(&json!({"error": "CUDA out of memory"})),
            Some("CUDA out of memory".to_string())
        );

        let structured = history_error(&json!({"error": {"node": "5"}}));
        assert!(structured.unwrap().contains("node"));

        assert!(history_error(&json!({"outputs": {}})).is_none());
    }

    #[test]
    fn collects_files_across_nodes_and_kinds() {
        let entry = json!({
            "outputs": {
                "9": {
                    "images": [
                        {"filename": "a.png", "subfolder": "", "type": "output"},
                        {"filename": "b.png", "subfolder": "batch", "type": "output"}
                    ]
                },
                "12": {
                    "gifs": [{"filename": "anim.gif", "type": "output"}],
                    "videos": [{"filename": "clip.mp4", "subfolder": "", "type": "output"}]
                },
                "15": {"text": ["not a file list"]}
            }
        });

        let files = collect_output_files(&entry);
        assert_eq!(files.len(), 4);
        assert!(files.iter().any(|f| f.filename == "a.png"));
        assert!(files.iter().any(|f| f.filename == "b.png" && f.subfolder == "batch"));
        assert!(files.iter().any(|f| f.filename == "clip.mp4"));

        // Missing subfolder defaults to empty, type to "output".
        let gif = files.iter().find(|f| f.filename == "anim.gif").unwrap();
        assert_eq!(gif.subfolder, "");
        assert_eq!(gif.file_type, "output");
    }

    #[test]
    fn entry_without_outputs_collects_nothing() {
        assert!(collect_output_files(&json!({})).is_empty());
        assert!(collect_output_files(&json!({"outputs": "bogus"})).is_empty());
    }

    #[test]
    fn media_partitioning_by_extension() {
        assert_eq!(media_subdir("clip.mp4"), "videos");
        assert_eq!(media_subdir("Clip.WEBM"), "videos");
        assert_eq!(media_subdir("anim.gif"), "videos");
        assert_eq!(media_subdir("frame.png"), "images");
        assert_eq!(media_subdir("noextension"), "images");
    }

    #[test]
    fn unique_names_differ_and_keep_the_original() {
        let a = unique_local_name("out.png");
        let b = unique_local_name("out.png");
        assert_ne!(a, b);
        assert!(a.ends_with("_out.png"));
        assert_eq!(a.len(), "out.png".len() + 9);
    }
}
