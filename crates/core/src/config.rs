//! Process configuration loaded from environment variables.

use std::path::PathBuf;

/// Runtime configuration for the generation subsystem.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// Base HTTP URL of the ComfyUI server (default: `http://localhost:8188`).
    pub comfyui_base_url: String,
    /// Directory holding named workflow JSON files (default: `./workflows`).
    pub workflows_dir: PathBuf,
    /// Directory where downloaded outputs are written (default: `./outputs`).
    pub outputs_dir: PathBuf,

    /// Fraction of mock requests that simulate a server error (0.0-1.0).
    pub mock_error_rate: f64,
    /// Mock LLM delay range in seconds.
    pub mock_llm_delay: (f64, f64),
    /// Mock image delay range in seconds.
    pub mock_image_delay: (f64, f64),
    /// Mock video delay range in seconds.
    pub mock_video_delay: (f64, f64),

    /// How long `shutdown` waits for the in-flight job (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl GenConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `COMFYUI_BASE_URL`      | `http://localhost:8188`  |
    /// | `WORKFLOWS_DIR`         | `./workflows`            |
    /// | `OUTPUTS_DIR`           | `./outputs`              |
    /// | `MOCK_ERROR_RATE`       | `0.0`                    |
    /// | `MOCK_LLM_DELAY_MIN`    | `0.5`                    |
    /// | `MOCK_LLM_DELAY_MAX`    | `2.0`                    |
    /// | `MOCK_IMAGE_DELAY_MIN`  | `1.0`                    |
    /// | `MOCK_IMAGE_DELAY_MAX`  | `5.0`                    |
    /// | `MOCK_VIDEO_DELAY_MIN`  | `5.0`                    |
    /// | `MOCK_VIDEO_DELAY_MAX`  | `15.0`                   |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                     |
    pub fn from_env() -> Self {
        let comfyui_base_url = std::env::var("COMFYUI_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8188".into())
            .trim_end_matches('/')
            .to_string();

        let workflows_dir =
            PathBuf::from(std::env::var("WORKFLOWS_DIR").unwrap_or_else(|_| "./workflows".into()));
        let outputs_dir =
            PathBuf::from(std::env::var("OUTPUTS_DIR").unwrap_or_else(|_| "./outputs".into()));

        Self {
            comfyui_base_url,
            workflows_dir,
            outputs_dir,
            mock_error_rate: env_f64("MOCK_ERROR_RATE", 0.0),
            mock_llm_delay: (
                env_f64("MOCK_LLM_DELAY_MIN", 0.5),
                env_f64("MOCK_LLM_DELAY_MAX", 2.0),
            ),
            mock_image_delay: (
                env_f64("MOCK_IMAGE_DELAY_MIN", 1.0),
                env_f64("MOCK_IMAGE_DELAY_MAX", 5.0),
            ),
            mock_video_delay: (
                env_f64("MOCK_VIDEO_DELAY_MIN", 5.0),
                env_f64("MOCK_VIDEO_DELAY_MAX", 15.0),
            ),
            shutdown_timeout_secs: env_u64("SHUTDOWN_TIMEOUT_SECS", 30),
        }
    }
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            comfyui_base_url: "http://localhost:8188".into(),
            workflows_dir: "./workflows".into(),
            outputs_dir: "./outputs".into(),
            mock_error_rate: 0.0,
            mock_llm_delay: (0.5, 2.0),
            mock_image_delay: (1.0, 5.0),
            mock_video_delay: (5.0, 15.0),
            shutdown_timeout_secs: 30,
        }
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid float")),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        Err(_) => default,
    }
}
