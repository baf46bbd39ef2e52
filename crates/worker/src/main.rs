//! Process entry point: wires the store, progress bus, backends, and
//! dispatcher together, then runs until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use genflow_comfyui::ComfyUIService;
use genflow_core::GenConfig;
use genflow_dispatch::{JobDispatcher, MockBackend};
use genflow_events::ProgressBus;
use genflow_store::{JobStore, MemoryJobStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genflow=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GenConfig::from_env();
    tracing::info!(
        comfyui_url = %config.comfyui_base_url,
        workflows_dir = %config.workflows_dir.display(),
        outputs_dir = %config.outputs_dir.display(),
        "Starting genflow worker",
    );

    let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
    let bus = Arc::new(ProgressBus::new());
    let backend = Arc::new(MockBackend::new(&config));
    let comfyui = Arc::new(ComfyUIService::new(
        config.comfyui_base_url.clone(),
        config.workflows_dir.clone(),
        config.outputs_dir.clone(),
    ));

    if comfyui.is_available().await {
        tracing::info!("ComfyUI server is reachable");
    } else {
        tracing::warn!("ComfyUI server is unavailable; real-mode jobs will fail");
    }

    let dispatcher = JobDispatcher::start(
        store,
        bus,
        backend,
        comfyui,
        Duration::from_secs(config.shutdown_timeout_secs),
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    tracing::info!("Shutdown signal received");

    dispatcher.shutdown().await;
}
