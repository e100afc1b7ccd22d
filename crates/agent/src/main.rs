//! EyeBreak agent - on-device break verification
//!
//! Long-running process that verifies "eyes closed" breaks against a camera
//! feed and exposes the break API, health probes and metrics.

use anyhow::Result;
use eyebreak_agent::{api, config, sessions};
use eyebreak_core::{
    classifier::{FsArtifactStore, OnnxBackend},
    models::{BreakCompleted, BREAK_COMPLETED_EVENT},
    health::{components, HealthRegistry},
    observability::{StructuredLogger, VerifierMetrics},
    pipeline::{CameraSource, ManualCamera, ReplayCamera},
    session::{BroadcastEventSink, FileCompletionStore, SessionDeps},
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting eyebreak-agent");

    let config = config::AgentConfig::load()?;
    info!(
        device_name = %config.device_name,
        model = %config.model_path,
        frames_dir = ?config.frames_dir,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::CAMERA).await;
    health_registry.register(components::CLASSIFIER).await;
    health_registry.register(components::SESSION).await;

    let metrics = VerifierMetrics::new();
    let logger = StructuredLogger::new(&config.device_name);
    logger.log_startup(AGENT_VERSION, &config.model_path);

    let events = BroadcastEventSink::new(16);
    tokio::spawn(log_completions(events.subscribe()));

    let deps = SessionDeps {
        store: Arc::new(FsArtifactStore::new(".")),
        backend: Arc::new(OnnxBackend),
        completions: Arc::new(FileCompletionStore::new(&config.state_path)),
        events: Arc::new(events),
        metrics: metrics.clone(),
        logger: logger.clone(),
        health: Some(health_registry.clone()),
    };

    let frames_dir = config.frames_dir.clone();
    let replay_fps = config.replay_fps;
    let camera_factory: sessions::CameraFactory = Arc::new(move || -> Box<dyn CameraSource> {
        match &frames_dir {
            Some(dir) => Box::new(ReplayCamera::new(dir.clone(), replay_fps)),
            None => Box::new(ManualCamera::unavailable(
                "no camera configured, set EYEBREAK_FRAMES_DIR",
            )),
        }
    });

    let coordinator = Arc::new(sessions::BreakCoordinator::new(
        config.session_config(),
        deps,
        camera_factory,
    ));
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        coordinator.clone(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => warn!(error = %e, "API server failed"),
                Err(e) => warn!(error = %e, "API server task panicked"),
            }
        }
    }

    coordinator.shutdown().await;
    info!("Shutting down");

    Ok(())
}

async fn log_completions(mut events: broadcast::Receiver<BreakCompleted>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(
                event = BREAK_COMPLETED_EVENT,
                session_id = %event.session_id,
                label = %event.result_label,
                confidence = event.confidence,
                completed_at = event.completed_at,
                "Break completion published"
            ),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Completion log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
