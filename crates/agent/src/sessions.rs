//! Break session management
//!
//! The agent runs at most one break session at a time. Each session gets a
//! fresh camera from the factory and its own classifier artifact.

use chrono::{DateTime, Utc};
use eyebreak_core::pipeline::CameraSource;
use eyebreak_core::session::{
    BreakSession, SessionConfig, SessionDeps, SessionHandle, SessionSnapshot,
    LAST_BREAK_COMPLETED_KEY,
};
use eyebreak_core::BreakOutcome;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Produces the camera for a new session
pub type CameraFactory = Arc<dyn Fn() -> Box<dyn CameraSource> + Send + Sync>;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("break session {0} is already running")]
    AlreadyActive(String),
}

/// How the most recent session ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastBreak {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BreakOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastBreakResponse {
    /// Persisted completion timestamp, milliseconds since the Unix epoch
    pub last_completed_at: Option<i64>,
    pub last_session: Option<LastBreak>,
}

struct ActiveSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

pub struct BreakCoordinator {
    template: SessionConfig,
    deps: SessionDeps,
    camera_factory: CameraFactory,
    active: Mutex<Option<ActiveSession>>,
    last: Arc<RwLock<Option<LastBreak>>>,
}

impl BreakCoordinator {
    pub fn new(template: SessionConfig, deps: SessionDeps, camera_factory: CameraFactory) -> Self {
        Self {
            template,
            deps,
            camera_factory,
            active: Mutex::new(None),
            last: Arc::new(RwLock::new(None)),
        }
    }

    /// Start a session unless one is already running
    pub async fn start(
        &self,
        break_duration: Option<Duration>,
    ) -> Result<SessionSnapshot, CoordinatorError> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.handle.is_finished() {
                return Err(CoordinatorError::AlreadyActive(
                    current.handle.id().to_string(),
                ));
            }
        }

        let mut config = self.template.clone();
        if let Some(duration) = break_duration {
            config.break_duration = duration;
        }

        let (session, handle) = BreakSession::new(config, self.deps.clone());
        let mut camera = (self.camera_factory)();
        let last = self.last.clone();
        let watcher = handle.clone();

        let task = tokio::spawn(async move {
            let result = session.run(camera.as_mut()).await;
            let snapshot = watcher.snapshot();
            let record = match result {
                Ok(outcome) => LastBreak {
                    session_id: snapshot.id,
                    outcome: Some(outcome),
                    error: None,
                    finished_at: snapshot.finished_at.unwrap_or_else(Utc::now),
                },
                Err(e) => {
                    warn!(session_id = %snapshot.id, error = %e, "Break session failed");
                    LastBreak {
                        session_id: snapshot.id,
                        outcome: None,
                        error: Some(e.to_string()),
                        finished_at: snapshot.finished_at.unwrap_or_else(Utc::now),
                    }
                }
            };
            *last.write().await = Some(record);
        });

        info!(session_id = %handle.id(), "Break session launched");
        let snapshot = handle.snapshot();
        *active = Some(ActiveSession { handle, task });
        Ok(snapshot)
    }

    /// Snapshot of the running session, if any
    pub async fn current(&self) -> Option<SessionSnapshot> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .filter(|session| !session.handle.is_finished())
            .map(|session| session.handle.snapshot())
    }

    /// Cancel the running session and wait for it to wind down
    pub async fn cancel(&self) -> Option<SessionSnapshot> {
        let session = {
            let mut active = self.active.lock().await;
            match active.as_ref() {
                Some(session) if !session.handle.is_finished() => active.take(),
                _ => None,
            }
        }?;

        session.handle.cancel();
        if let Err(e) = session.task.await {
            warn!(error = %e, "Break session task panicked");
        }
        Some(session.handle.snapshot())
    }

    pub async fn last(&self) -> LastBreakResponse {
        let last_completed_at = match self
            .deps
            .completions
            .last_completion(LAST_BREAK_COMPLETED_KEY)
            .await
        {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, "Failed to read last completion");
                None
            }
        };

        LastBreakResponse {
            last_completed_at,
            last_session: self.last.read().await.clone(),
        }
    }

    /// Cancel anything still running; used on agent shutdown
    pub async fn shutdown(&self) {
        if let Some(snapshot) = self.cancel().await {
            info!(session_id = %snapshot.id, "Cancelled break session on shutdown");
        }
    }
}
