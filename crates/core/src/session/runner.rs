//! Break session lifecycle
//!
//! A [`BreakSession`] owns everything one verification attempt needs: the
//! classifier artifact, the camera binding, the frame scheduler and the
//! decision state machine. Nothing is shared across sessions.

use super::decision::{AcceptanceRule, BreakStateMachine, Transition};
use super::sinks::{CompletionStore, EventSink, LAST_BREAK_COMPLETED_KEY};
use crate::classifier::{
    ArtifactSpec, ArtifactStore, ClassifierArtifact, ClassifierEngine, ModelBackend,
};
use crate::error::SessionError;
use crate::health::{components, HealthRegistry};
use crate::models::{BreakCompleted, BreakOutcome, ClassificationResult, SessionState};
use crate::observability::{StructuredLogger, VerifierMetrics};
use crate::pipeline::{
    CameraSource, FrameScheduler, FrameSlot, PipelineCounters, PipelineStats, SchedulerConfig,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default length of a break
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_secs(20);

/// Consecutive failed inferences after which the classifier is reported degraded
pub const DEGRADED_AFTER_FAILURES: u32 = 5;

const RESULT_CHANNEL_CAPACITY: usize = 4;

/// Per-session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub artifact: ArtifactSpec,
    pub scheduler: SchedulerConfig,
    pub rule: AcceptanceRule,
    /// Length of the break the caller is counting down; reported, not enforced
    pub break_duration: Duration,
}

impl SessionConfig {
    pub fn new(artifact: ArtifactSpec) -> Self {
        Self {
            artifact,
            scheduler: SchedulerConfig::default(),
            rule: AcceptanceRule::default(),
            break_duration: DEFAULT_BREAK_DURATION,
        }
    }
}

/// Injected collaborators
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<dyn ArtifactStore>,
    pub backend: Arc<dyn ModelBackend>,
    pub completions: Arc<dyn CompletionStore>,
    pub events: Arc<dyn EventSink>,
    pub metrics: VerifierMetrics,
    pub logger: StructuredLogger,
    pub health: Option<HealthRegistry>,
}

#[derive(Debug, Clone)]
struct SessionStatus {
    state: SessionState,
    evaluated: u64,
    consecutive_failures: u32,
    last_result: Option<ClassificationResult>,
    outcome: Option<BreakOutcome>,
    error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    fn initial() -> Self {
        Self {
            state: SessionState::AwaitingFrames,
            evaluated: 0,
            consecutive_failures: 0,
            last_result: None,
            outcome: None,
            error: None,
            finished_at: None,
        }
    }

    /// Set together with the terminal state, after teardown
    fn is_final(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Externally visible view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub break_duration_secs: u64,
    pub frames: PipelineStats,
    pub evaluated: u64,
    pub consecutive_failures: u32,
    pub last_result: Option<ClassificationResult>,
    pub outcome: Option<BreakOutcome>,
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Cheap handle for observing and cancelling a running session
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    started_at: DateTime<Utc>,
    break_duration: Duration,
    cancel: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    counters: Arc<PipelineCounters>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Request cancellation. No effect once the session has ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.status.borrow().state
    }

    /// True once the session has persisted its outcome and released everything
    pub fn is_finished(&self) -> bool {
        self.status.borrow().is_final()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status.borrow().clone();
        SessionSnapshot {
            id: self.id.clone(),
            state: status.state,
            started_at: self.started_at,
            break_duration_secs: self.break_duration.as_secs(),
            frames: self.counters.snapshot(),
            evaluated: status.evaluated,
            consecutive_failures: status.consecutive_failures,
            last_result: status.last_result,
            outcome: status.outcome,
            error: status.error,
            finished_at: status.finished_at,
        }
    }

    /// Wait until the session has finished and released its resources
    pub async fn finished(&self) -> SessionSnapshot {
        let mut status = self.status.clone();
        // The sender only goes away after the final status is published
        let _ = status.wait_for(SessionStatus::is_final).await;
        self.snapshot()
    }
}

/// One break-verification attempt
pub struct BreakSession {
    id: String,
    config: SessionConfig,
    deps: SessionDeps,
    cancel: CancellationToken,
    status: watch::Sender<SessionStatus>,
    counters: Arc<PipelineCounters>,
}

impl BreakSession {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> (Self, SessionHandle) {
        let id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let counters = Arc::new(PipelineCounters::new());
        let (status_tx, status_rx) = watch::channel(SessionStatus::initial());

        let handle = SessionHandle {
            id: id.clone(),
            started_at: Utc::now(),
            break_duration: config.break_duration,
            cancel: cancel.clone(),
            status: status_rx,
            counters: counters.clone(),
        };
        let session = Self {
            id,
            config,
            deps,
            cancel,
            status: status_tx,
            counters,
        };
        (session, handle)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Drive the session to a terminal state.
    ///
    /// Setup failures (artifact or camera) are returned as errors after all
    /// acquired resources have been released.
    pub async fn run(self, camera: &mut dyn CameraSource) -> Result<BreakOutcome, SessionError> {
        self.deps.metrics.inc_sessions_started();
        self.deps
            .logger
            .log_session_started(&self.id, self.config.break_duration.as_secs());
        self.set_health(components::SESSION, None).await;

        let engine = match self.load_engine().await {
            Ok(Some(engine)) => engine,
            Ok(None) => return Ok(self.finish_cancelled("cancelled during setup").await),
            Err(e) => {
                self.finish_failed(&e).await;
                return Err(e);
            }
        };

        let slot = Arc::new(FrameSlot::new());
        if let Err(e) = camera.bind(slot.clone()).await {
            warn!(session_id = %self.id, camera = camera.name(), error = %e, "Camera bind failed");
            self.set_health(components::CAMERA, Some(e.to_string())).await;
            release_engine(engine).await;
            let e = SessionError::from(e);
            self.finish_failed(&e).await;
            return Err(e);
        }
        self.set_health(components::CAMERA, None).await;
        debug!(session_id = %self.id, camera = camera.name(), "Camera bound");

        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let pipeline_cancel = self.cancel.child_token();
        let scheduler = FrameScheduler::new(
            engine.clone(),
            self.config.scheduler,
            self.counters.clone(),
            self.deps.metrics.clone(),
        );
        let scheduler_task = tokio::spawn(scheduler.run(
            slot.clone(),
            results_tx,
            pipeline_cancel.clone(),
        ));

        let mut machine = BreakStateMachine::new(self.config.rule.clone());
        let outcome = self.decide(&mut machine, results_rx).await;

        // Stop the pipeline so nothing else reaches the machine
        pipeline_cancel.cancel();

        let completed_at = Utc::now();
        self.conclude(&outcome, completed_at).await;

        camera.unbind().await;
        slot.close();
        if let Err(e) = scheduler_task.await {
            warn!(session_id = %self.id, error = %e, "Frame scheduler task failed");
        }
        release_engine(engine).await;

        self.status.send_modify(|status| {
            status.state = machine.state();
            status.outcome = Some(outcome.clone());
            status.finished_at = Some(completed_at);
        });
        info!(
            session_id = %self.id,
            state = %machine.state(),
            evaluated = machine.evaluated(),
            "Break session finished"
        );

        Ok(outcome)
    }

    /// Feed results into the state machine until it completes or the session is
    /// cancelled. The receiver is dropped on return, which stops the scheduler.
    async fn decide(
        &self,
        machine: &mut BreakStateMachine,
        mut results: mpsc::Receiver<ClassificationResult>,
    ) -> BreakOutcome {
        let mut degraded = false;
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    machine.cancel();
                    return BreakOutcome::Cancelled;
                }

                received = results.recv() => {
                    let Some(result) = received else {
                        warn!(session_id = %self.id, "Frame pipeline stopped unexpectedly");
                        machine.cancel();
                        return BreakOutcome::Cancelled;
                    };

                    let transition = machine.on_result(result);
                    degraded = self.track_failures(machine, degraded).await;
                    self.publish(machine);

                    match transition {
                        Transition::Completed { label, confidence } => {
                            return BreakOutcome::Completed { label, confidence };
                        }
                        Transition::Rejected(reason) => {
                            debug!(session_id = %self.id, reason = %reason, "Result rejected");
                        }
                        Transition::Ignored => {}
                    }
                }
            }
        }
    }

    /// Persist and announce the outcome; runs before teardown and the final status
    async fn conclude(&self, outcome: &BreakOutcome, at: DateTime<Utc>) {
        match outcome {
            BreakOutcome::Completed { label, confidence } => {
                self.record_completion(label, *confidence, at).await;
            }
            BreakOutcome::Cancelled => {
                self.deps.metrics.inc_sessions_cancelled();
                self.deps.logger.log_session_cancelled(&self.id, "cancelled");
            }
        }
    }

    /// Load the artifact on the blocking pool. `Ok(None)` means cancelled first.
    async fn load_engine(&self) -> Result<Option<Arc<ClassifierEngine>>, SessionError> {
        let store = self.deps.store.clone();
        let backend = self.deps.backend.clone();
        let spec = self.config.artifact.clone();
        let loader = tokio::task::spawn_blocking(move || {
            ClassifierArtifact::load(store.as_ref(), &spec, backend.as_ref())
        });

        // A load that finishes after cancellation drops, and so releases, its artifact
        let joined = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(None),
            joined = loader => joined,
        };

        let artifact = match joined {
            Ok(Ok(artifact)) => artifact,
            Ok(Err(e)) => {
                self.deps.logger.log_artifact_load_failed(
                    &self.id,
                    &self.config.artifact.model,
                    &e.to_string(),
                );
                self.set_health(components::CLASSIFIER, Some(e.to_string()))
                    .await;
                return Err(e.into());
            }
            Err(e) => return Err(SessionError::Loader(e.to_string())),
        };

        self.deps.logger.log_artifact_loaded(
            &self.id,
            &self.config.artifact.model,
            artifact.label_count(),
        );
        self.deps.metrics.set_labels_loaded(artifact.label_count());
        self.set_health(components::CLASSIFIER, None).await;

        Ok(Some(Arc::new(ClassifierEngine::new(artifact))))
    }

    async fn record_completion(&self, label: &str, confidence: f32, at: DateTime<Utc>) {
        let timestamp_ms = at.timestamp_millis();
        if let Err(e) = self
            .deps
            .completions
            .record_completion(LAST_BREAK_COMPLETED_KEY, timestamp_ms)
            .await
        {
            warn!(session_id = %self.id, error = %e, "Failed to persist break completion");
        }

        let event = BreakCompleted {
            session_id: self.id.clone(),
            result_label: label.to_string(),
            confidence,
            completed_at: timestamp_ms,
        };
        self.deps.events.emit(&event).await;

        self.deps.metrics.inc_breaks_completed();
        self.deps
            .logger
            .log_break_completed(&self.id, label, confidence);
    }

    /// Progress only. A terminal machine shows as `Evaluating` until the
    /// outcome is persisted and resources are released.
    fn publish(&self, machine: &BreakStateMachine) {
        let state = match machine.state() {
            state if state.is_terminal() => SessionState::Evaluating,
            state => state,
        };
        self.status.send_modify(|status| {
            status.state = state;
            status.evaluated = machine.evaluated();
            status.consecutive_failures = machine.consecutive_failures();
            status.last_result = machine.last_result().cloned();
        });
    }

    /// Flip classifier health when failures start or stop repeating
    async fn track_failures(&self, machine: &BreakStateMachine, degraded: bool) -> bool {
        let failures = machine.consecutive_failures();
        if !degraded && failures >= DEGRADED_AFTER_FAILURES {
            warn!(
                session_id = %self.id,
                consecutive_failures = failures,
                "Classifier keeps failing"
            );
            if let Some(health) = &self.deps.health {
                health
                    .set_degraded(
                        components::CLASSIFIER,
                        format!("{failures} consecutive inference failures"),
                    )
                    .await;
            }
            return true;
        }
        if degraded && failures == 0 {
            self.set_health(components::CLASSIFIER, None).await;
            return false;
        }
        degraded
    }

    async fn set_health(&self, component: &str, failure: Option<String>) {
        if let Some(health) = &self.deps.health {
            match failure {
                Some(message) => health.set_unhealthy(component, message).await,
                None => health.set_healthy(component).await,
            }
        }
    }

    async fn finish_cancelled(&self, reason: &str) -> BreakOutcome {
        self.deps.metrics.inc_sessions_cancelled();
        self.deps.logger.log_session_cancelled(&self.id, reason);
        self.status.send_modify(|status| {
            status.state = SessionState::Cancelled;
            status.outcome = Some(BreakOutcome::Cancelled);
            status.finished_at = Some(Utc::now());
        });
        BreakOutcome::Cancelled
    }

    async fn finish_failed(&self, error: &SessionError) {
        self.deps.metrics.inc_sessions_cancelled();
        self.deps.logger.log_session_cancelled(&self.id, "setup failed");
        self.set_health(components::SESSION, Some(error.to_string())).await;
        self.status.send_modify(|status| {
            status.state = SessionState::Cancelled;
            status.error = Some(error.to_string());
            status.finished_at = Some(Utc::now());
        });
    }
}

/// Close the engine off the async runtime; waits for any in-flight inference
async fn release_engine(engine: Arc<ClassifierEngine>) {
    match tokio::task::spawn_blocking(move || engine.close()).await {
        Ok(true) => debug!("Classifier released"),
        Ok(false) => debug!("Classifier was already released"),
        Err(e) => warn!(error = %e, "Failed to release classifier"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::MemoryArtifactStore;
    use crate::error::{ArtifactLoadError, CaptureBindingError, InferenceError, StoreError};
    use crate::health::ComponentStatus;
    use crate::pipeline::{ManualCamera, ManualFeed};
    use crate::session::sinks::{BroadcastEventSink, MemoryCompletionStore};
    use crate::test_support::{
        frame, wait_until, ScriptedBackend, ScriptedClassifier, LABELS_TXT, TEST_SIDE,
    };
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::task::JoinHandle;

    /// Completion store that takes a while to persist
    struct SlowCompletionStore {
        inner: MemoryCompletionStore,
        delay: Duration,
    }

    #[async_trait]
    impl CompletionStore for SlowCompletionStore {
        async fn record_completion(&self, key: &str, timestamp_ms: i64) -> Result<(), StoreError> {
            tokio::time::sleep(self.delay).await;
            self.inner.record_completion(key, timestamp_ms).await
        }

        async fn last_completion(&self, key: &str) -> Result<Option<i64>, StoreError> {
            self.inner.last_completion(key).await
        }
    }

    struct Fixture {
        completions: Arc<MemoryCompletionStore>,
        events: BroadcastEventSink,
        health: HealthRegistry,
        deps: SessionDeps,
    }

    fn fixture(classifier: ScriptedClassifier) -> Fixture {
        let store = MemoryArtifactStore::new()
            .with_entry("model.onnx", b"weights".to_vec())
            .with_entry("labels.txt", LABELS_TXT.to_vec());
        let completions = Arc::new(MemoryCompletionStore::new());
        let events = BroadcastEventSink::new(8);
        let health = HealthRegistry::new();

        let deps = SessionDeps {
            store: Arc::new(store),
            backend: Arc::new(ScriptedBackend::new(classifier)),
            completions: completions.clone(),
            events: Arc::new(events.clone()),
            metrics: VerifierMetrics::new(),
            logger: StructuredLogger::new("test-device"),
            health: Some(health.clone()),
        };
        Fixture {
            completions,
            events,
            health,
            deps,
        }
    }

    fn config() -> SessionConfig {
        let mut config =
            SessionConfig::new(ArtifactSpec::new("model.onnx", "labels.txt", TEST_SIDE));
        config.scheduler.throttle_interval = Duration::ZERO;
        config
    }

    fn launch(
        config: SessionConfig,
        deps: SessionDeps,
        mut camera: ManualCamera,
    ) -> (SessionHandle, JoinHandle<Result<BreakOutcome, SessionError>>) {
        let (session, handle) = BreakSession::new(config, deps);
        let task = tokio::spawn(async move { session.run(&mut camera).await });
        (handle, task)
    }

    async fn push_and_wait(feed: &ManualFeed, handle: &SessionHandle, inferences: u64) {
        feed.push(frame());
        let handle = handle.clone();
        wait_until(move || {
            handle.snapshot().evaluated >= inferences || handle.is_finished()
        })
        .await;
    }

    #[tokio::test]
    async fn test_end_to_end_completes_once() {
        let f = fixture(ScriptedClassifier::new(vec![0.92, 0.08]));
        let mut events = f.events.subscribe();
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        assert!(feed.wait_bound().await);
        feed.push(frame());
        feed.push(frame());

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            BreakOutcome::Completed {
                label: "Close_eyes".to_string(),
                confidence: 0.92
            }
        );

        let writes = f.completions.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, LAST_BREAK_COMPLETED_KEY);

        let event = events.try_recv().unwrap();
        assert_eq!(event.result_label, "Close_eyes");
        assert_eq!(event.session_id, handle.id());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Completed);
        assert_eq!(snapshot.outcome, Some(outcome));
        assert!(!feed.is_bound());
        assert!(!feed.push(frame()));
    }

    #[tokio::test]
    async fn test_inference_error_does_not_end_session() {
        let classifier = ScriptedClassifier::new(vec![0.92, 0.08])
            .then_fail(InferenceError::Runtime("transient".to_string()));
        let f = fixture(classifier);
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        assert!(feed.wait_bound().await);
        push_and_wait(&feed, &handle, 1).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::AwaitingFrames);
        assert!(snapshot.last_result.unwrap().is_error());
        assert_eq!(snapshot.consecutive_failures, 1);

        feed.push(frame());
        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.is_completed());
        assert_eq!(f.completions.writes().len(), 1);
        assert_eq!(handle.snapshot().frames.inference_failures, 1);
    }

    #[tokio::test]
    async fn test_open_eyes_keeps_waiting_until_cancelled() {
        let f = fixture(ScriptedClassifier::new(vec![0.03, 0.97]));
        let mut events = f.events.subscribe();
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        assert!(feed.wait_bound().await);
        push_and_wait(&feed, &handle, 1).await;
        push_and_wait(&feed, &handle, 2).await;
        assert_eq!(handle.state(), SessionState::AwaitingFrames);

        handle.cancel();
        assert_eq!(task.await.unwrap().unwrap(), BreakOutcome::Cancelled);
        assert_eq!(handle.state(), SessionState::Cancelled);
        assert!(f.completions.writes().is_empty());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(!feed.is_bound());
    }

    #[tokio::test]
    async fn test_cancel_before_any_frame() {
        let classifier = ScriptedClassifier::new(vec![0.92, 0.08]);
        let calls = classifier.calls();
        let f = fixture(classifier);
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        assert!(feed.wait_bound().await);
        handle.cancel();

        assert_eq!(task.await.unwrap().unwrap(), BreakOutcome::Cancelled);
        let snapshot = handle.finished().await;
        assert_eq!(snapshot.state, SessionState::Cancelled);
        assert_eq!(snapshot.evaluated, 0);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_aborts_session() {
        let mut f = fixture(ScriptedClassifier::new(vec![0.92, 0.08]));
        f.deps.store = Arc::new(MemoryArtifactStore::new().with_entry("labels.txt", LABELS_TXT));
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Artifact(ArtifactLoadError::Missing { .. })
        ));
        assert!(!feed.is_bound());

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, SessionState::Cancelled);
        assert!(snapshot.error.is_some());
        assert_eq!(
            f.health.status_of(components::CLASSIFIER).await,
            Some(ComponentStatus::Unhealthy)
        );
        assert_eq!(
            f.health.status_of(components::SESSION).await,
            Some(ComponentStatus::Unhealthy)
        );

        // The next session that starts clears it again
        let mut retry = fixture(ScriptedClassifier::new(vec![0.92, 0.08]));
        retry.deps.health = Some(f.health.clone());
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), retry.deps, camera);
        assert!(feed.wait_bound().await);
        assert_eq!(
            f.health.status_of(components::SESSION).await,
            Some(ComponentStatus::Healthy)
        );
        handle.cancel();
        assert_eq!(task.await.unwrap().unwrap(), BreakOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_finished_waits_for_persistence_and_teardown() {
        let mut f = fixture(ScriptedClassifier::new(vec![0.92, 0.08]));
        let store = Arc::new(SlowCompletionStore {
            inner: MemoryCompletionStore::new(),
            delay: Duration::from_millis(300),
        });
        f.deps.completions = store.clone();
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        assert!(feed.wait_bound().await);
        feed.push(frame());
        let watcher = handle.clone();
        wait_until(move || watcher.snapshot().evaluated >= 1).await;

        // Accepted, but the completion is still being written
        assert!(!handle.is_finished());
        assert_eq!(handle.state(), SessionState::Evaluating);
        assert!(handle.snapshot().outcome.is_none());

        let snapshot = handle.finished().await;
        assert_eq!(snapshot.state, SessionState::Completed);
        assert!(snapshot.outcome.as_ref().is_some_and(BreakOutcome::is_completed));
        assert_eq!(store.inner.writes().len(), 1);
        assert!(!feed.is_bound());
        assert!(task.await.unwrap().unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_results_after_completion_have_no_effect() {
        let f = fixture(ScriptedClassifier::new(vec![0.92, 0.08]));
        let mut events = f.events.subscribe();
        let (session, handle) = BreakSession::new(config(), f.deps);

        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let accepted = ClassificationResult::new("Close_eyes", 0.92, vec![0.92, 0.08]);
        tx.send(accepted.clone()).await.unwrap();
        tx.send(accepted).await.unwrap();

        let mut machine = BreakStateMachine::new(session.config.rule.clone());
        let outcome = session.decide(&mut machine, rx).await;
        session.conclude(&outcome, Utc::now()).await;

        assert!(outcome.is_completed());
        assert_eq!(machine.evaluated(), 1);
        assert_eq!(handle.snapshot().evaluated, 1);
        // The receiver is gone, so the scheduler would stop on its next send
        assert!(tx.is_closed());

        assert_eq!(f.completions.writes().len(), 1);
        assert!(events.try_recv().is_ok());
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_camera_bind_failure_is_reported() {
        let f = fixture(ScriptedClassifier::new(vec![0.92, 0.08]));
        let camera = ManualCamera::unavailable("camera in use");
        let (handle, task) = launch(config(), f.deps, camera);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Capture(CaptureBindingError::Unavailable(_))
        ));
        assert!(handle.is_finished());
        assert_eq!(
            f.health.status_of(components::CAMERA).await,
            Some(ComponentStatus::Unhealthy)
        );
        assert!(f.completions.writes().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_failures_degrade_classifier() {
        let mut classifier = ScriptedClassifier::new(vec![0.92, 0.08]);
        for _ in 0..DEGRADED_AFTER_FAILURES {
            classifier = classifier.then_fail(InferenceError::Runtime("fault".to_string()));
        }
        let f = fixture(classifier);
        let (camera, feed) = ManualCamera::new();
        let (handle, task) = launch(config(), f.deps, camera);

        assert!(feed.wait_bound().await);
        for n in 1..=DEGRADED_AFTER_FAILURES as u64 {
            push_and_wait(&feed, &handle, n).await;
        }
        assert_eq!(
            f.health.status_of(components::CLASSIFIER).await,
            Some(ComponentStatus::Degraded)
        );
        assert_eq!(handle.state(), SessionState::AwaitingFrames);

        feed.push(frame());
        assert!(task.await.unwrap().unwrap().is_completed());
        assert_eq!(
            f.health.status_of(components::CLASSIFIER).await,
            Some(ComponentStatus::Healthy)
        );
    }
}
