//! SessionCoordinator - the single entry point of a paint session.
//!
//! Owns every piece of mutable session state behind one lock and is the
//! only writer of it. Network round trips and the debounce timer run in
//! spawned tasks that re-enter through the lock with the generation or
//! token they were started with, so late completions are dropped instead
//! of applied.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wallpaint_core::config::WallPaintConfig;
use wallpaint_core::error::{Result, WallPaintError};
use wallpaint_core::event::{EventBus, SessionEvent, SessionEventKind};
use wallpaint_core::image::{ImageHash, ImageSize, SessionId, UploadedImage};
use wallpaint_core::paint::{
    HexColor, Opacity, PaintParameters, PaintSettings, PaintTimings, PaintedArtifact,
};
use wallpaint_core::service::{
    MaskVisualization, PaintOutcome, SegmentationService, ServiceHealth, ServiceResult,
};
use wallpaint_core::wall::{WallId, WallInfo};

use crate::detection::{DetectionSession, DetectionState};
use crate::orchestrator::{
    Completion, OrchestratorState, PaintCommand, PaintOrchestrator, PaintSnapshot, PaintTicket,
    TriggerKind,
};
use crate::selection::SelectionModel;

/// Summary of a successful detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub session_id: Option<SessionId>,
    pub image_hash: ImageHash,
    pub wall_count: usize,
    pub from_cache: bool,
    pub image_size: Option<ImageSize>,
    pub service_time: Option<Duration>,
    pub round_trip: Duration,
}

/// Read-only projection of the session for the presentation layer.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub session_id: Option<SessionId>,
    pub image_name: Option<String>,
    /// `None` until a health check ran.
    pub service_ready: Option<bool>,
    pub detection: DetectionState,
    pub detection_report: Option<DetectionReport>,
    pub walls: Arc<Vec<WallInfo>>,
    pub selected: BTreeSet<WallId>,
    pub settings: PaintSettings,
    pub paint_state: OrchestratorState,
    pub artifact: Option<PaintedArtifact>,
    pub timings: Option<PaintTimings>,
    pub paint_calls: u64,
    /// User-facing error text of the last failed detection or paint.
    pub error: Option<String>,
    /// Informational message that is not an error ("no walls found").
    pub notice: Option<String>,
}

impl SessionView {
    pub fn image_hash(&self) -> Option<&ImageHash> {
        match &self.detection {
            DetectionState::Detected { image_hash, .. } => Some(image_hash),
            _ => None,
        }
    }
}

struct SessionState {
    session_id: Option<SessionId>,
    image: Option<Arc<UploadedImage>>,
    detection: DetectionSession,
    detection_report: Option<DetectionReport>,
    selection: SelectionModel,
    settings: PaintSettings,
    orchestrator: PaintOrchestrator,
    debounce_timer: Option<(u64, CancellationToken)>,
    service_ready: Option<bool>,
}

struct Inner {
    service: Arc<dyn SegmentationService>,
    config: WallPaintConfig,
    defaults: PaintSettings,
    state: Mutex<SessionState>,
    events: EventBus,
    busy: watch::Sender<bool>,
}

/// Detect-once/paint-many controller for one user session.
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    /// Creates a coordinator. Fails if the configured defaults are invalid.
    pub fn new(service: Arc<dyn SegmentationService>, config: WallPaintConfig) -> Result<Self> {
        let defaults = config.session.default_settings()?;
        let state = SessionState {
            session_id: None,
            image: None,
            detection: DetectionSession::new(),
            detection_report: None,
            selection: SelectionModel::new(),
            settings: defaults.clone(),
            orchestrator: PaintOrchestrator::new(config.session.debounce()),
            debounce_timer: None,
            service_ready: None,
        };
        let (busy, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                service,
                config,
                defaults,
                state: Mutex::new(state),
                events: EventBus::new(),
                busy,
            }),
        })
    }

    pub fn config(&self) -> &WallPaintConfig {
        &self.inner.config
    }

    /// Receives every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Polls the service once and records whether detection may run.
    pub async fn check_health(&self) -> Result<ServiceHealth> {
        let result = self.inner.service.health().await;
        let mut state = self.inner.state.lock().await;
        match result {
            Ok(health) => {
                state.service_ready = Some(health.sam_loaded);
                if health.sam_loaded {
                    tracing::info!(
                        "[Coordinator] Service ready (device: {})",
                        health
                            .device
                            .as_ref()
                            .map(|device| device.kind.as_str())
                            .unwrap_or("unknown")
                    );
                } else {
                    tracing::warn!("[Coordinator] Service is up but the model is not loaded");
                }
                Ok(health)
            }
            Err(failure) => {
                state.service_ready = Some(false);
                tracing::warn!("[Coordinator] Health check failed: {}", failure);
                Err(WallPaintError::from(failure))
            }
        }
    }

    /// Accepts a new image, tearing down everything that belonged to the
    /// previous one first.
    pub async fn upload(&self, image: UploadedImage) -> Result<SessionId> {
        image.validate(&self.inner.config.upload)?;

        let mut state = self.inner.state.lock().await;
        self.inner.teardown(&mut state);

        let session_id = SessionId::new();
        tracing::info!(
            "[Coordinator] Uploaded {} ({} bytes) as session {}",
            image.file_name,
            image.bytes.len(),
            session_id
        );
        state.session_id = Some(session_id);
        self.inner.publish(
            &state,
            SessionEventKind::ImageUploaded {
                file_name: image.file_name.clone(),
                bytes: image.bytes.len(),
            },
        );
        state.image = Some(Arc::new(image));
        self.inner.sync_busy(&state);
        Ok(session_id)
    }

    /// Runs the one detection round trip for the uploaded image.
    ///
    /// Returns `Ok(None)` when the image was replaced or the session reset
    /// while the request was in flight; the late response is discarded.
    pub async fn detect(&self) -> Result<Option<DetectionReport>> {
        let (generation, image, session_id) = {
            let mut state = self.inner.state.lock().await;
            let image = state
                .image
                .clone()
                .ok_or_else(|| WallPaintError::not_ready("upload an image before detecting"))?;
            if self.inner.config.session.require_health_check && state.service_ready != Some(true)
            {
                return Err(WallPaintError::ServiceUnavailable(
                    "segmentation model is not loaded (run a health check first)".to_string(),
                ));
            }
            if state.detection.is_detecting() {
                return Err(WallPaintError::not_ready("detection is already running"));
            }

            // Re-detecting the same upload replaces its walls entirely.
            let commands = state.orchestrator.reset();
            self.inner.execute(&mut state, commands)?;
            state.selection.clear();
            state.detection_report = None;

            let generation = state.detection.start()?;
            self.inner
                .publish(&state, SessionEventKind::DetectionStarted { generation });
            (generation, image, state.session_id)
        };

        tracing::info!("[Coordinator] Detecting walls in {}", image.file_name);
        let started = Instant::now();
        let result = self.inner.service.detect(&image).await;
        let round_trip = started.elapsed();

        let mut state = self.inner.state.lock().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(failure) => {
                if !state.detection.fail(generation, failure.clone()) {
                    self.inner
                        .publish(&state, SessionEventKind::DetectionDiscarded { generation });
                    return Ok(None);
                }
                self.inner.publish(
                    &state,
                    SessionEventKind::DetectionFailed {
                        kind: failure.kind,
                        message: failure.message.clone(),
                    },
                );
                return Err(WallPaintError::detection_failed(failure));
            }
        };

        let image_hash = outcome.image_hash.clone();
        match state
            .detection
            .complete(generation, outcome.image_hash, outcome.walls)
        {
            Ok(true) => {}
            Ok(false) => {
                self.inner
                    .publish(&state, SessionEventKind::DetectionDiscarded { generation });
                return Ok(None);
            }
            Err(failure) => {
                self.inner.publish(
                    &state,
                    SessionEventKind::DetectionFailed {
                        kind: failure.kind,
                        message: failure.message.clone(),
                    },
                );
                return Err(WallPaintError::detection_failed(failure));
            }
        }

        let walls = state.detection.walls().unwrap_or_default();
        state.selection.initialize_from(&walls);

        let report = DetectionReport {
            session_id,
            image_hash: image_hash.clone(),
            wall_count: walls.len(),
            from_cache: outcome.from_cache,
            image_size: outcome.image_size,
            service_time: outcome.service_time,
            round_trip,
        };
        tracing::info!(
            "[Coordinator] Detection complete in {:?}: {} walls{}",
            round_trip,
            walls.len(),
            if outcome.from_cache { " (cached)" } else { "" }
        );
        state.detection_report = Some(report.clone());

        self.inner.publish(
            &state,
            SessionEventKind::DetectionCompleted {
                image_hash,
                wall_count: walls.len(),
                from_cache: outcome.from_cache,
            },
        );
        self.inner.publish(
            &state,
            SessionEventKind::SelectionChanged {
                selected: state.selection.selected().iter().copied().collect(),
            },
        );

        if walls.is_empty() {
            tracing::warn!("[Coordinator] No walls found in {}", image.file_name);
        } else {
            self.inner.trigger_paint(&mut state, TriggerKind::Discrete)?;
        }
        Ok(Some(report))
    }

    pub async fn set_color(&self, color: &str) -> Result<()> {
        let color = HexColor::parse(color)?;
        self.update_settings(|settings| {
            let changed = settings.color != color;
            settings.color = color;
            changed
        })
        .await
    }

    /// Sets the opacity, clamped into `[0.1, 1.0]`.
    pub async fn set_opacity(&self, opacity: f32) -> Result<()> {
        let opacity = Opacity::new(opacity)?;
        self.update_settings(|settings| {
            let changed = settings.opacity != opacity;
            settings.opacity = opacity;
            changed
        })
        .await
    }

    pub async fn set_main_walls_only(&self, main_walls_only: bool) -> Result<()> {
        self.update_settings(|settings| {
            let changed = settings.main_walls_only != main_walls_only;
            settings.main_walls_only = main_walls_only;
            changed
        })
        .await
    }

    /// Flips one wall in or out of the selection. Unknown ids are ignored.
    pub async fn toggle_wall(&self, id: WallId) -> Result<bool> {
        self.update_selection(|selection| selection.toggle(id)).await
    }

    pub async fn select_all(&self) -> Result<bool> {
        self.update_selection(SelectionModel::select_all).await
    }

    pub async fn select_none(&self) -> Result<bool> {
        self.update_selection(SelectionModel::select_none).await
    }

    /// Drops the image and everything derived from it; settings return to
    /// their configured defaults.
    pub async fn reset(&self) {
        let mut state = self.inner.state.lock().await;
        self.inner.teardown(&mut state);
        state.image = None;
        state.settings = self.inner.defaults.clone();
        self.inner.publish(&state, SessionEventKind::SessionReset);
        state.session_id = None;
        self.inner.sync_busy(&state);
        tracing::info!("[Coordinator] Session reset");
    }

    /// Renders the detected masks. Independent of any paint activity.
    pub async fn visualize_masks(&self) -> Result<MaskVisualization> {
        let image_hash = {
            let state = self.inner.state.lock().await;
            state
                .detection
                .image_hash()
                .cloned()
                .ok_or_else(|| WallPaintError::not_ready("detect walls before viewing masks"))?
        };
        Ok(self.inner.service.visualize_masks(&image_hash).await?)
    }

    /// Asks the service to drop its mask cache.
    ///
    /// The current detection no longer refers to cached masks afterwards,
    /// so it is torn down; the uploaded image is kept for a new detection.
    pub async fn clear_service_cache(&self) -> Result<usize> {
        let cleared = self.inner.service.clear_cache().await?;
        let mut state = self.inner.state.lock().await;
        self.inner.teardown(&mut state);
        self.inner.sync_busy(&state);
        tracing::info!("[Coordinator] Service cache cleared ({} images)", cleared);
        Ok(cleared)
    }

    pub async fn view(&self) -> SessionView {
        let state = self.inner.state.lock().await;
        let detection = state.detection.state().clone();

        let error = match &detection {
            DetectionState::Failed { kind, message } => Some(
                WallPaintError::DetectionFailed {
                    kind: *kind,
                    message: message.clone(),
                }
                .to_string(),
            ),
            _ => state
                .orchestrator
                .last_error()
                .map(|failure| WallPaintError::paint_failed(failure.clone()).to_string()),
        };
        let notice = match &detection {
            DetectionState::Detected { walls, .. } if walls.is_empty() => {
                Some("No walls found in this image".to_string())
            }
            _ => None,
        };

        SessionView {
            session_id: state.session_id,
            image_name: state.image.as_ref().map(|image| image.file_name.clone()),
            service_ready: state.service_ready,
            walls: state.detection.walls().unwrap_or_default(),
            detection,
            detection_report: state.detection_report.clone(),
            selected: state.selection.selected().clone(),
            settings: state.settings.clone(),
            paint_state: state.orchestrator.state(),
            artifact: state.orchestrator.artifact().cloned(),
            timings: state.orchestrator.timings(),
            paint_calls: state.orchestrator.paint_count(),
            error,
            notice,
        }
    }

    /// Resolves once no paint is waiting on the debounce timer or in flight.
    pub async fn wait_until_settled(&self) {
        let mut busy = self.inner.busy.subscribe();
        // The sender lives in `inner`, so the channel cannot close under us.
        let _ = busy.wait_for(|busy| !*busy).await;
    }

    async fn update_settings<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut PaintSettings) -> bool,
    {
        let mut state = self.inner.state.lock().await;
        if !apply(&mut state.settings) {
            return Ok(());
        }
        let params = PaintParameters::new(&state.settings, state.selection.selected().clone());
        self.inner
            .publish(&state, SessionEventKind::ParametersChanged { params });
        self.inner.trigger_paint(&mut state, TriggerKind::Continuous)
    }

    async fn update_selection<F>(&self, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut SelectionModel) -> bool,
    {
        let mut state = self.inner.state.lock().await;
        if !apply(&mut state.selection) {
            return Ok(false);
        }
        self.inner.publish(
            &state,
            SessionEventKind::SelectionChanged {
                selected: state.selection.selected().iter().copied().collect(),
            },
        );
        self.inner.trigger_paint(&mut state, TriggerKind::Discrete)?;
        Ok(true)
    }
}

impl Inner {
    fn publish(&self, state: &SessionState, kind: SessionEventKind) {
        self.events.publish(SessionEvent::new(state.session_id, kind));
    }

    fn sync_busy(&self, state: &SessionState) {
        self.busy.send_replace(state.orchestrator.is_busy());
    }

    /// Synchronously resets detection, selection and painting.
    fn teardown(&self, state: &mut SessionState) {
        if let Some((_, timer)) = state.debounce_timer.take() {
            timer.cancel();
        }
        state.orchestrator.reset();
        state.detection.reset();
        state.detection_report = None;
        state.selection.clear();
    }

    /// Feeds the current parameters to the orchestrator. Before detection
    /// completes, parameters are only buffered.
    fn trigger_paint(self: &Arc<Self>, state: &mut SessionState, kind: TriggerKind) -> Result<()> {
        let Some(image_hash) = state.detection.image_hash().cloned() else {
            return Ok(());
        };
        let params = PaintParameters::new(&state.settings, state.selection.selected().clone());
        let commands = state
            .orchestrator
            .trigger(PaintSnapshot { image_hash, params }, kind);
        self.execute(state, commands)
    }

    fn execute(self: &Arc<Self>, state: &mut SessionState, commands: Vec<PaintCommand>) -> Result<()> {
        let mut result = Ok(());
        for command in commands {
            match command {
                PaintCommand::ScheduleDebounce { token, delay } => {
                    self.schedule_debounce(state, token, delay);
                }
                PaintCommand::CancelDebounce => {
                    if let Some((_, timer)) = state.debounce_timer.take() {
                        timer.cancel();
                    }
                }
                PaintCommand::Issue(ticket) => {
                    if let Err(err) = self.issue(state, ticket) {
                        result = Err(err);
                    }
                }
                PaintCommand::ClearDisplay => {
                    tracing::debug!("[Paint] Selection empty, artifact cleared");
                    self.publish(state, SessionEventKind::ArtifactCleared);
                }
            }
        }
        self.sync_busy(state);
        result
    }

    fn schedule_debounce(self: &Arc<Self>, state: &mut SessionState, token: u64, delay: Duration) {
        if let Some((_, previous)) = state.debounce_timer.take() {
            previous.cancel();
        }
        let cancel = CancellationToken::new();
        state.debounce_timer = Some((token, cancel.clone()));

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => inner.on_debounce_elapsed(token).await,
            }
        });
    }

    fn issue(self: &Arc<Self>, state: &mut SessionState, ticket: PaintTicket) -> Result<()> {
        if state.detection.image_hash() != Some(&ticket.request.image_hash) {
            tracing::error!(
                "[Paint] Refusing call #{} for stale image hash {}",
                ticket.generation,
                ticket.request.image_hash
            );
            let commands = state.orchestrator.abandon(ticket.generation);
            self.execute(state, commands)?;
            return Err(WallPaintError::invariant(format!(
                "paint call #{} carried a stale image hash",
                ticket.generation
            )));
        }

        tracing::debug!(
            "[Paint] Issuing call #{} (color={}, opacity={}, walls={:?})",
            ticket.generation,
            ticket.params.color,
            ticket.params.opacity.value(),
            ticket.params.wall_ids
        );
        self.publish(
            state,
            SessionEventKind::PaintIssued {
                generation: ticket.generation,
                params: ticket.params.clone(),
            },
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = inner.service.paint(&ticket.request).await;
            inner
                .on_paint_complete(ticket.generation, result, started.elapsed())
                .await;
        });
        Ok(())
    }

    async fn on_debounce_elapsed(self: Arc<Self>, token: u64) {
        let mut state = self.state.lock().await;
        if matches!(state.debounce_timer, Some((current, _)) if current == token) {
            state.debounce_timer = None;
        }
        let commands = state.orchestrator.debounce_elapsed(token);
        if let Err(err) = self.execute(&mut state, commands) {
            tracing::error!("[Paint] Debounced call failed to issue: {}", err);
        }
    }

    async fn on_paint_complete(
        self: Arc<Self>,
        generation: u64,
        result: ServiceResult<PaintOutcome>,
        round_trip: Duration,
    ) {
        let mut state = self.state.lock().await;
        let Some(report) = state.orchestrator.complete(generation, result, round_trip) else {
            self.sync_busy(&state);
            return;
        };

        match &report.completion {
            Completion::Applied => {
                let walls_painted = state
                    .orchestrator
                    .artifact()
                    .map(|artifact| artifact.walls_painted)
                    .unwrap_or_default();
                tracing::info!(
                    "[Paint] Call #{} applied in {:?} ({} walls)",
                    generation,
                    round_trip,
                    walls_painted
                );
                self.publish(
                    &state,
                    SessionEventKind::PaintApplied {
                        generation,
                        walls_painted,
                        round_trip_ms: round_trip.as_millis() as u64,
                    },
                );
            }
            Completion::Failed(failure) => {
                tracing::warn!(
                    "[Paint] Call #{} failed after {:?}: {}",
                    generation,
                    round_trip,
                    failure
                );
                self.publish(
                    &state,
                    SessionEventKind::PaintFailed {
                        generation,
                        kind: failure.kind,
                        message: failure.message.clone(),
                    },
                );
            }
            Completion::Discarded => {
                tracing::debug!(
                    "[Paint] Call #{} superseded, response dropped after {:?}",
                    generation,
                    round_trip
                );
                self.publish(&state, SessionEventKind::PaintDiscarded { generation });
            }
        }

        if let Err(err) = self.execute(&mut state, report.commands) {
            tracing::error!("[Paint] Follow-up call failed to issue: {}", err);
        }
    }
}
