// SPDX-License-Identifier: GPL-3.0-only

//! Session orchestration
//!
//! A [`SessionController`] turns a host request into a running [`Session`]:
//! the request is parsed, the graph is built and moved onto the processing
//! thread, and the preview starts. The session then accepts UI commands
//! until one of them (or a failure, or the user closing it) produces the
//! single [`SessionOutcome`].
//!
//! Before the outcome is sent the processing thread has exited, which means
//! the camera is released and any unaccepted capture file is deleted. A
//! watcher task follows the graph's events, so a recording that fails while
//! the host is idle still ends the session and delivers the outcome.

pub mod host;

use crate::backends::MediaBackend;
use crate::backends::camera::types::{CameraSettings, Frame};
use crate::config::{self, ChromaKeyConfig, Config, HostRequest, OperationMode, SessionConfig};
use crate::constants::{chroma, pipeline};
use crate::errors::{RecordingError, SessionError, SessionResult};
use crate::pipelines::graph::{GraphError, GraphEvent, GraphLayout, PipelineGraph};
use crate::pipelines::photo::{EncodingFormat, PhotoEncoder};
use crate::pipelines::recording::{CaptureResult, CaptureState, RecordingController};
use crate::pipelines::sinks::{DisplaySink, SinkKind};
use crate::pipelines::video::EncoderSettings;
use crate::pipelines::worker::{PipelineHandle, PipelineWorker};
use crate::storage::{self, SessionPaths};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use host::HostReply;

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The user accepted a photo or a recording
    Captured(CaptureResult),
    /// The user finished tuning the key in calibrate mode
    Calibrated { threshold: f32, smoothing: f32 },
    /// The user closed the session
    Cancelled,
    Failed(SessionError),
}

/// Creates sessions against one media backend
pub struct SessionController {
    backend: Arc<dyn MediaBackend>,
    camera: CameraSettings,
    paths: SessionPaths,
    encoder: EncoderSettings,
    photo_quality: u8,
}

impl SessionController {
    pub fn new(backend: Arc<dyn MediaBackend>, config: &Config) -> Self {
        Self {
            backend,
            camera: config.camera_settings(),
            paths: SessionPaths::from_config(config),
            encoder: EncoderSettings {
                framerate: config.capture_framerate,
                bitrate_preset: config.bitrate_preset,
            },
            photo_quality: config.jpeg_quality,
        }
    }

    /// Write captures to `paths` instead of the configured directory
    pub fn with_paths(mut self, paths: SessionPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_camera(mut self, camera: CameraSettings) -> Self {
        self.camera = camera;
        self
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    /// Parse a host request and start a session from it
    ///
    /// A request that does not parse fails before any device is opened.
    pub async fn start(&self, request: &HostRequest) -> SessionResult<Session> {
        let config = request.parse()?;
        self.start_with(config).await
    }

    /// Start a session from already typed parameters
    pub async fn start_with(&self, config: SessionConfig) -> SessionResult<Session> {
        config.validate()?;
        info!(
            mode = config.mode.as_str(),
            background = %config.background.path().display(),
            "Starting session"
        );

        let (display, preview) = DisplaySink::channel(pipeline::PREVIEW_QUEUE_DEPTH);
        let layout = GraphLayout {
            camera: self.camera.clone(),
            background_mode: config.background_mode,
            background: config.background.clone(),
            chroma: config.chroma,
            sinks: vec![Box::new(display)],
        };

        // Opening sources may block on device negotiation and preroll
        let backend = Arc::clone(&self.backend);
        let graph = tokio::task::spawn_blocking(move || {
            let mut graph = PipelineGraph::new();
            graph.build(backend.as_ref(), layout)?;
            Ok::<_, GraphError>(graph)
        })
        .await
        .map_err(|e| SessionError::Runtime(format!("pipeline build task failed: {}", e)))?
        .inspect_err(|e| error!(error = %e, "Failed to build pipeline"))?;

        let (mut worker, events) = PipelineWorker::spawn(graph)?;
        let handle = worker.handle();
        if let Err(e) = handle.start().await {
            error!(error = %e, "Failed to start pipeline");
            let _ = tokio::task::spawn_blocking(move || worker.shutdown()).await;
            return Err(e.into());
        }

        let recorder = RecordingController::new(
            config.mode,
            config.background_mode,
            handle.clone(),
            Arc::clone(&self.backend),
            self.paths.clone(),
            self.encoder,
            PhotoEncoder::new(EncodingFormat::for_path(&self.paths.photo), self.photo_quality),
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::new(Mutex::new(Shared {
            outcome_tx: Some(outcome_tx),
            failure: None,
        }));
        let watcher = tokio::spawn(watch(
            events,
            self.paths.movie.clone(),
            Arc::clone(&shared),
        ));
        info!("Session running");

        Ok(Session {
            mode: config.mode,
            chroma: config.chroma,
            worker: Some(worker),
            watcher: Some(watcher),
            pipeline: handle,
            recorder,
            preview: Some(preview),
            shared,
            outcome_rx: Some(outcome_rx),
        })
    }
}

/// State shared by a session and its event watcher
struct Shared {
    outcome_tx: Option<oneshot::Sender<SessionOutcome>>,
    /// Failure concluded by the watcher, reported by the next command
    failure: Option<SessionError>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drain graph events until the processing thread has exited
///
/// An encoder failure stops the thread by itself. Once the event stream
/// closes the camera is released, so the partial movie is deleted and the
/// failure is delivered, even if the host never issues another command.
async fn watch(
    mut events: mpsc::UnboundedReceiver<GraphEvent>,
    movie: PathBuf,
    shared: Arc<Mutex<Shared>>,
) {
    let mut failure = None;
    while let Some(event) = events.recv().await {
        match event {
            GraphEvent::SinkFailed {
                kind: SinkKind::Encoder,
                error,
                ..
            } => {
                warn!(error = %error, "Recording aborted");
                failure.get_or_insert_with(|| {
                    SessionError::from(RecordingError::Encoder(error.to_string()))
                });
            }
            GraphEvent::SinkFailed { id, kind, error } => {
                debug!(sink = %id, kind = kind.as_str(), error = %error, "Sink dropped");
            }
            GraphEvent::SinkFinished { id, kind } => {
                debug!(sink = %id, kind = kind.as_str(), "Sink done");
            }
        }
    }

    let Some(err) = failure else {
        return;
    };
    storage::discard(&movie);
    let mut shared = lock(&shared);
    if let Some(tx) = shared.outcome_tx.take() {
        error!(error = %err, "Session failed");
        shared.failure = Some(err.clone());
        let _ = tx.send(SessionOutcome::Failed(err));
    }
}

/// A running session
///
/// Command methods map 1:1 to the UI buttons. A command that is not valid
/// right now fails with [`SessionError::Rejected`] and changes nothing; any
/// other error ends the session.
pub struct Session {
    mode: OperationMode,
    chroma: ChromaKeyConfig,
    worker: Option<PipelineWorker>,
    watcher: Option<JoinHandle<()>>,
    pipeline: PipelineHandle,
    recorder: RecordingController,
    preview: Option<mpsc::Receiver<Frame>>,
    shared: Arc<Mutex<Shared>>,
    outcome_rx: Option<oneshot::Receiver<SessionOutcome>>,
}

impl Session {
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn chroma(&self) -> ChromaKeyConfig {
        self.chroma
    }

    pub fn capture_state(&self) -> &CaptureState {
        self.recorder.state()
    }

    /// Whether the session has not yet produced its outcome
    pub fn is_active(&self) -> bool {
        lock(&self.shared).outcome_tx.is_some()
    }

    /// Whether the rewind-and-record button applies to this session
    pub fn can_rewind(&self) -> bool {
        self.recorder.can_rewind()
    }

    /// Composite frames for the host to display; available once
    pub fn take_preview(&mut self) -> Option<mpsc::Receiver<Frame>> {
        self.preview.take()
    }

    /// Receiver of the terminal outcome; available once
    pub fn outcome(&mut self) -> Option<oneshot::Receiver<SessionOutcome>> {
        self.outcome_rx.take()
    }

    fn ensure_active(&self) -> SessionResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SessionError::Rejected("session has ended".into()))
        }
    }

    /// End the session on fatal errors; pass rejections through
    async fn settle<T>(&mut self, result: Result<T, RecordingError>) -> SessionResult<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_fatal() => {
                let err = SessionError::from(e);
                self.finish(SessionOutcome::Failed(err.clone())).await;
                Err(err)
            }
            Err(e) => {
                debug!(error = %e, "Command rejected");
                Err(e.into())
            }
        }
    }

    /// Report a failure that ended the session between commands
    ///
    /// Runs before every command. The outcome channel is served without it;
    /// hosts only need to call it to see the error as a return value.
    pub async fn poll(&mut self) -> SessionResult<()> {
        if let Some(err) = self.take_failure().await {
            return Err(err);
        }
        self.ensure_active()?;

        if !self.worker.as_ref().is_some_and(PipelineWorker::is_running) {
            // Let the watcher finish with the closed event stream first
            if let Some(watcher) = self.watcher.take() {
                let _ = watcher.await;
            }
            if let Some(err) = self.take_failure().await {
                return Err(err);
            }
            let err = SessionError::Runtime("processing thread stopped".into());
            self.finish(SessionOutcome::Failed(err.clone())).await;
            return Err(err);
        }
        Ok(())
    }

    /// Failure concluded by the watcher, once; joins the exited worker
    async fn take_failure(&mut self) -> Option<SessionError> {
        let err = lock(&self.shared).failure.take()?;
        // The outcome was already sent; this only reaps the thread and files
        self.finish(SessionOutcome::Failed(err.clone())).await;
        Some(err)
    }

    // =========================================================================
    // Photo
    // =========================================================================

    pub async fn capture_photo(&mut self) -> SessionResult<PathBuf> {
        self.poll().await?;
        let result = self.recorder.capture_photo().await;
        self.settle(result).await
    }

    /// Keep the photo and end the session
    pub async fn accept_photo(&mut self) -> SessionResult<CaptureResult> {
        self.poll().await?;
        let result = self.recorder.accept_photo();
        let capture = self.settle(result).await?;
        self.finish(SessionOutcome::Captured(capture.clone())).await;
        Ok(capture)
    }

    pub async fn redo_photo(&mut self) -> SessionResult<()> {
        self.poll().await?;
        let result = self.recorder.redo_photo().await;
        self.settle(result).await
    }

    // =========================================================================
    // Video
    // =========================================================================

    pub async fn start_recording(&mut self) -> SessionResult<()> {
        self.poll().await?;
        let result = self.recorder.start_recording().await;
        self.settle(result).await
    }

    pub async fn stop_recording(&mut self) -> SessionResult<PathBuf> {
        self.poll().await?;
        let result = self.recorder.stop_recording().await;
        self.settle(result).await
    }

    /// Keep the recording and end the session
    pub async fn accept_recording(&mut self) -> SessionResult<CaptureResult> {
        self.poll().await?;
        let result = self.recorder.accept_recording();
        let capture = self.settle(result).await?;
        self.finish(SessionOutcome::Captured(capture.clone())).await;
        Ok(capture)
    }

    pub async fn redo_recording(&mut self) -> SessionResult<()> {
        self.poll().await?;
        let result = self.recorder.redo_recording().await;
        self.settle(result).await
    }

    pub async fn rewind_and_record(&mut self) -> SessionResult<()> {
        self.poll().await?;
        let result = self.recorder.rewind_and_record().await;
        self.settle(result).await
    }

    // =========================================================================
    // Preview control
    // =========================================================================

    fn require_live(&self, command: &'static str) -> SessionResult<()> {
        match self.recorder.state() {
            CaptureState::Recording { .. } | CaptureState::Finalizing => {
                Err(RecordingError::InvalidState {
                    command,
                    state: self.recorder.state().name(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    /// Freeze the preview; not available while recording
    pub async fn pause(&mut self) -> SessionResult<()> {
        self.poll().await?;
        self.require_live("pause")?;
        let result = self.pipeline.pause().await.map_err(RecordingError::from);
        self.settle(result).await
    }

    pub async fn resume(&mut self) -> SessionResult<()> {
        self.poll().await?;
        self.require_live("resume")?;
        let result = self.pipeline.resume().await.map_err(RecordingError::from);
        self.settle(result).await
    }

    // =========================================================================
    // Calibration
    // =========================================================================

    fn require_calibrate(&self, command: &'static str) -> SessionResult<()> {
        if self.mode == OperationMode::Calibrate {
            Ok(())
        } else {
            Err(RecordingError::WrongMode(command).into())
        }
    }

    async fn apply_chroma(&mut self, next: ChromaKeyConfig) -> SessionResult<()> {
        let result = self
            .pipeline
            .set_chroma(next)
            .await
            .map_err(RecordingError::from);
        self.settle(result).await?;
        self.chroma = next;
        Ok(())
    }

    /// Move the threshold slider (0.0 to 0.8)
    pub async fn set_threshold(&mut self, value: f32) -> SessionResult<()> {
        self.poll().await?;
        self.require_calibrate("set threshold")?;
        let threshold = config::bounded("threshold", value, chroma::CALIBRATION_THRESHOLD_MAX)
            .map_err(|e| SessionError::Rejected(e.to_string()))?;
        self.apply_chroma(ChromaKeyConfig {
            threshold,
            ..self.chroma
        })
        .await
    }

    /// Move the smoothing slider (0.0 to 0.5)
    pub async fn set_smoothing(&mut self, value: f32) -> SessionResult<()> {
        self.poll().await?;
        self.require_calibrate("set smoothing")?;
        let smoothing = config::bounded("smoothing", value, chroma::CALIBRATION_SMOOTHING_MAX)
            .map_err(|e| SessionError::Rejected(e.to_string()))?;
        self.apply_chroma(ChromaKeyConfig {
            smoothing,
            ..self.chroma
        })
        .await
    }

    /// End a calibrate session, reporting the tuned values
    pub async fn finish_calibration(&mut self) -> SessionResult<ChromaKeyConfig> {
        self.poll().await?;
        self.require_calibrate("finish calibration")?;
        let chroma = self.chroma;
        self.finish(SessionOutcome::Calibrated {
            threshold: chroma.threshold,
            smoothing: chroma.smoothing,
        })
        .await;
        Ok(chroma)
    }

    // =========================================================================
    // Termination
    // =========================================================================

    /// The user closed the session
    ///
    /// Returns once the camera is released and unaccepted files are gone.
    pub async fn cancel(&mut self) {
        if self.is_active() {
            info!("Session cancelled by user");
            self.finish(SessionOutcome::Cancelled).await;
        }
    }

    async fn finish(&mut self, outcome: SessionOutcome) {
        if let Some(mut worker) = self.worker.take()
            && let Err(e) = tokio::task::spawn_blocking(move || worker.shutdown()).await
        {
            warn!(error = %e, "Processing thread shutdown task failed");
        }
        self.conclude(outcome);
    }

    fn conclude(&mut self, outcome: SessionOutcome) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        self.recorder.abandon();
        self.preview = None;

        let sender = lock(&self.shared).outcome_tx.take();
        if let Some(tx) = sender {
            match &outcome {
                SessionOutcome::Captured(result) => {
                    info!(kind = ?result.kind, path = %result.path.display(), "Session finished")
                }
                SessionOutcome::Calibrated {
                    threshold,
                    smoothing,
                } => info!(threshold, smoothing, "Calibration finished"),
                SessionOutcome::Cancelled => info!("Session closed"),
                SessionOutcome::Failed(e) => error!(error = %e, "Session failed"),
            }
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_active() {
            debug!("Session dropped while active");
            self.conclude(SessionOutcome::Cancelled);
        }
    }
}
