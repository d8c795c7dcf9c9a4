// SPDX-License-Identifier: GPL-3.0-only

//! Photo capture and video recording state machine
//!
//! Photo: `Idle → (capture) → PendingDecision → accept | redo → Idle`.
//!
//! Video: `Idle → Recording → Finalizing → PendingDecision → accept | redo`.
//!
//! Every attempt writes to the same session path, which is cleared before
//! the attempt starts and deleted again on redo or failure.

use super::graph::{GraphError, SinkId};
use super::photo::PhotoEncoder;
use super::sinks::{EncoderSink, SinkError, StillCaptureSink};
use super::video::EncoderSettings;
use super::worker::PipelineHandle;
use crate::backends::MediaBackend;
use crate::backends::camera::types::BackendError;
use crate::config::{BackgroundMode, OperationMode};
use crate::constants::timing;
use crate::errors::RecordingError;
use crate::storage::{self, SessionPaths};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Photo,
    Video,
}

/// A finished capture awaiting or past the user's decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub kind: CaptureKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording { sink: SinkId, started: Instant },
    Finalizing,
    PendingDecision(CaptureResult),
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording { .. } => "recording",
            Self::Finalizing => "finalizing",
            Self::PendingDecision(_) => "awaiting a decision",
        }
    }
}

impl From<GraphError> for RecordingError {
    fn from(err: GraphError) -> Self {
        RecordingError::Pipeline(err.to_string())
    }
}

pub struct RecordingController {
    mode: OperationMode,
    background_mode: BackgroundMode,
    pipeline: PipelineHandle,
    backend: Arc<dyn MediaBackend>,
    paths: SessionPaths,
    encoder_settings: EncoderSettings,
    photo_encoder: PhotoEncoder,
    state: CaptureState,
}

impl RecordingController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: OperationMode,
        background_mode: BackgroundMode,
        pipeline: PipelineHandle,
        backend: Arc<dyn MediaBackend>,
        paths: SessionPaths,
        encoder_settings: EncoderSettings,
        photo_encoder: PhotoEncoder,
    ) -> Self {
        Self {
            mode,
            background_mode,
            pipeline,
            backend,
            paths,
            encoder_settings,
            photo_encoder,
            state: CaptureState::Idle,
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    /// Whether rewind-and-record is offered for this session
    pub fn can_rewind(&self) -> bool {
        self.mode == OperationMode::Video && self.background_mode == BackgroundMode::Video
    }

    fn require_mode(&self, mode: OperationMode, command: &'static str) -> Result<(), RecordingError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(RecordingError::WrongMode(command))
        }
    }

    fn invalid(&self, command: &'static str) -> RecordingError {
        RecordingError::InvalidState {
            command,
            state: self.state.name(),
        }
    }

    fn take_pending(
        &mut self,
        kind: CaptureKind,
        command: &'static str,
    ) -> Result<CaptureResult, RecordingError> {
        match &self.state {
            CaptureState::PendingDecision(result) if result.kind == kind => {
                let result = result.clone();
                self.state = CaptureState::Idle;
                Ok(result)
            }
            _ => Err(self.invalid(command)),
        }
    }

    // ===== Photo =====

    /// Save the next composite frame to the photo path, then pause
    pub async fn capture_photo(&mut self) -> Result<PathBuf, RecordingError> {
        self.require_mode(OperationMode::Photo, "capture photo")?;
        if self.state != CaptureState::Idle {
            return Err(self.invalid("capture photo"));
        }

        let path = self.paths.photo.clone();
        storage::clear_stale(&path)?;

        self.pipeline.resume().await?;
        let (sink, frame) = StillCaptureSink::new();
        let id = self.pipeline.attach_sink(Box::new(sink)).await?;

        let frame = match tokio::time::timeout(timing::STILL_CAPTURE_TIMEOUT, frame).await {
            Ok(Ok(frame)) => frame,
            _ => {
                let _ = self.pipeline.detach_sink(id).await;
                return Err(RecordingError::CaptureFailed(
                    "no composite frame arrived".into(),
                ));
            }
        };

        self.pipeline.pause().await?;

        match self.photo_encoder.save(frame, path.clone()).await {
            Ok(saved) => {
                info!(path = %saved.display(), "Photo captured");
                self.state = CaptureState::PendingDecision(CaptureResult {
                    kind: CaptureKind::Photo,
                    path: saved.clone(),
                });
                Ok(saved)
            }
            Err(e) => {
                storage::discard(&path);
                Err(e)
            }
        }
    }

    pub fn accept_photo(&mut self) -> Result<CaptureResult, RecordingError> {
        self.take_pending(CaptureKind::Photo, "accept photo")
    }

    /// Delete the photo and go back to the live preview
    pub async fn redo_photo(&mut self) -> Result<(), RecordingError> {
        let result = self.take_pending(CaptureKind::Photo, "redo photo")?;
        storage::discard(&result.path);
        self.pipeline.resume().await?;
        info!("Photo discarded");
        Ok(())
    }

    // ===== Video =====

    async fn begin_recording(&mut self) -> Result<(), RecordingError> {
        let path = self.paths.movie.clone();
        storage::clear_stale(&path)?;
        storage::prepare_parent(&path)?;

        let encoder = self
            .backend
            .create_encoder(&path, &self.encoder_settings)
            .map_err(|e| RecordingError::Encoder(e.to_string()))?;
        let sink = self
            .pipeline
            .attach_sink(Box::new(EncoderSink::new(encoder)))
            .await?;
        self.state = CaptureState::Recording {
            sink,
            started: Instant::now(),
        };
        self.pipeline.resume().await?;

        info!(path = %path.display(), "Recording started");
        Ok(())
    }

    pub async fn start_recording(&mut self) -> Result<(), RecordingError> {
        self.require_mode(OperationMode::Video, "start recording")?;
        if self.state != CaptureState::Idle {
            return Err(self.invalid("start recording"));
        }
        self.begin_recording().await
    }

    /// Detach the encoder, wait for the file to be finalized, then pause
    ///
    /// A recording with no frames fails with `EmptyRecording` and leaves no
    /// file behind.
    pub async fn stop_recording(&mut self) -> Result<PathBuf, RecordingError> {
        let CaptureState::Recording { sink, started } = self.state else {
            return Err(self.invalid("stop recording"));
        };
        self.state = CaptureState::Finalizing;
        let path = self.paths.movie.clone();

        let detached = self.pipeline.detach_sink(sink).await;
        let closed = match detached {
            Ok(sink) => tokio::task::spawn_blocking(move || sink.close())
                .await
                .unwrap_or_else(|e| Err(SinkError::Backend(BackendError::Encoder(e.to_string())))),
            Err(e) => {
                self.fail_recording(&path).await;
                return Err(e.into());
            }
        };

        let paused = self.pipeline.pause().await;

        let summary = match closed {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                self.fail_recording(&path).await;
                return Err(RecordingError::Encoder("encoder produced no file".into()));
            }
            Err(SinkError::Empty) => {
                self.fail_recording(&path).await;
                return Err(RecordingError::EmptyRecording);
            }
            Err(e) => {
                self.fail_recording(&path).await;
                return Err(RecordingError::Encoder(e.to_string()));
            }
        };
        paused?;

        info!(
            path = %summary.path.display(),
            frames = summary.frames,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recording finalized"
        );
        self.state = CaptureState::PendingDecision(CaptureResult {
            kind: CaptureKind::Video,
            path: summary.path.clone(),
        });
        Ok(summary.path)
    }

    async fn fail_recording(&mut self, path: &Path) {
        storage::discard(path);
        self.state = CaptureState::Idle;
        if let Err(e) = self.pipeline.pause().await {
            warn!(error = %e, "Failed to pause after recording failure");
        }
    }

    pub fn accept_recording(&mut self) -> Result<CaptureResult, RecordingError> {
        self.take_pending(CaptureKind::Video, "accept recording")
    }

    /// Delete the movie and go back to the live preview
    pub async fn redo_recording(&mut self) -> Result<(), RecordingError> {
        let result = self.take_pending(CaptureKind::Video, "redo recording")?;
        storage::discard(&result.path);
        self.pipeline.resume().await?;
        info!("Recording discarded");
        Ok(())
    }

    /// Restart the background from the beginning and record right away
    ///
    /// Available from the live preview and after a stopped recording (whose
    /// file is discarded). Needs a looping video background.
    pub async fn rewind_and_record(&mut self) -> Result<(), RecordingError> {
        self.require_mode(OperationMode::Video, "rewind and record")?;
        if !self.can_rewind() {
            return Err(RecordingError::RewindUnavailable);
        }
        match &self.state {
            CaptureState::Idle => {}
            CaptureState::PendingDecision(result) if result.kind == CaptureKind::Video => {
                storage::discard(&result.path);
                self.state = CaptureState::Idle;
            }
            _ => return Err(self.invalid("rewind and record")),
        }

        self.pipeline.pause().await?;
        self.pipeline.rewind().await?;
        self.begin_recording().await
    }

    /// Delete any capture in progress or awaiting a decision
    ///
    /// Call after the processing thread has shut down, so no encoder is
    /// still writing to the movie file.
    pub fn abandon(&mut self) {
        match std::mem::replace(&mut self.state, CaptureState::Idle) {
            CaptureState::Recording { .. } | CaptureState::Finalizing => {
                storage::discard(&self.paths.movie)
            }
            CaptureState::PendingDecision(result) => storage::discard(&result.path),
            CaptureState::Idle => {}
        }
    }
}
