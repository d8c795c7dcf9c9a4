// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for frame sources and encoders
//!
//! The pipeline never talks to GStreamer directly. It asks a [`MediaBackend`]
//! for a camera source, a background source and, while recording, a video
//! encoder. The GStreamer implementation is [`GstBackend`]; tests and the
//! `--test-pattern` mode swap in [`synthetic`] sources.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               PipelineGraph                  │
//! └────────────────────┬────────────────────────┘
//!                      │ MediaBackend
//! ┌────────────────────┴────────────────────────┐
//! │  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │   Camera    │  │     Background       │  │
//! │  │ (v4l2/auto) │  │ (still / looping)    │  │
//! │  └─────────────┘  └──────────────────────┘  │
//! │               ┌──────────────┐               │
//! │               │ Video encoder│               │
//! │               └──────────────┘               │
//! └─────────────────────────────────────────────┘
//! ```

pub mod background;
pub mod camera;
pub mod synthetic;

use crate::config::BackgroundSource;
use crate::pipelines::video::{EncoderSettings, GstVideoEncoder, VideoEncoder};
use camera::types::{BackendResult, CameraSettings, Frame};
use std::path::Path;

/// What a frame source produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    StillImage,
    LoopingVideo,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::StillImage => "still image",
            Self::LoopingVideo => "looping video",
        }
    }
}

/// A producer of timestamped frames
///
/// Sources are opened (and their device acquired) when created, and only
/// begin producing after [`start`](FrameSource::start). Frames are pulled
/// by the processing thread; a source keeps at most the newest frame and
/// drops older ones when the consumer falls behind.
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    /// Begin producing frames
    fn start(&mut self) -> BackendResult<()>;

    /// Stop producing frames, keeping the position
    fn pause(&mut self) -> BackendResult<()>;

    /// Continue from where the source was paused
    fn resume(&mut self) -> BackendResult<()>;

    /// Restart from time zero
    ///
    /// Live sources have no position and ignore this.
    fn rewind(&mut self) -> BackendResult<()>;

    /// Newest frame not yet returned, without blocking
    fn next_frame(&mut self) -> Option<Frame>;

    /// Release the underlying device or file
    fn stop(&mut self);
}

/// Factory for sources and encoders
pub trait MediaBackend: Send + Sync {
    fn open_camera(&self, settings: &CameraSettings) -> BackendResult<Box<dyn FrameSource>>;

    fn open_background(&self, source: &BackgroundSource) -> BackendResult<Box<dyn FrameSource>>;

    fn create_encoder(
        &self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> BackendResult<Box<dyn VideoEncoder>>;
}

/// GStreamer-backed sources and encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct GstBackend;

impl MediaBackend for GstBackend {
    fn open_camera(&self, settings: &CameraSettings) -> BackendResult<Box<dyn FrameSource>> {
        Ok(Box::new(camera::CameraSource::open(settings)?))
    }

    fn open_background(&self, source: &BackgroundSource) -> BackendResult<Box<dyn FrameSource>> {
        background::open(source)
    }

    fn create_encoder(
        &self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> BackendResult<Box<dyn VideoEncoder>> {
        Ok(Box::new(GstVideoEncoder::new(path, settings)?))
    }
}
