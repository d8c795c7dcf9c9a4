// SPDX-License-Identifier: MPL-2.0

//! Video recording of composite frames
//!
//! Composite frames are pushed into a [`VideoEncoder`] one at a time. The
//! GStreamer implementation builds its pipeline lazily from the first frame,
//! so a recording that never receives a frame never creates a file.

mod encoder;

pub use encoder::{GstVideoEncoder, select_h264_encoder};

use crate::backends::camera::types::{BackendResult, Frame};
use crate::constants::{BitratePreset, capture};
use std::path::PathBuf;
use std::time::Duration;

/// Encoder configuration chosen when recording starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSettings {
    /// Nominal framerate written to the container
    pub framerate: u32,
    pub bitrate_preset: BitratePreset,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            framerate: capture::DEFAULT_FRAMERATE,
            bitrate_preset: BitratePreset::default(),
        }
    }
}

/// What a finished recording contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub path: PathBuf,
    pub frames: u64,
    /// Timestamp span from the first to the last frame
    pub duration: Duration,
}

/// Sink for encoded composite frames
///
/// Frame timestamps passed to [`push_frame`](VideoEncoder::push_frame) are
/// on the source clock and strictly increasing; implementations rebase them
/// so the file starts at zero.
pub trait VideoEncoder: Send {
    fn push_frame(&mut self, frame: &Frame) -> BackendResult<()>;

    fn frames_written(&self) -> u64;

    /// Flush and close the container, waiting for the file to be complete
    fn finish(self: Box<Self>) -> BackendResult<EncodeSummary>;

    /// Drop the recording without finalizing it
    fn abort(self: Box<Self>);
}
