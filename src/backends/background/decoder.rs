// SPDX-License-Identifier: GPL-3.0-only

//! Looping video background
//!
//! Decodes a video file to RGBA at its native rate and seeks back to the
//! start whenever the end is reached.

use crate::backends::camera::pipeline::sample_to_frame;
use crate::backends::camera::types::{BackendError, BackendResult, Frame, FrameOrigin};
use crate::backends::{FrameSource, SourceKind};
use crate::constants::background::DECODER_PREROLL_TIMEOUT;
use gstreamer::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Video file decoder producing background frames
pub struct LoopingVideoSource {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    path: PathBuf,
    /// First frame, available before the pipeline plays
    pending: Option<Frame>,
    sequence: u64,
    loops: u64,
    stopped: bool,
}

impl LoopingVideoSource {
    /// Open and preroll a video file
    ///
    /// Fails with `UnreadableMedia` if the file is missing, cannot be
    /// decoded, or produces no frame within the preroll timeout.
    pub fn open(path: &Path) -> BackendResult<Self> {
        info!(path = %path.display(), "Opening background video");

        let unreadable = |reason: String| BackendError::UnreadableMedia {
            path: path.display().to_string(),
            reason,
        };

        if !path.is_file() {
            return Err(unreadable("file not found".into()));
        }

        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let pipeline_str = format!(
            "filesrc location=\"{}\" ! decodebin ! queue ! videoconvert ! \
             video/x-raw,format=RGBA ! appsink name=videosink sync=true",
            path.to_string_lossy()
        );

        let pipeline = gstreamer::parse::launch(&pipeline_str)
            .map_err(|e| unreadable(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Not a pipeline".into()))?;

        let appsink = pipeline
            .by_name("videosink")
            .ok_or_else(|| BackendError::InitializationFailed("Failed to find appsink".into()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| BackendError::InitializationFailed("Failed to cast appsink".into()))?;

        appsink.set_max_buffers(1);
        appsink.set_drop(true);

        pipeline
            .set_state(gstreamer::State::Paused)
            .map_err(|e| unreadable(format!("Failed to preroll: {}", e)))?;

        if let Err(reason) = wait_for_preroll(&pipeline) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(unreadable(reason));
        }

        let first = appsink
            .pull_preroll()
            .map_err(|_| unreadable("No video frames".into()))
            .and_then(|sample| {
                sample_to_frame(&sample, 0, FrameOrigin::Background, Duration::ZERO)
            });
        let first = match first {
            Ok(frame) => frame,
            Err(e) => {
                let _ = pipeline.set_state(gstreamer::State::Null);
                return Err(e);
            }
        };

        info!(
            width = first.width,
            height = first.height,
            "Background video ready"
        );

        Ok(Self {
            pipeline,
            appsink,
            path: path.to_path_buf(),
            pending: Some(first),
            sequence: 1,
            loops: 0,
            stopped: false,
        })
    }

    fn set_state(&self, state: gstreamer::State) -> BackendResult<()> {
        self.pipeline.set_state(state).map_err(|e| {
            BackendError::Other(format!("Failed to set video state {:?}: {}", state, e))
        })?;
        Ok(())
    }

    fn seek_to_start(&self) -> BackendResult<()> {
        self.pipeline
            .seek_simple(
                gstreamer::SeekFlags::FLUSH | gstreamer::SeekFlags::KEY_UNIT,
                gstreamer::ClockTime::ZERO,
            )
            .map_err(|e| BackendError::Other(format!("Video seek failed: {}", e)))
    }
}

fn wait_for_preroll(pipeline: &gstreamer::Pipeline) -> Result<(), String> {
    let bus = pipeline.bus().ok_or_else(|| "No bus on pipeline".to_string())?;
    let deadline = std::time::Instant::now() + DECODER_PREROLL_TIMEOUT;

    while std::time::Instant::now() < deadline {
        if let Some(msg) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(100)) {
            use gstreamer::MessageView;
            match msg.view() {
                MessageView::Error(err) => return Err(err.error().to_string()),
                MessageView::AsyncDone(_) => return Ok(()),
                _ => {}
            }
        }
    }
    Err("Timed out waiting for first frame".into())
}

impl FrameSource for LoopingVideoSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LoopingVideo
    }

    fn start(&mut self) -> BackendResult<()> {
        self.set_state(gstreamer::State::Playing)?;
        debug!(path = %self.path.display(), "Background video playing");
        Ok(())
    }

    fn pause(&mut self) -> BackendResult<()> {
        self.set_state(gstreamer::State::Paused)
    }

    fn resume(&mut self) -> BackendResult<()> {
        self.set_state(gstreamer::State::Playing)
    }

    fn rewind(&mut self) -> BackendResult<()> {
        debug!("Rewinding background video");
        self.pending = None;
        self.seek_to_start()
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if let Some(frame) = self.pending.take() {
            return Some(frame);
        }

        match self.appsink.try_pull_sample(gstreamer::ClockTime::ZERO) {
            Some(sample) => {
                let frame = sample_to_frame(
                    &sample,
                    self.sequence,
                    FrameOrigin::Background,
                    Duration::ZERO,
                );
                self.sequence += 1;
                match frame {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        warn!(error = %e, "Bad background sample");
                        None
                    }
                }
            }
            None => {
                if self.appsink.is_eos() {
                    self.loops += 1;
                    debug!(loops = self.loops, "Background video looping");
                    if let Err(e) = self.seek_to_start() {
                        warn!(error = %e, "Failed to loop background video");
                    }
                }
                None
            }
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.pipeline.set_state(gstreamer::State::Null);
        info!(
            path = %self.path.display(),
            loops = self.loops,
            "Background video stopped"
        );
    }
}

impl Drop for LoopingVideoSource {
    fn drop(&mut self) {
        self.stop();
    }
}
