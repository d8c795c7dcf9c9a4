// SPDX-License-Identifier: MPL-2.0

//! GStreamer H.264/MP4 encoder fed through appsrc

use super::{EncodeSummary, EncoderSettings, VideoEncoder};
use crate::backends::camera::types::{BackendError, BackendResult, Frame, PixelFormat};
use crate::constants::timing;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Available H.264 encoders in priority order (hardware first)
const H264_ENCODERS: [(&str, bool); 5] = [
    ("vaapih264enc", true),
    ("nvh264enc", true),
    ("v4l2h264enc", true),
    ("x264enc", false),
    ("openh264enc", false),
];

/// Create the best available H.264 encoder configured for `bitrate_kbps`
pub fn select_h264_encoder(bitrate_kbps: u32) -> BackendResult<(gstreamer::Element, &'static str)> {
    gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

    for (name, hardware) in H264_ENCODERS {
        if let Ok(encoder) = gstreamer::ElementFactory::make(name).build() {
            info!(encoder = %name, hardware, "Selected video encoder");
            configure_encoder(&encoder, name, bitrate_kbps);
            return Ok((encoder, name));
        }
    }

    Err(BackendError::Encoder(
        "No H.264 encoder available. Install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264"
            .into(),
    ))
}

fn configure_encoder(encoder: &gstreamer::Element, name: &str, bitrate: u32) {
    // Element property sets differ between plugin versions
    let set_str = |prop: &str, value: &str| {
        if encoder.find_property(prop).is_some() {
            encoder.set_property_from_str(prop, value);
        }
    };
    let set_u32 = |prop: &str, value: u32| {
        if encoder.find_property(prop).is_some() {
            encoder.set_property(prop, value);
        }
    };

    match name {
        "x264enc" => {
            set_str("speed-preset", "veryfast");
            set_str("tune", "zerolatency");
            set_u32("bitrate", bitrate);
        }
        "vaapih264enc" => set_u32("bitrate", bitrate),
        "nvh264enc" => {
            set_u32("bitrate", bitrate);
            set_str("rc-mode", "vbr");
        }
        "openh264enc" => {
            set_str("rate-control", "bitrate");
            set_u32("bitrate", bitrate * 1000);
            set_str("usage-type", "camera");
        }
        _ => {
            debug!(encoder = %name, "Using encoder defaults");
        }
    }
    debug!(encoder = %name, bitrate_kbps = bitrate, "Configured video encoder");
}

struct Running {
    pipeline: gstreamer::Pipeline,
    appsrc: AppSrc,
    width: u32,
    height: u32,
}

/// Records composite frames to an MP4 file
///
/// `appsrc → videoconvert → h264 encoder → h264parse → mp4mux → filesink`
pub struct GstVideoEncoder {
    path: PathBuf,
    settings: EncoderSettings,
    running: Option<Running>,
    base_pts: Option<Duration>,
    last_pts: Duration,
    frames: u64,
}

impl GstVideoEncoder {
    /// Prepare an encoder writing to `path`
    ///
    /// Fails early when no H.264 encoder or MP4 muxer is installed. The file
    /// is created when the first frame arrives.
    pub fn new(path: &Path, settings: &EncoderSettings) -> BackendResult<Self> {
        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
        for factory in ["h264parse", "mp4mux", "filesink"] {
            if gstreamer::ElementFactory::find(factory).is_none() {
                return Err(BackendError::Encoder(format!("Missing GStreamer element {}", factory)));
            }
        }
        if H264_ENCODERS
            .iter()
            .all(|(name, _)| gstreamer::ElementFactory::find(name).is_none())
        {
            return Err(BackendError::Encoder("No H.264 encoder available".into()));
        }

        info!(path = %path.display(), framerate = settings.framerate, "Video encoder ready");
        Ok(Self {
            path: path.to_path_buf(),
            settings: *settings,
            running: None,
            base_pts: None,
            last_pts: Duration::ZERO,
            frames: 0,
        })
    }

    fn build_pipeline(&self, frame: &Frame) -> BackendResult<Running> {
        let make = |factory: &str| {
            gstreamer::ElementFactory::make(factory).build().map_err(|e| {
                BackendError::Encoder(format!("Failed to create {}: {}", factory, e))
            })
        };

        let pipeline = gstreamer::Pipeline::new();
        let appsrc = make("appsrc")?
            .downcast::<AppSrc>()
            .map_err(|_| BackendError::Encoder("Failed to downcast to AppSrc".into()))?;
        let convert = make("videoconvert")?;
        let bitrate = self.settings.bitrate_preset.bitrate_kbps(frame.width);
        let (encoder, encoder_name) = select_h264_encoder(bitrate)?;
        let parser = make("h264parse")?;
        let muxer = make("mp4mux")?;
        let filesink = make("filesink")?;
        filesink.set_property("location", self.path.to_string_lossy().to_string());

        let format = match frame.format {
            PixelFormat::RGBA => "RGBA",
            PixelFormat::BGRA => "BGRA",
        };
        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", format)
            .field("width", frame.width as i32)
            .field("height", frame.height as i32)
            .field(
                "framerate",
                gstreamer::Fraction::new(self.settings.framerate.max(1) as i32, 1),
            )
            .build();
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gstreamer::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(false);

        pipeline
            .add_many([
                appsrc.upcast_ref(),
                &convert,
                &encoder,
                &parser,
                &muxer,
                &filesink,
            ])
            .map_err(|e| BackendError::Encoder(format!("Failed to add elements: {}", e)))?;
        gstreamer::Element::link_many([
            appsrc.upcast_ref(),
            &convert,
            &encoder,
            &parser,
            &muxer,
            &filesink,
        ])
        .map_err(|e| BackendError::Encoder(format!("Failed to link elements: {}", e)))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| BackendError::Encoder(format!("Failed to start recording: {}", e)))?;

        info!(
            path = %self.path.display(),
            encoder = %encoder_name,
            width = frame.width,
            height = frame.height,
            preset = self.settings.bitrate_preset.display_name(),
            bitrate_kbps = bitrate,
            "Recording pipeline started"
        );

        Ok(Running {
            pipeline,
            appsrc,
            width: frame.width,
            height: frame.height,
        })
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_secs(1) / self.settings.framerate.max(1)
    }
}

fn wait_for_eos(pipeline: &gstreamer::Pipeline) -> BackendResult<()> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| BackendError::Encoder("No bus on pipeline".into()))?;
    let deadline = Instant::now() + timing::FINALIZE_TIMEOUT;

    while Instant::now() < deadline {
        if let Some(msg) = bus.timed_pop_filtered(
            gstreamer::ClockTime::from_mseconds(100),
            &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
        ) {
            match msg.view() {
                gstreamer::MessageView::Eos(_) => return Ok(()),
                gstreamer::MessageView::Error(err) => {
                    error!(
                        error = %err.error(),
                        debug = ?err.debug(),
                        "GStreamer error while finalizing"
                    );
                    return Err(BackendError::Encoder(err.error().to_string()));
                }
                _ => {}
            }
        }
    }
    Err(BackendError::Encoder("Timed out waiting for encoder flush".into()))
}

impl VideoEncoder for GstVideoEncoder {
    fn push_frame(&mut self, frame: &Frame) -> BackendResult<()> {
        if self.running.is_none() {
            self.running = Some(self.build_pipeline(frame)?);
            self.base_pts = Some(frame.pts);
        }
        let Some(running) = self.running.as_ref() else {
            return Err(BackendError::Encoder("Recording pipeline missing".into()));
        };

        if frame.width != running.width || frame.height != running.height {
            return Err(BackendError::FormatNotSupported(format!(
                "Frame size {}x{} doesn't match recording {}x{}",
                frame.width, frame.height, running.width, running.height
            )));
        }

        let pts = frame.pts.saturating_sub(self.base_pts.unwrap_or(frame.pts));
        let mut buffer = gstreamer::Buffer::from_mut_slice(frame.data.to_vec());
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| BackendError::Encoder("Buffer not writable".into()))?;
            buffer_ref.set_pts(gstreamer::ClockTime::from_nseconds(pts.as_nanos() as u64));
            buffer_ref.set_duration(gstreamer::ClockTime::from_nseconds(
                self.frame_duration().as_nanos() as u64,
            ));
        }

        running
            .appsrc
            .push_buffer(buffer)
            .map_err(|e| BackendError::Encoder(format!("Failed to push frame: {:?}", e)))?;

        self.frames += 1;
        self.last_pts = pts;
        if self.frames % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames, pts_ms = pts.as_millis() as u64, "Frames encoded");
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(mut self: Box<Self>) -> BackendResult<EncodeSummary> {
        let Some(running) = self.running.take() else {
            return Err(BackendError::Encoder("Recording contains no frames".into()));
        };

        info!(frames = self.frames, "Finalizing recording");
        if let Err(e) = running.appsrc.end_of_stream() {
            warn!(?e, "Failed to send EOS to appsrc");
        }
        let flushed = wait_for_eos(&running.pipeline);
        let _ = running.pipeline.set_state(gstreamer::State::Null);
        flushed?;

        info!(path = %self.path.display(), "Recording saved");
        Ok(EncodeSummary {
            path: self.path.clone(),
            frames: self.frames,
            duration: self.last_pts,
        })
    }

    fn abort(mut self: Box<Self>) {
        if let Some(running) = self.running.take() {
            let _ = running.pipeline.set_state(gstreamer::State::Null);
            warn!(path = %self.path.display(), "Recording aborted");
        }
    }
}

impl Drop for GstVideoEncoder {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.pipeline.set_state(gstreamer::State::Null);
        }
    }
}
