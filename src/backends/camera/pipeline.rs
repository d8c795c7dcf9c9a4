// SPDX-License-Identifier: MPL-2.0

//! GStreamer pipeline for camera capture

use super::device::DeviceLease;
use super::types::*;
use crate::backends::{FrameSource, SourceKind};
use crate::constants::{pipeline, timing};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Newest frame handed from a streaming thread to the processing thread
///
/// Writing replaces whatever was there, so a slow consumer only ever sees
/// the most recent frame.
#[derive(Clone, Default)]
pub(crate) struct LatestFrame(Arc<Mutex<Option<Frame>>>);

impl LatestFrame {
    pub(crate) fn put(&self, frame: Frame) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(|p| p.into_inner());
        slot.replace(frame).is_some()
    }

    pub(crate) fn take(&self) -> Option<Frame> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub(crate) fn clear(&self) {
        self.take();
    }
}

/// Convert an appsink sample to a frame
pub(crate) fn sample_to_frame(
    sample: &gstreamer::Sample,
    sequence: u64,
    origin: FrameOrigin,
    fallback_pts: Duration,
) -> BackendResult<Frame> {
    let caps = sample
        .caps()
        .ok_or_else(|| BackendError::FormatNotSupported("No caps on sample".into()))?;
    let info = VideoInfo::from_caps(caps)
        .map_err(|e| BackendError::FormatNotSupported(format!("Bad video caps: {}", e)))?;
    let format = PixelFormat::from_gst_format(info.format().to_str()).ok_or_else(|| {
        BackendError::FormatNotSupported(format!("Unexpected format {}", info.format().to_str()))
    })?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| BackendError::Other("No buffer in sample".into()))?;
    let map = buffer
        .map_readable()
        .map_err(|_| BackendError::Other("Failed to map buffer".into()))?;

    let pts = buffer
        .pts()
        .map(|t| Duration::from_nanos(t.nseconds()))
        .unwrap_or(fallback_pts);

    Ok(Frame {
        width: info.width(),
        height: info.height(),
        data: FrameData::new(map.as_slice().to_vec()),
        format,
        stride: info.stride()[0] as u32,
        pts,
        sequence,
        origin,
        captured_at: Instant::now(),
    })
}

fn build_pipeline_string(settings: &CameraSettings) -> String {
    let source = if settings.device.is_empty() {
        "autovideosrc".to_string()
    } else {
        format!("v4l2src device=\"{}\"", settings.device)
    };
    format!(
        "{} ! videoconvert ! videoscale ! videorate ! \
         video/x-raw,format={},width={},height={},framerate={}/1 ! \
         appsink name=sink",
        source,
        pipeline::OUTPUT_FORMAT,
        settings.width,
        settings.height,
        settings.framerate
    )
}

/// Live camera source
///
/// The device is opened (and leased) on [`CameraSource::open`]; frames flow
/// once the pipeline reaches PLAYING.
pub struct CameraSource {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    latest: LatestFrame,
    settings: CameraSettings,
    lease: Option<DeviceLease>,
}

impl CameraSource {
    pub fn open(settings: &CameraSettings) -> BackendResult<Self> {
        info!(
            device = %settings.device,
            width = settings.width,
            height = settings.height,
            framerate = settings.framerate,
            "Opening camera"
        );

        let lease = DeviceLease::acquire(&settings.device)?;

        gstreamer::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let pipeline_str = build_pipeline_string(settings);
        debug!(pipeline = %pipeline_str, "Camera pipeline");

        let pipeline = gstreamer::parse::launch(&pipeline_str)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| BackendError::InitializationFailed("Not a pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::InitializationFailed("Failed to get appsink".into()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| BackendError::InitializationFailed("Failed to cast appsink".into()))?;

        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);
        appsink.set_property("enable-last-sample", false);

        let latest = LatestFrame::default();
        let slot = latest.clone();
        let started = Instant::now();
        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let frame_num = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);
                    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;

                    match sample_to_frame(&sample, frame_num, FrameOrigin::Camera, started.elapsed())
                    {
                        Ok(frame) => {
                            if slot.put(frame) && frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                debug!(frame = frame_num, "Camera frame dropped (consumer behind)");
                            }
                        }
                        Err(e) => {
                            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                error!(frame = frame_num, error = %e, "Bad camera sample");
                            }
                        }
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        // READY opens the device node, surfacing missing or busy cameras now
        if let Err(e) = pipeline.set_state(gstreamer::State::Ready) {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(BackendError::DeviceNotFound(format!(
                "{} ({})",
                lease.device(),
                e
            )));
        }

        Ok(Self {
            pipeline,
            appsink,
            latest,
            settings: settings.clone(),
            lease: Some(lease),
        })
    }

    fn set_state(&self, state: gstreamer::State) -> BackendResult<()> {
        self.pipeline.set_state(state).map_err(|e| {
            BackendError::Other(format!("Failed to set camera state {:?}: {}", state, e))
        })?;
        Ok(())
    }
}

impl FrameSource for CameraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn start(&mut self) -> BackendResult<()> {
        self.set_state(gstreamer::State::Playing)?;
        let (result, state, _) = self
            .pipeline
            .state(gstreamer::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        debug!(result = ?result, state = ?state, "Camera pipeline state");
        if state != gstreamer::State::Playing {
            warn!("Camera pipeline is not in PLAYING state");
        }
        info!(
            device = %self.settings.device,
            width = self.settings.width,
            height = self.settings.height,
            framerate = self.settings.framerate,
            "Camera streaming"
        );
        Ok(())
    }

    fn pause(&mut self) -> BackendResult<()> {
        self.set_state(gstreamer::State::Paused)?;
        self.latest.clear();
        debug!("Camera paused");
        Ok(())
    }

    fn resume(&mut self) -> BackendResult<()> {
        self.set_state(gstreamer::State::Playing)?;
        debug!("Camera resumed");
        Ok(())
    }

    fn rewind(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.latest.take()
    }

    fn stop(&mut self) {
        if self.lease.is_none() {
            return;
        }
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        let _ = self.pipeline.set_state(gstreamer::State::Null);
        self.latest.clear();
        self.lease = None;
        info!("Camera stopped");
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_string_default_device() {
        let s = build_pipeline_string(&CameraSettings::default());
        assert!(s.starts_with("autovideosrc"));
        assert!(s.contains("width=1280,height=720,framerate=30/1"));
        assert!(s.contains("format=RGBA"));
    }

    #[test]
    fn test_pipeline_string_named_device() {
        let settings = CameraSettings {
            device: "/dev/video2".into(),
            ..Default::default()
        };
        assert!(build_pipeline_string(&settings).starts_with("v4l2src device=\"/dev/video2\""));
    }

    #[test]
    fn test_latest_frame_keeps_newest() {
        let slot = LatestFrame::default();
        let frame = |seq| {
            Frame::from_rgba(1, 1, vec![0; 4], Duration::ZERO, seq, FrameOrigin::Camera).unwrap()
        };
        assert!(!slot.put(frame(1)));
        assert!(slot.put(frame(2)));
        assert_eq!(slot.take().map(|f| f.sequence), Some(2));
        assert!(slot.take().is_none());
    }
}
