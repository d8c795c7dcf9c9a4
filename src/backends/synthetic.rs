// SPDX-License-Identifier: GPL-3.0-only

//! Generated test pattern sources
//!
//! The camera pattern is a pure green screen with a moving foreground
//! square, so keying it with `green` leaves only the square. The background
//! patterns are horizontal gradients whose hue shifts with the playback
//! position.
//!
//! Frames are paced by the wall clock at the configured framerate, and
//! timestamps advance by exactly one frame interval per frame. Pausing
//! freezes the timestamp clock.

use crate::backends::camera::device::DeviceLease;
use crate::backends::camera::types::*;
use crate::backends::{FrameSource, MediaBackend, SourceKind};
use crate::config::BackgroundSource;
use crate::pipelines::video::{EncoderSettings, VideoEncoder};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Key color of the generated green screen
pub const SCREEN_RGB: [u8; 3] = [0, 255, 0];

/// Color of the foreground square
pub const SUBJECT_RGB: [u8; 3] = [200, 40, 160];

#[derive(Debug, Clone, Copy)]
enum Pattern {
    GreenScreen,
    Gradient,
}

/// Frame source drawing a generated pattern
pub struct SyntheticSource {
    kind: SourceKind,
    pattern: Pattern,
    width: u32,
    height: u32,
    interval: Duration,
    /// Frames produced since the last rewind
    position: u64,
    /// Frames produced since open, never reset
    sequence: u64,
    /// Timestamp of the next frame
    pts: Duration,
    next_due: Option<Instant>,
    running: bool,
    lease: Option<DeviceLease>,
}

impl SyntheticSource {
    /// Green screen camera holding a lease on `settings.device`
    pub fn camera(settings: &CameraSettings) -> BackendResult<Self> {
        let lease = DeviceLease::acquire(&settings.device)?;
        debug!(device = %lease.device(), "Opening test pattern camera");
        let mut source = Self::new(
            SourceKind::Camera,
            Pattern::GreenScreen,
            settings.width,
            settings.height,
            settings.frame_interval(),
        );
        source.lease = Some(lease);
        Ok(source)
    }

    /// Looping gradient standing in for a background video
    pub fn looping_background(width: u32, height: u32, framerate: u32) -> Self {
        Self::new(
            SourceKind::LoopingVideo,
            Pattern::Gradient,
            width,
            height,
            Duration::from_secs(1) / framerate.max(1),
        )
    }

    /// Fixed gradient standing in for a background image
    pub fn still_background(width: u32, height: u32) -> Self {
        Self::new(
            SourceKind::StillImage,
            Pattern::Gradient,
            width,
            height,
            Duration::ZERO,
        )
    }

    fn new(
        kind: SourceKind,
        pattern: Pattern,
        width: u32,
        height: u32,
        interval: Duration,
    ) -> Self {
        Self {
            kind,
            pattern,
            width,
            height,
            interval,
            position: 0,
            sequence: 0,
            pts: Duration::ZERO,
            next_due: None,
            running: false,
            lease: None,
        }
    }

    fn origin(&self) -> FrameOrigin {
        match self.kind {
            SourceKind::Camera => FrameOrigin::Camera,
            _ => FrameOrigin::Background,
        }
    }

    fn draw(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(w * h * 4);
        match self.pattern {
            Pattern::GreenScreen => {
                let side = (w.min(h) / 3).max(1);
                let travel = w.saturating_sub(side).max(1);
                let left = (self.position as usize * 4) % travel;
                let top = (h - side.min(h)) / 2;
                for y in 0..h {
                    for x in 0..w {
                        let inside = x >= left && x < left + side && y >= top && y < top + side;
                        let [r, g, b] = if inside { SUBJECT_RGB } else { SCREEN_RGB };
                        data.extend_from_slice(&[r, g, b, 255]);
                    }
                }
            }
            Pattern::Gradient => {
                let shift = (self.position % 256) as usize;
                for _ in 0..h {
                    for x in 0..w {
                        let v = ((x * 255 / w.max(1) + shift) % 256) as u8;
                        data.extend_from_slice(&[v, 64, 255 - v, 255]);
                    }
                }
            }
        }
        data
    }

    fn produce(&mut self) -> Option<Frame> {
        let frame = Frame::from_rgba(
            self.width,
            self.height,
            self.draw(),
            self.pts,
            self.sequence,
            self.origin(),
        )
        .ok()?;
        self.position += 1;
        self.sequence += 1;
        self.pts += self.interval;
        Some(frame)
    }
}

impl FrameSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn start(&mut self) -> BackendResult<()> {
        self.running = true;
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn pause(&mut self) -> BackendResult<()> {
        if self.kind != SourceKind::StillImage {
            self.running = false;
        }
        Ok(())
    }

    fn resume(&mut self) -> BackendResult<()> {
        if !self.running {
            self.running = true;
            self.next_due = Some(Instant::now());
        }
        Ok(())
    }

    fn rewind(&mut self) -> BackendResult<()> {
        match self.kind {
            SourceKind::Camera => {}
            SourceKind::StillImage => self.next_due = Some(Instant::now()),
            SourceKind::LoopingVideo => {
                self.position = 0;
                self.next_due = Some(Instant::now());
            }
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if !self.running {
            return None;
        }
        let due = self.next_due?;
        let now = Instant::now();
        if now < due {
            return None;
        }

        if self.kind == SourceKind::StillImage {
            self.next_due = None;
        } else {
            // Skip frames the consumer missed instead of bursting them
            let mut next = due + self.interval;
            if next < now {
                next = now + self.interval;
            }
            self.next_due = Some(next);
        }
        self.produce()
    }

    fn stop(&mut self) {
        self.running = false;
        if let Some(lease) = self.lease.take() {
            debug!(device = %lease.device(), "Test pattern camera closed");
        }
    }
}

/// Backend whose camera is the test pattern
///
/// Background sources and encoders come from the wrapped backend.
pub struct TestPatternBackend<B> {
    inner: B,
}

impl<B: MediaBackend> TestPatternBackend<B> {
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

impl<B: MediaBackend> MediaBackend for TestPatternBackend<B> {
    fn open_camera(&self, settings: &CameraSettings) -> BackendResult<Box<dyn FrameSource>> {
        Ok(Box::new(SyntheticSource::camera(settings)?))
    }

    fn open_background(&self, source: &BackgroundSource) -> BackendResult<Box<dyn FrameSource>> {
        self.inner.open_background(source)
    }

    fn create_encoder(
        &self,
        path: &Path,
        settings: &EncoderSettings,
    ) -> BackendResult<Box<dyn VideoEncoder>> {
        self.inner.create_encoder(path, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CameraSettings {
        CameraSettings {
            device: format!("synthetic-{}", uuid::Uuid::new_v4()),
            width: 32,
            height: 18,
            framerate: 1000,
        }
    }

    #[test]
    fn test_no_frames_before_start() {
        let mut source = SyntheticSource::camera(&settings()).unwrap();
        assert!(source.next_frame().is_none());
        source.start().unwrap();
        assert!(source.next_frame().is_some());
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let mut source = SyntheticSource::camera(&settings()).unwrap();
        source.start().unwrap();
        let mut last = None;
        let mut seen = 0;
        let deadline = Instant::now() + Duration::from_secs(2);
        while seen < 5 && Instant::now() < deadline {
            if let Some(frame) = source.next_frame() {
                if let Some(prev) = last {
                    assert!(frame.pts > prev);
                }
                last = Some(frame.pts);
                seen += 1;
            }
        }
        assert_eq!(seen, 5);
    }

    #[test]
    fn test_pattern_has_screen_and_subject() {
        let mut source = SyntheticSource::camera(&settings()).unwrap();
        source.start().unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.rgb_at(0, 0), SCREEN_RGB);
        assert_eq!(frame.rgb_at(3, 9), SUBJECT_RGB);
    }

    #[test]
    fn test_camera_lease_released_on_stop() {
        let settings = settings();
        let mut source = SyntheticSource::camera(&settings).unwrap();
        assert!(matches!(
            SyntheticSource::camera(&settings),
            Err(BackendError::DeviceBusy(_))
        ));
        source.stop();
        assert!(SyntheticSource::camera(&settings).is_ok());
    }

    #[test]
    fn test_paused_source_is_silent() {
        let mut source = SyntheticSource::looping_background(8, 8, 1000);
        source.start().unwrap();
        source.pause().unwrap();
        assert!(source.next_frame().is_none());
        source.resume().unwrap();
        assert!(source.next_frame().is_some());
    }
}
