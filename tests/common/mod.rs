// SPDX-License-Identifier: GPL-3.0-only

//! Device-free backend shared by the integration tests
//!
//! Camera and backgrounds are synthetic patterns; the encoder records the
//! timestamps it receives and writes a small placeholder file on finish.

#![allow(dead_code)]

use chromakey_camera::backends::camera::types::{
    BackendError, BackendResult, CameraSettings, Frame,
};
use chromakey_camera::backends::synthetic::SyntheticSource;
use chromakey_camera::backends::{FrameSource, MediaBackend};
use chromakey_camera::config::{BackgroundSource, Config, HostRequest};
use chromakey_camera::pipelines::video::{EncodeSummary, EncoderSettings, VideoEncoder};
use chromakey_camera::session::SessionController;
use chromakey_camera::storage::SessionPaths;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 18;

/// Timestamps each encoder saw, one entry per recording
#[derive(Clone, Default)]
pub struct EncoderLog(Arc<Mutex<Vec<Vec<Duration>>>>);

impl EncoderLog {
    pub fn recordings(&self) -> Vec<Vec<Duration>> {
        self.0.lock().unwrap().clone()
    }
}

pub struct MemoryEncoder {
    path: PathBuf,
    log: EncoderLog,
    index: usize,
    fail_after: Option<u64>,
    written: u64,
}

impl VideoEncoder for MemoryEncoder {
    fn push_frame(&mut self, frame: &Frame) -> BackendResult<()> {
        if self.fail_after.is_some_and(|n| self.written >= n) {
            return Err(BackendError::Encoder("disk full".into()));
        }
        if self.written == 0 {
            std::fs::write(&self.path, b"partial")?;
        }
        self.log.0.lock().unwrap()[self.index].push(frame.pts);
        self.written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    fn finish(self: Box<Self>) -> BackendResult<EncodeSummary> {
        std::fs::write(&self.path, format!("{} frames", self.written))?;
        let pts = self.log.0.lock().unwrap()[self.index].clone();
        let duration = match (pts.first(), pts.last()) {
            (Some(first), Some(last)) => *last - *first,
            _ => Duration::ZERO,
        };
        Ok(EncodeSummary {
            path: self.path,
            frames: self.written,
            duration,
        })
    }

    fn abort(self: Box<Self>) {}
}

/// Synthetic sources plus the in-memory encoder
#[derive(Default)]
pub struct TestBackend {
    pub encoders: EncoderLog,
    pub cameras_opened: AtomicUsize,
    /// Make every encoder fail after this many frames
    pub encoder_fail_after: Option<u64>,
}

impl MediaBackend for TestBackend {
    fn open_camera(&self, settings: &CameraSettings) -> BackendResult<Box<dyn FrameSource>> {
        self.cameras_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource::camera(settings)?))
    }

    fn open_background(&self, source: &BackgroundSource) -> BackendResult<Box<dyn FrameSource>> {
        if source
            .path()
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("missing"))
        {
            return Err(BackendError::UnreadableMedia {
                path: source.path().display().to_string(),
                reason: "not found".into(),
            });
        }
        Ok(match source {
            BackgroundSource::StillImage(_) => {
                Box::new(SyntheticSource::still_background(WIDTH * 2, HEIGHT))
            }
            BackgroundSource::LoopingVideo(_) => {
                Box::new(SyntheticSource::looping_background(WIDTH, HEIGHT * 2, 100))
            }
        })
    }

    fn create_encoder(
        &self,
        path: &Path,
        _settings: &EncoderSettings,
    ) -> BackendResult<Box<dyn VideoEncoder>> {
        let mut log = self.encoders.0.lock().unwrap();
        log.push(Vec::new());
        Ok(Box::new(MemoryEncoder {
            path: path.to_path_buf(),
            log: self.encoders.clone(),
            index: log.len() - 1,
            fail_after: self.encoder_fail_after,
            written: 0,
        }))
    }
}

/// A unique temporary directory, removed on drop
pub struct TempDir(pub PathBuf);

impl TempDir {
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("chromakey-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    pub fn paths(&self) -> SessionPaths {
        SessionPaths::in_dir(&self.0)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// Camera settings on a device no other test uses
pub fn camera() -> CameraSettings {
    CameraSettings {
        device: format!("test-camera-{}", uuid::Uuid::new_v4()),
        width: WIDTH,
        height: HEIGHT,
        framerate: 200,
    }
}

pub fn controller(backend: Arc<TestBackend>, dir: &TempDir) -> SessionController {
    controller_on(backend, dir, camera())
}

pub fn controller_on(
    backend: Arc<TestBackend>,
    dir: &TempDir,
    camera: CameraSettings,
) -> SessionController {
    SessionController::new(backend, &Config::default())
        .with_paths(dir.paths())
        .with_camera(camera)
}

pub fn photo_request(mode: &str) -> HostRequest {
    HostRequest {
        mode: Some(mode.into()),
        background_mode: Some("photo".into()),
        background_photo: Some("/backgrounds/beach.jpg".into()),
        color: Some("green".into()),
        threshold: Some(0.4),
        smoothing: Some(0.1),
        ..Default::default()
    }
}

pub fn video_request(mode: &str) -> HostRequest {
    HostRequest {
        mode: Some(mode.into()),
        background_mode: Some("video".into()),
        background_video: Some("/backgrounds/waves.mp4".into()),
        color: Some("green".into()),
        ..Default::default()
    }
}

/// Let the pipeline run for a while
pub async fn run_for(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Wait until `check` holds, failing the test after two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
