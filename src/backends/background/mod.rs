// SPDX-License-Identifier: GPL-3.0-only

//! Background media sources
//!
//! A session composites over exactly one background: a still image that is
//! decoded once and re-displayed, or a video file that loops forever.

mod decoder;

pub use decoder::LoopingVideoSource;

use crate::backends::camera::types::{BackendError, BackendResult, Frame, FrameOrigin};
use crate::backends::{FrameSource, SourceKind};
use crate::config::BackgroundSource;
use crate::constants::file_formats;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Open the source matching a background declaration
///
/// The declared mode decides how the file is read; an extension that looks
/// like the other kind only produces a warning.
pub fn open(source: &BackgroundSource) -> BackendResult<Box<dyn FrameSource>> {
    let extension = source
        .path()
        .extension()
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_default();
    let mismatched = match source {
        BackgroundSource::StillImage(_) => file_formats::is_video_extension(&extension),
        BackgroundSource::LoopingVideo(_) => file_formats::is_image_extension(&extension),
    };
    if mismatched {
        warn!(
            path = %source.path().display(),
            "Background file extension does not match the declared background mode"
        );
    }

    match source {
        BackgroundSource::StillImage(path) => Ok(Box::new(StillImageSource::open(path)?)),
        BackgroundSource::LoopingVideo(path) => Ok(Box::new(LoopingVideoSource::open(path)?)),
    }
}

/// Load an image file as an RGBA background frame
///
/// Supports common image formats: PNG, JPEG, GIF, BMP, WebP
pub fn load_image_as_frame(path: &Path) -> BackendResult<Frame> {
    info!(path = %path.display(), "Loading background image");

    let img = image::open(path).map_err(|e| BackendError::UnreadableMedia {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    info!(width, height, "Background image loaded");
    Frame::from_rgba(
        width,
        height,
        rgba.into_raw(),
        Duration::ZERO,
        0,
        FrameOrigin::Background,
    )
}

/// A still image shown behind every frame
///
/// The decoded frame is retained for the whole session. It is handed out
/// once per start or rewind; the graph keeps re-using it afterwards.
pub struct StillImageSource {
    frame: Frame,
    pending: bool,
}

impl StillImageSource {
    pub fn open(path: &Path) -> BackendResult<Self> {
        Ok(Self::from_frame(load_image_as_frame(path)?))
    }

    pub fn from_frame(frame: Frame) -> Self {
        Self {
            frame,
            pending: false,
        }
    }
}

impl FrameSource for StillImageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::StillImage
    }

    fn start(&mut self) -> BackendResult<()> {
        self.pending = true;
        Ok(())
    }

    fn pause(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn resume(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn rewind(&mut self) -> BackendResult<()> {
        self.pending = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if std::mem::take(&mut self.pending) {
            Some(self.frame.clone())
        } else {
            None
        }
    }

    fn stop(&mut self) {
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_image_is_unreadable() {
        let path = std::env::temp_dir().join(format!("{}.png", uuid::Uuid::new_v4()));
        assert!(matches!(
            load_image_as_frame(&path),
            Err(BackendError::UnreadableMedia { .. })
        ));
    }

    #[test]
    fn test_still_image_handed_out_once_per_start() {
        let frame =
            Frame::from_rgba(2, 2, vec![9; 16], Duration::ZERO, 0, FrameOrigin::Background)
                .unwrap();
        let mut source = StillImageSource::from_frame(frame);
        assert!(source.next_frame().is_none());
        source.start().unwrap();
        assert!(source.next_frame().is_some());
        assert!(source.next_frame().is_none());
        source.rewind().unwrap();
        assert!(source.next_frame().is_some());
    }

    #[test]
    fn test_loads_png() {
        let path = std::env::temp_dir().join(format!("{}.png", uuid::Uuid::new_v4()));
        image::RgbaImage::from_pixel(4, 3, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();
        let frame = load_image_as_frame(&path).unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert_eq!(frame.rgb_at(3, 2), [1, 2, 3]);
        let _ = std::fs::remove_file(path);
    }
}
