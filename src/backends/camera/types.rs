// SPDX-License-Identifier: GPL-3.0-only
// Shared types for frame sources, sinks and the compositor

//! Shared frame types

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pixel buffer storage shared between pipeline stages
///
/// Frames are immutable once produced; cloning a frame only bumps the
/// reference count of the underlying buffer.
#[derive(Clone)]
pub struct FrameData(Arc<[u8]>);

impl FrameData {
    /// Wrap an owned pixel buffer
    pub fn new(data: Vec<u8>) -> Self {
        Self(Arc::from(data.into_boxed_slice()))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameData({} bytes)", self.0.len())
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// Pixel format of a frame buffer
///
/// Every source in this crate negotiates a 32-bit packed format; the
/// compositor reads both byte orders and always emits RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order)
    BGRA,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        4
    }

    /// Byte offsets of the red, green and blue channels within a pixel
    pub fn rgb_offsets(&self) -> [usize; 3] {
        match self {
            Self::RGBA => [0, 1, 2],
            Self::BGRA => [2, 1, 0],
        }
    }

    /// GStreamer video/x-raw format string
    pub fn to_gst_format_string(&self) -> &'static str {
        match self {
            Self::RGBA => "RGBA",
            Self::BGRA => "BGRA",
        }
    }

    /// Parse format from GStreamer format string
    pub fn from_gst_format(format: &str) -> Option<Self> {
        match format {
            "RGBA" | "RGBx" => Some(Self::RGBA),
            "BGRA" | "BGRx" => Some(Self::BGRA),
            _ => None,
        }
    }
}

/// Which stage produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOrigin {
    Camera,
    Background,
    Composite,
}

/// A single timestamped frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
    pub format: PixelFormat,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    /// Presentation timestamp on the producing source's clock
    pub pts: Duration,
    /// Monotonic per-source sequence number
    pub sequence: u64,
    pub origin: FrameOrigin,
    /// Wall-clock time the frame was produced (latency diagnostics)
    pub captured_at: Instant,
}

impl Frame {
    /// Build a tightly packed RGBA frame
    pub fn from_rgba(
        width: u32,
        height: u32,
        data: Vec<u8>,
        pts: Duration,
        sequence: u64,
        origin: FrameOrigin,
    ) -> BackendResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(BackendError::FormatNotSupported(format!(
                "RGBA buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            data: FrameData::new(data),
            format: PixelFormat::RGBA,
            stride: width * 4,
            pts,
            sequence,
            origin,
            captured_at: Instant::now(),
        })
    }

    /// Red, green and blue bytes of the pixel at (x, y)
    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let base = y as usize * self.stride as usize + x as usize * 4;
        let [r, g, b] = self.format.rgb_offsets();
        [self.data[base + r], self.data[base + g], self.data[base + b]]
    }

    /// One row of pixel data without stride padding
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        &self.data[start..start + self.width as usize * 4]
    }

    /// Copy the frame into a packed RGBA vector
    pub fn to_rgba_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            let row = self.row(y);
            match self.format {
                PixelFormat::RGBA => out.extend_from_slice(row),
                PixelFormat::BGRA => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
            }
        }
        out
    }

    /// Same pixels, re-tagged with a new timestamp and origin
    pub fn retimed(&self, pts: Duration, sequence: u64, origin: FrameOrigin) -> Self {
        Self {
            pts,
            sequence,
            origin,
            captured_at: Instant::now(),
            ..self.clone()
        }
    }
}

/// Camera capture settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSettings {
    /// Device identifier; empty selects the system default camera
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: String::new(),
            width: crate::constants::capture::DEFAULT_WIDTH,
            height: crate::constants::capture::DEFAULT_HEIGHT,
            framerate: crate::constants::capture::DEFAULT_FRAMERATE,
        }
    }
}

impl CameraSettings {
    /// Nominal interval between two frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.framerate.max(1)
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    /// Failed to initialize a source, sink or encoder
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
    /// Capture device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Capture device already owned by another session
    #[error("Device busy: {0}")]
    DeviceBusy(String),
    /// Background media could not be read or decoded
    #[error("Unreadable media '{path}': {reason}")]
    UnreadableMedia { path: String, reason: String },
    /// Format not supported
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),
    /// Encoder failed while writing or finalizing
    #[error("Encoder error: {0}")]
    Encoder(String),
    /// General I/O error
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Error: {0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let err = Frame::from_rgba(2, 2, vec![0; 15], Duration::ZERO, 0, FrameOrigin::Camera)
            .unwrap_err();
        assert!(matches!(err, BackendError::FormatNotSupported(_)));
    }

    #[test]
    fn test_bgra_reads_as_rgb() {
        let mut frame =
            Frame::from_rgba(1, 1, vec![10, 20, 30, 255], Duration::ZERO, 0, FrameOrigin::Camera)
                .unwrap();
        frame.format = PixelFormat::BGRA;
        assert_eq!(frame.rgb_at(0, 0), [30, 20, 10]);
        assert_eq!(frame.to_rgba_vec(), vec![30, 20, 10, 255]);
    }

    #[test]
    fn test_row_skips_stride_padding() {
        let mut data = vec![0u8; 2 * 12];
        data[12..16].copy_from_slice(&[1, 2, 3, 4]);
        let frame = Frame {
            width: 2,
            height: 2,
            data: FrameData::new(data),
            format: PixelFormat::RGBA,
            stride: 12,
            pts: Duration::ZERO,
            sequence: 0,
            origin: FrameOrigin::Camera,
            captured_at: Instant::now(),
        };
        assert_eq!(frame.row(1).len(), 8);
        assert_eq!(&frame.row(1)[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_frame_interval() {
        let settings = CameraSettings {
            framerate: 25,
            ..Default::default()
        };
        assert_eq!(settings.frame_interval(), Duration::from_millis(40));
    }
}
