// SPDX-License-Identifier: GPL-3.0-only

//! Async photo encoding
//!
//! Encoding and the file write both run on the blocking pool.

use crate::backends::camera::types::Frame;
use crate::errors::RecordingError;
use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    Jpeg,
    /// PNG format (lossless compression)
    Png,
}

impl EncodingFormat {
    /// Pick the format from a file extension, defaulting to JPEG
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => EncodingFormat::Png,
            _ => EncodingFormat::Jpeg,
        }
    }
}

/// Encodes composite frames into still image files
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    format: EncodingFormat,
    quality: u8,
}

impl PhotoEncoder {
    pub fn new(format: EncodingFormat, quality: u8) -> Self {
        Self {
            format,
            quality: quality.clamp(1, 100),
        }
    }

    /// Encode `frame` and write it to `path`, replacing any existing file
    pub async fn save(&self, frame: Frame, path: PathBuf) -> Result<PathBuf, RecordingError> {
        info!(
            width = frame.width,
            height = frame.height,
            format = ?self.format,
            path = %path.display(),
            "Saving photo"
        );

        let encoder = *self;
        tokio::task::spawn_blocking(move || {
            let data = encoder.encode(&frame)?;
            debug!(size = data.len(), "Encoding complete");
            crate::storage::prepare_parent(&path)?;
            std::fs::write(&path, &data)?;
            info!(path = %path.display(), "Photo saved successfully");
            Ok::<_, RecordingError>(path)
        })
        .await
        .map_err(|e| RecordingError::CaptureFailed(format!("Encoding task error: {}", e)))?
    }

    /// Encode a frame into an in-memory file
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, RecordingError> {
        let rgb = to_rgb_image(frame)?;
        let mut buffer = Vec::new();
        match self.format {
            EncodingFormat::Jpeg => {
                let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                    &mut buffer,
                    self.quality,
                );
                encoder
                    .encode(
                        rgb.as_raw(),
                        rgb.width(),
                        rgb.height(),
                        image::ExtendedColorType::Rgb8,
                    )
                    .map_err(|e| RecordingError::CaptureFailed(format!("JPEG encoding failed: {}", e)))?;
            }
            EncodingFormat::Png => {
                rgb.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(|e| RecordingError::CaptureFailed(format!("PNG encoding failed: {}", e)))?;
            }
        }
        Ok(buffer)
    }
}

fn to_rgb_image(frame: &Frame) -> Result<RgbImage, RecordingError> {
    let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    for px in frame.to_rgba_vec().chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| RecordingError::CaptureFailed("Frame size mismatch".into()))
}
