// SPDX-License-Identifier: GPL-3.0-only

//! Fitting a background frame to the foreground resolution
//!
//! The background is scaled uniformly until it covers the target, and the
//! overflow is cropped evenly from both sides. Aspect ratio is never
//! changed.

use crate::backends::camera::types::{BackendError, BackendResult, Frame, FrameOrigin};
use image::{RgbaImage, imageops};

/// Source rectangle (x, y, width, height) that, scaled, covers the target
pub fn cover_crop(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (u32, u32, u32, u32) {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return (0, 0, src_w, src_h);
    }

    // Compare src_w / src_h with dst_w / dst_h without floats
    let src_wide = src_w as u64 * dst_h as u64;
    let dst_wide = dst_w as u64 * src_h as u64;

    if src_wide > dst_wide {
        // Source is wider: keep full height, crop the sides
        let w = ((dst_w as u64 * src_h as u64) / dst_h as u64).clamp(1, src_w as u64) as u32;
        ((src_w - w) / 2, 0, w, src_h)
    } else if src_wide < dst_wide {
        // Source is taller: keep full width, crop top and bottom
        let h = ((dst_h as u64 * src_w as u64) / dst_w as u64).clamp(1, src_h as u64) as u32;
        (0, (src_h - h) / 2, src_w, h)
    } else {
        (0, 0, src_w, src_h)
    }
}

/// Background pixels at the target size, packed RGBA
pub fn fit_background(background: &Frame, width: u32, height: u32) -> BackendResult<Vec<u8>> {
    let packed = background.to_rgba_vec();
    if background.width == width && background.height == height {
        return Ok(packed);
    }

    let image = RgbaImage::from_raw(background.width, background.height, packed).ok_or_else(
        || BackendError::FormatNotSupported("Background buffer does not match its size".into()),
    )?;

    let (x, y, w, h) = cover_crop(background.width, background.height, width, height);
    let cropped = imageops::crop_imm(&image, x, y, w, h).to_image();
    let resized = imageops::resize(&cropped, width, height, imageops::FilterType::Triangle);
    Ok(resized.into_raw())
}

/// Fitted backgrounds, keyed by the frame they came from
///
/// A still image background is fitted once for the whole session; a video
/// background is fitted once per decoded frame.
#[derive(Default)]
pub struct FitCache {
    key: Option<(FrameOrigin, u64, u32, u32, u32, u32)>,
    pixels: Vec<u8>,
}

impl FitCache {
    pub fn get(&mut self, background: &Frame, width: u32, height: u32) -> BackendResult<&[u8]> {
        let key = (
            background.origin,
            background.sequence,
            background.width,
            background.height,
            width,
            height,
        );
        if self.key != Some(key) {
            self.pixels = fit_background(background, width, height)?;
            self.key = Some(key);
        }
        Ok(&self.pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_same_aspect_keeps_everything() {
        assert_eq!(cover_crop(1920, 1080, 1280, 720), (0, 0, 1920, 1080));
    }

    #[test]
    fn test_wider_source_crops_sides() {
        // 2:1 into 16:9
        let (x, y, w, h) = cover_crop(2000, 1000, 1280, 720);
        assert_eq!((y, h), (0, 1000));
        assert_eq!(w, 1777);
        assert_eq!(x, (2000 - 1777) / 2);
    }

    #[test]
    fn test_taller_source_crops_top_and_bottom() {
        // Portrait 9:16 into 16:9
        let (x, y, w, h) = cover_crop(720, 1280, 1280, 720);
        assert_eq!((x, w), (0, 720));
        assert_eq!(h, 405);
        assert_eq!(y, (1280 - 405) / 2);
    }

    #[test]
    fn test_fit_resizes_to_target() {
        let bg = Frame::from_rgba(
            8,
            8,
            vec![50; 8 * 8 * 4],
            Duration::ZERO,
            0,
            FrameOrigin::Background,
        )
        .unwrap();
        let out = fit_background(&bg, 16, 9).unwrap();
        assert_eq!(out.len(), 16 * 9 * 4);
        assert!(out.iter().all(|&v| v == 50));
    }

    #[test]
    fn test_cache_reuses_until_frame_changes() {
        let bg = Frame::from_rgba(4, 4, vec![1; 64], Duration::ZERO, 7, FrameOrigin::Background)
            .unwrap();
        let mut cache = FitCache::default();
        assert_eq!(cache.get(&bg, 2, 2).unwrap().len(), 16);
        let key = cache.key;
        cache.get(&bg, 2, 2).unwrap();
        assert_eq!(cache.key, key);
        let next = bg.retimed(Duration::ZERO, 8, FrameOrigin::Background);
        cache.get(&next, 2, 2).unwrap();
        assert_ne!(cache.key, key);
    }
}
