// SPDX-License-Identifier: GPL-3.0-only

//! Per-pixel chroma key classification and blending
//!
//! Colors are compared in the chroma plane of YCbCr, so the key matches a
//! backdrop regardless of how brightly it is lit. For a pixel at distance
//! `d` from the key color, with threshold `t` and smoothing `s`:
//!
//! | distance            | output                                   |
//! |---------------------|------------------------------------------|
//! | `d <= t`            | background pixel, exactly                |
//! | `t < d < t + s`     | mix, background weight falls 1.0 → 0.0   |
//! | `d >= t + s`        | foreground pixel, exactly                |

use super::fit::FitCache;
use crate::backends::camera::types::{BackendResult, Frame, FrameOrigin};
use crate::config::ChromaKeyConfig;

const LUMA_R: f32 = 0.2989;
const LUMA_G: f32 = 0.5866;
const LUMA_B: f32 = 0.1145;
const CR_SCALE: f32 = 0.7132;
const CB_SCALE: f32 = 0.5647;

/// Chroma components (Cr, Cb) of an 8-bit RGB color
#[inline]
pub fn chroma_of(rgb: [u8; 3]) -> [f32; 2] {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let y = LUMA_R * r + LUMA_G * g + LUMA_B * b;
    [CR_SCALE * (r - y), CB_SCALE * (b - y)]
}

/// Distance between a pixel and the key in the chroma plane
#[inline]
pub fn color_distance(rgb: [u8; 3], key: [u8; 3]) -> f32 {
    distance_to(rgb, chroma_of(key))
}

#[inline]
fn distance_to(rgb: [u8; 3], key: [f32; 2]) -> f32 {
    let [cr, cb] = chroma_of(rgb);
    ((cr - key[0]).powi(2) + (cb - key[1]).powi(2)).sqrt()
}

/// Weight of the background pixel for a given distance
///
/// 1.0 up to the threshold, 0.0 from threshold + smoothing on, linear in
/// between.
#[inline]
pub fn background_alpha(distance: f32, threshold: f32, smoothing: f32) -> f32 {
    if distance <= threshold {
        1.0
    } else if distance >= threshold + smoothing {
        0.0
    } else {
        1.0 - (distance - threshold) / smoothing
    }
}

#[inline]
fn mix(fg: u8, bg: u8, alpha: f32) -> u8 {
    (fg as f32 * (1.0 - alpha) + bg as f32 * alpha)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Blend a foreground over packed RGBA background pixels of the same size
fn blend_onto(foreground: &Frame, background: &[u8], config: &ChromaKeyConfig) -> Frame {
    let key = chroma_of(config.key.rgb());
    let (width, height) = (foreground.width, foreground.height);
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);

    let [ro, go, bo] = foreground.format.rgb_offsets();
    for y in 0..height {
        let fg_row = foreground.row(y);
        let bg_row = &background[(y * width * 4) as usize..((y + 1) * width * 4) as usize];
        for (fg, bg) in fg_row.chunks_exact(4).zip(bg_row.chunks_exact(4)) {
            let rgb = [fg[ro], fg[go], fg[bo]];
            let alpha = background_alpha(distance_to(rgb, key), config.threshold, config.smoothing);
            if alpha >= 1.0 {
                out.extend_from_slice(&[bg[0], bg[1], bg[2], 255]);
            } else if alpha <= 0.0 {
                out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            } else {
                out.extend_from_slice(&[
                    mix(rgb[0], bg[0], alpha),
                    mix(rgb[1], bg[1], alpha),
                    mix(rgb[2], bg[2], alpha),
                    255,
                ]);
            }
        }
    }

    Frame {
        width,
        height,
        data: out.into(),
        format: crate::backends::camera::types::PixelFormat::RGBA,
        stride: width * 4,
        pts: foreground.pts,
        sequence: foreground.sequence,
        origin: FrameOrigin::Composite,
        captured_at: foreground.captured_at,
    }
}

/// Composite `foreground` over `background`
///
/// The background is fitted to the foreground resolution first. The output
/// carries the foreground's timestamp and sequence number; neither input is
/// modified.
pub fn blend(foreground: &Frame, background: &Frame, config: &ChromaKeyConfig) -> BackendResult<Frame> {
    let fitted =
        super::fit::fit_background(background, foreground.width, foreground.height)?;
    Ok(blend_onto(foreground, &fitted, config))
}

/// Stateful blender used by the pipeline
///
/// Holds the current key settings and caches the fitted background so a
/// still image is only scaled once.
pub struct ChromaKeyBlender {
    config: ChromaKeyConfig,
    fit_cache: FitCache,
}

impl ChromaKeyBlender {
    pub fn new(config: ChromaKeyConfig) -> Self {
        Self {
            config,
            fit_cache: FitCache::default(),
        }
    }

    pub fn config(&self) -> &ChromaKeyConfig {
        &self.config
    }

    /// Replace the key settings; takes effect on the next frame
    pub fn set_config(&mut self, config: ChromaKeyConfig) {
        self.config = config;
    }

    pub fn blend(&mut self, foreground: &Frame, background: &Frame) -> BackendResult<Frame> {
        let fitted = self
            .fit_cache
            .get(background, foreground.width, foreground.height)?;
        Ok(blend_onto(foreground, fitted, &self.config))
    }
}
