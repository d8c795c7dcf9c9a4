// SPDX-License-Identifier: GPL-3.0-only

//! Classification properties of the chroma key blend over a sampled RGB cube

use chromakey_camera::backends::camera::types::{Frame, FrameOrigin};
use chromakey_camera::config::{ChromaKeyConfig, KeyColor};
use chromakey_camera::pipelines::compositor::{background_alpha, blend, color_distance};
use std::time::Duration;

const BACKGROUND: [u8; 3] = [12, 34, 56];

fn pixel(rgb: [u8; 3], origin: FrameOrigin) -> Frame {
    Frame::from_rgba(1, 1, vec![rgb[0], rgb[1], rgb[2], 255], Duration::ZERO, 0, origin).unwrap()
}

fn sampled_colors() -> impl Iterator<Item = [u8; 3]> {
    let steps = (0..=255u16).step_by(17).map(|v| v as u8);
    steps.clone().flat_map(move |r| {
        let steps = steps.clone();
        steps.clone().flat_map(move |g| steps.clone().map(move |b| [r, g, b]))
    })
}

fn blended(rgb: [u8; 3], config: &ChromaKeyConfig) -> [u8; 3] {
    let out = blend(
        &pixel(rgb, FrameOrigin::Camera),
        &pixel(BACKGROUND, FrameOrigin::Background),
        config,
    )
    .unwrap();
    out.rgb_at(0, 0)
}

fn configs() -> Vec<ChromaKeyConfig> {
    vec![
        ChromaKeyConfig::new(KeyColor::Green, 0.4, 0.1).unwrap(),
        ChromaKeyConfig::new(KeyColor::Blue, 0.2, 0.15).unwrap(),
        ChromaKeyConfig::new(KeyColor::Rgb([30, 200, 60]), 0.1, 0.0).unwrap(),
    ]
}

#[test]
fn test_far_colors_keep_foreground() {
    for config in configs() {
        let mut checked = 0;
        for rgb in sampled_colors() {
            let d = color_distance(rgb, config.key.rgb());
            if d >= config.threshold + config.smoothing {
                assert_eq!(blended(rgb, &config), rgb, "color {:?} at distance {}", rgb, d);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }
}

#[test]
fn test_near_colors_show_background_exactly() {
    for config in configs() {
        let mut checked = 0;
        for rgb in sampled_colors() {
            let d = color_distance(rgb, config.key.rgb());
            if d <= config.threshold {
                assert_eq!(blended(rgb, &config), BACKGROUND, "color {:?} at distance {}", rgb, d);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }
}

#[test]
fn test_band_colors_lie_between_inputs() {
    let config = ChromaKeyConfig::new(KeyColor::Green, 0.3, 0.3).unwrap();
    let mut checked = 0;
    for rgb in sampled_colors() {
        let d = color_distance(rgb, config.key.rgb());
        if d > config.threshold && d < config.threshold + config.smoothing {
            let out = blended(rgb, &config);
            for c in 0..3 {
                let (lo, hi) = (rgb[c].min(BACKGROUND[c]), rgb[c].max(BACKGROUND[c]));
                assert!((lo..=hi).contains(&out[c]), "color {:?} blended to {:?}", rgb, out);
            }
            checked += 1;
        }
    }
    assert!(checked > 0);
}

#[test]
fn test_alpha_strictly_decreases_across_band() {
    for (threshold, smoothing) in [(0.4, 0.1), (0.0, 1.0), (0.25, 0.05)] {
        let mut last = background_alpha(threshold, threshold, smoothing);
        assert_eq!(last, 1.0);
        for step in 1..100 {
            let d = threshold + smoothing * step as f32 / 100.0;
            let alpha = background_alpha(d, threshold, smoothing);
            assert!(alpha < last, "alpha {} at {} not below {}", alpha, d, last);
            last = alpha;
        }
        assert_eq!(background_alpha(threshold + smoothing, threshold, smoothing), 0.0);
    }
}

#[test]
fn test_key_is_brightness_independent() {
    // Darker and lighter greens sit on the same chroma axis as pure green
    let key = KeyColor::Green.rgb();
    let dark = color_distance([0, 128, 0], key);
    let light = color_distance([128, 255, 128], key);
    assert!(dark < color_distance([255, 0, 255], key));
    assert!(light < color_distance([255, 0, 255], key));
}
