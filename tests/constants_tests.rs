// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use chromakey_camera::constants::{BitratePreset, chroma};

#[test]
fn test_bitrate_preset_ordering() {
    // Presets are ordered from lowest to highest quality
    let mut prev_bitrate = 0u32;
    for preset in BitratePreset::ALL {
        let bitrate = preset.bitrate_kbps(1920);
        assert!(
            bitrate >= prev_bitrate,
            "Presets should be ordered from lowest to highest"
        );
        prev_bitrate = bitrate;
    }
}

#[test]
fn test_bitrate_scales_with_resolution() {
    let hd_bitrate = BitratePreset::Medium.bitrate_kbps(1280);
    let fhd_bitrate = BitratePreset::Medium.bitrate_kbps(1920);
    let uhd_bitrate = BitratePreset::Medium.bitrate_kbps(3840);

    assert!(hd_bitrate < fhd_bitrate);
    assert!(fhd_bitrate < uhd_bitrate);
}

#[test]
fn test_bitrate_preset_display_names() {
    for preset in BitratePreset::ALL {
        assert!(
            !preset.display_name().is_empty(),
            "Preset {:?} has empty display name",
            preset
        );
    }
}

#[test]
fn test_default_key_fits_calibration_range() {
    assert!(chroma::DEFAULT_THRESHOLD <= chroma::CALIBRATION_THRESHOLD_MAX);
    assert!(chroma::DEFAULT_SMOOTHING <= chroma::CALIBRATION_SMOOTHING_MAX);
}
