// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Video encoder bitrate presets
///
/// These presets define the target bitrate for video encoding based on resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Low bitrate - smaller files, reduced quality
    Low,
    /// Medium bitrate - balanced quality and file size (default)
    #[default]
    Medium,
    /// High bitrate - larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Get bitrate in kbps for a given resolution
    ///
    /// - SD (640x480): Low=1, Medium=2, High=4 Mbps
    /// - HD (1280x720): Low=2.5, Medium=5, High=10 Mbps
    /// - Full HD (1920x1080): Low=4, Medium=8, High=16 Mbps
    /// - 4K (3840x2160): Low=15, Medium=30, High=50 Mbps
    pub fn bitrate_kbps(&self, width: u32) -> u32 {
        match (get_resolution_tier(width), self) {
            (ResolutionTier::SD, BitratePreset::Low) => 1_000,
            (ResolutionTier::SD, BitratePreset::Medium) => 2_000,
            (ResolutionTier::SD, BitratePreset::High) => 4_000,
            (ResolutionTier::HD, BitratePreset::Low) => 2_500,
            (ResolutionTier::HD, BitratePreset::Medium) => 5_000,
            (ResolutionTier::HD, BitratePreset::High) => 10_000,
            (ResolutionTier::FullHD, BitratePreset::Low) => 4_000,
            (ResolutionTier::FullHD, BitratePreset::Medium) => 8_000,
            (ResolutionTier::FullHD, BitratePreset::High) => 16_000,
            (ResolutionTier::FourK, BitratePreset::Low) => 15_000,
            (ResolutionTier::FourK, BitratePreset::Medium) => 30_000,
            (ResolutionTier::FourK, BitratePreset::High) => 50_000,
        }
    }
}

/// Resolution tiers for bitrate calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    SD,
    HD,
    FullHD,
    FourK,
}

/// Get the resolution tier for a given width
pub fn get_resolution_tier(width: u32) -> ResolutionTier {
    match width {
        w if w >= 3840 => ResolutionTier::FourK,
        w if w >= 1920 => ResolutionTier::FullHD,
        w if w >= 1280 => ResolutionTier::HD,
        _ => ResolutionTier::SD,
    }
}

/// Chroma key defaults and calibration slider ranges
pub mod chroma {
    /// Threshold used when the host does not supply one
    pub const DEFAULT_THRESHOLD: f32 = 0.4;

    /// Smoothing used when the host does not supply one
    pub const DEFAULT_SMOOTHING: f32 = 0.1;

    /// Upper bound of the threshold slider in calibrate mode
    pub const CALIBRATION_THRESHOLD_MAX: f32 = 0.8;

    /// Upper bound of the smoothing slider in calibrate mode
    pub const CALIBRATION_SMOOTHING_MAX: f32 = 0.5;
}

/// Camera capture defaults
pub mod capture {
    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;
    pub const DEFAULT_FRAMERATE: u32 = 30;
}

/// Session-scoped output files
pub mod output {
    /// Default folder name for captures
    pub const DEFAULT_SAVE_FOLDER: &str = "ChromaKey";

    pub const PHOTO_FILE_NAME: &str = "photo.jpg";

    pub const MOVIE_FILE_NAME: &str = "movie.mp4";

    /// JPEG quality for still photos (0-100)
    pub const JPEG_QUALITY: u8 = 92;
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum buffer queue size at source appsinks (drop older frames beyond this)
    pub const MAX_BUFFERS: u32 = 1;

    /// Output pixel format for appsink
    pub const OUTPUT_FORMAT: &str = "RGBA";

    /// Composite frames buffered for the host preview before dropping
    pub const PREVIEW_QUEUE_DEPTH: usize = 2;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// How long the processing loop sleeps when no camera frame is ready
    pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(2);

    /// Pipeline state change timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Upper bound for waiting on encoder EOS during finalize
    pub const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Upper bound for a still capture to receive its composite frame
    pub const STILL_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Timeout for the processing thread to acknowledge a control message
    pub const CONTROL_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Background media timing constants
pub mod background {
    /// GStreamer timeout while prerolling a looping video background
    pub const DECODER_PREROLL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
}

/// Supported background file formats
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Supported video file extensions
    pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov"];

    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    pub fn is_video_extension(ext: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_tiers() {
        assert_eq!(get_resolution_tier(3840), ResolutionTier::FourK);
        assert_eq!(get_resolution_tier(1920), ResolutionTier::FullHD);
        assert_eq!(get_resolution_tier(1280), ResolutionTier::HD);
        assert_eq!(get_resolution_tier(640), ResolutionTier::SD);
    }

    #[test]
    fn test_extensions_case_insensitive() {
        assert!(file_formats::is_image_extension("PNG"));
        assert!(file_formats::is_video_extension("Mp4"));
        assert!(!file_formats::is_image_extension("mp4"));
    }
}
