// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{BitratePreset, capture, chroma, output};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Persisted application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the session photo and movie files
    /// (None = documents folder)
    pub output_dir: Option<PathBuf>,
    /// Session photo file name
    pub photo_file_name: String,
    /// Session movie file name
    pub movie_file_name: String,
    /// Camera device identifier (empty = system default camera)
    pub camera_device: String,
    /// Capture width
    pub capture_width: u32,
    /// Capture height
    pub capture_height: u32,
    /// Capture framerate
    pub capture_framerate: u32,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    /// JPEG quality for still photos
    pub jpeg_quality: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: None,
            photo_file_name: output::PHOTO_FILE_NAME.to_string(),
            movie_file_name: output::MOVIE_FILE_NAME.to_string(),
            camera_device: String::new(),
            capture_width: capture::DEFAULT_WIDTH,
            capture_height: capture::DEFAULT_HEIGHT,
            capture_framerate: capture::DEFAULT_FRAMERATE,
            bitrate_preset: BitratePreset::default(),
            jpeg_quality: output::JPEG_QUALITY,
        }
    }
}

impl Config {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chromakey-camera").join("config.json"))
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load settings from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Settings(e.to_string())),
        };
        serde_json::from_str(&text).map_err(|e| ConfigError::Settings(e.to_string()))
    }

    /// Write settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Settings(e.to_string()))?;
        }
        let text =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Settings(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| ConfigError::Settings(e.to_string()))?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Resolved output directory
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::document_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(output::DEFAULT_SAVE_FOLDER)
        })
    }

    /// Camera settings derived from the persisted capture fields
    pub fn camera_settings(&self) -> crate::backends::camera::types::CameraSettings {
        crate::backends::camera::types::CameraSettings {
            device: self.camera_device.clone(),
            width: self.capture_width,
            height: self.capture_height,
            framerate: self.capture_framerate,
        }
    }
}

/// What the session captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Photo,
    Video,
    /// Live tuning of threshold and smoothing, no capture
    Calibrate,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Calibrate => "calibrate",
        }
    }
}

/// Declared kind of background media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    Photo,
    Video,
}

/// Background media for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundSource {
    StillImage(PathBuf),
    LoopingVideo(PathBuf),
}

impl BackgroundSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::StillImage(path) | Self::LoopingVideo(path) => path,
        }
    }

    /// Background mode this source satisfies
    pub fn mode(&self) -> BackgroundMode {
        match self {
            Self::StillImage(_) => BackgroundMode::Photo,
            Self::LoopingVideo(_) => BackgroundMode::Video,
        }
    }
}

/// Color removed from the foreground
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyColor {
    Red,
    Green,
    Blue,
    Rgb([u8; 3]),
}

impl KeyColor {
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Self::Red => [255, 0, 0],
            Self::Green => [0, 255, 0],
            Self::Blue => [0, 0, 255],
            Self::Rgb(rgb) => *rgb,
        }
    }

    /// Parse "red", "green", "blue" or "#rrggbb"
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "red" => Ok(Self::Red),
            "green" => Ok(Self::Green),
            "blue" => Ok(Self::Blue),
            hex if hex.len() == 7 && hex.starts_with('#') => {
                let channel = |i: usize| {
                    hex.get(i..i + 2)
                        .and_then(|s| u8::from_str_radix(s, 16).ok())
                        .ok_or_else(|| ConfigError::InvalidColor(value.to_string()))
                };
                Ok(Self::Rgb([channel(1)?, channel(3)?, channel(5)?]))
            }
            _ => Err(ConfigError::InvalidColor(value.to_string())),
        }
    }
}

/// Key color plus classification parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaKeyConfig {
    pub key: KeyColor,
    /// Distance at or below which a pixel is fully background
    pub threshold: f32,
    /// Width of the linear transition band above the threshold
    pub smoothing: f32,
}

impl ChromaKeyConfig {
    /// Build a config, rejecting values outside [0, 1]
    pub fn new(key: KeyColor, threshold: f32, smoothing: f32) -> Result<Self, ConfigError> {
        Ok(Self {
            key,
            threshold: bounded("threshold", threshold, 1.0)?,
            smoothing: bounded("smoothing", smoothing, 1.0)?,
        })
    }

    /// Check both parameters without constructing
    pub fn validate(&self) -> Result<(), ConfigError> {
        bounded("threshold", self.threshold, 1.0)?;
        bounded("smoothing", self.smoothing, 1.0)?;
        Ok(())
    }
}

impl Default for ChromaKeyConfig {
    fn default() -> Self {
        Self {
            key: KeyColor::Blue,
            threshold: chroma::DEFAULT_THRESHOLD,
            smoothing: chroma::DEFAULT_SMOOTHING,
        }
    }
}

/// Accept `value` if it lies in `[0, max]`
pub fn bounded(name: &'static str, value: f32, max: f32) -> Result<f32, ConfigError> {
    if (0.0..=max).contains(&value) {
        Ok(value)
    } else {
        // NaN also lands here
        Err(ConfigError::OutOfRange { name, value, max })
    }
}

/// Fully validated session parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub mode: OperationMode,
    pub background_mode: BackgroundMode,
    pub background: BackgroundSource,
    pub chroma: ChromaKeyConfig,
}

impl SessionConfig {
    /// Build a config whose background mode follows the source
    pub fn new(mode: OperationMode, background: BackgroundSource, chroma: ChromaKeyConfig) -> Self {
        Self {
            mode,
            background_mode: background.mode(),
            background,
            chroma,
        }
    }

    /// Re-check invariants for configs built by hand
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chroma.validate()?;
        if self.background.mode() != self.background_mode {
            return Err(ConfigError::BackgroundMismatch);
        }
        Ok(())
    }
}

/// Argument object supplied by the host application
///
/// Field names follow the host's camelCase convention. Every field is
/// optional at the wire level; [`HostRequest::parse`] applies defaults and
/// checks that the background path for the declared mode is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    pub mode: Option<String>,
    pub background_mode: Option<String>,
    pub background_photo: Option<String>,
    pub background_video: Option<String>,
    pub color: Option<String>,
    pub threshold: Option<f32>,
    pub smoothing: Option<f32>,
}

impl HostRequest {
    /// Decode a request from its JSON form
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Closed parse step: every string becomes a typed value or an error
    pub fn parse(&self) -> Result<SessionConfig, ConfigError> {
        let mode = match self.mode.as_deref().unwrap_or("photo") {
            "photo" => OperationMode::Photo,
            "video" => OperationMode::Video,
            "calibrate" => OperationMode::Calibrate,
            other => return Err(ConfigError::InvalidMode(other.to_string())),
        };

        let background = match self.background_mode.as_deref().unwrap_or("photo") {
            "photo" => BackgroundSource::StillImage(required_path(
                self.background_photo.as_deref(),
                "backgroundPhoto",
            )?),
            "video" => BackgroundSource::LoopingVideo(required_path(
                self.background_video.as_deref(),
                "backgroundVideo",
            )?),
            other => return Err(ConfigError::InvalidBackgroundMode(other.to_string())),
        };

        let key = KeyColor::parse(self.color.as_deref().unwrap_or("blue"))?;
        let chroma = ChromaKeyConfig::new(
            key,
            self.threshold.unwrap_or(chroma::DEFAULT_THRESHOLD),
            self.smoothing.unwrap_or(chroma::DEFAULT_SMOOTHING),
        )?;

        Ok(SessionConfig::new(mode, background, chroma))
    }
}

fn required_path(value: Option<&str>, name: &'static str) -> Result<PathBuf, ConfigError> {
    match value {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(ConfigError::MissingArgument(name)),
    }
}
