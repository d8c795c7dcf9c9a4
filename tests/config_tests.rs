// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use chromakey_camera::config::{BackgroundSource, KeyColor, OperationMode};
use chromakey_camera::errors::ConfigError;
use chromakey_camera::{Config, HostRequest};
use std::path::PathBuf;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.photo_file_name, "photo.jpg");
    assert_eq!(config.movie_file_name, "movie.mp4");
    assert!(config.camera_device.is_empty(), "Default camera should be the system default");
}

#[test]
fn test_settings_survive_save_and_load() {
    let dir = std::env::temp_dir().join(format!("chromakey-config-{}", uuid::Uuid::new_v4()));
    let path = dir.join("nested").join("config.json");

    let config = Config {
        camera_device: "/dev/video2".into(),
        capture_framerate: 60,
        ..Default::default()
    };
    config.save_to(&path).unwrap();
    assert_eq!(Config::load_from(&path).unwrap(), config);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_partial_settings_file_keeps_defaults() {
    let dir = std::env::temp_dir().join(format!("chromakey-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, r#"{"jpeg_quality": 80}"#).unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.jpeg_quality, 80);
    assert_eq!(config.movie_file_name, "movie.mp4");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_host_request_from_json() {
    let request = HostRequest::from_json(
        r#"{"mode":"video","backgroundMode":"video","backgroundVideo":"/bg/waves.mp4","color":"green","threshold":0.3}"#,
    )
    .unwrap();
    let session = request.parse().unwrap();

    assert_eq!(session.mode, OperationMode::Video);
    assert_eq!(
        session.background,
        BackgroundSource::LoopingVideo(PathBuf::from("/bg/waves.mp4"))
    );
    assert_eq!(session.chroma.key, KeyColor::Green);
    assert_eq!(session.chroma.threshold, 0.3);
    assert_eq!(session.chroma.smoothing, 0.1);
}

#[test]
fn test_malformed_request_is_rejected() {
    assert!(matches!(
        HostRequest::from_json("{\"mode\": 3}"),
        Err(ConfigError::Malformed(_))
    ));
}
