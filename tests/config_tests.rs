// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for persisted settings

use capture_coordinator::capture::{DeliveryMode, MirrorMode, PixelFormat, Rotation};
use capture_coordinator::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, NUM_CAPTURE_BUFFERS};
use capture_coordinator::{AppError, Config};
use std::path::PathBuf;

/// Fresh scratch directory per test
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "capture-coordinator-test-{}-{}",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!((config.width, config.height, config.frame_rate), (640, 480, 30));
    assert_eq!(config.pixel_format, PixelFormat::NV21);
    assert_eq!(config.buffer_count, NUM_CAPTURE_BUFFERS);
    assert_eq!(config.delivery_mode, DeliveryMode::Preview);
    assert!(config.device_path.is_none());
}

#[test]
fn test_save_and_load() {
    let dir = scratch_dir("roundtrip");
    let path = dir.join("nested").join("config.json");

    let config = Config {
        width: 1280,
        height: 720,
        pixel_format: PixelFormat::YUYV,
        mirror_mode: MirrorMode::CompensateFrontMirror,
        rotation: Rotation::Rotate90,
        device_path: Some("/dev/video2".to_string()),
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path).unwrap(), config);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = scratch_dir("missing");
    let config = Config::load_from(&dir.join("absent.json")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = scratch_dir("malformed");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(matches!(Config::load_from(&path), Err(AppError::Config(_))));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_default_path_layout() {
    if let Some(path) = Config::path() {
        assert!(path.ends_with(PathBuf::from(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)));
    }
}
