// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use camera_capture::config::{EngineConfig, MonitorConfig};
use camera_capture::constants;
use std::path::PathBuf;
use std::time::Duration;

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("camera-capture-tests-{}", std::process::id()))
        .join(name)
}

#[test]
fn test_config_default() {
    let config = EngineConfig::default();

    assert!(!config.prefer_rgb24, "RGB conversion should be opt-in");
    assert_eq!(config.minimum_fps, constants::grabber::DEFAULT_MINIMUM_FPS);
    assert_eq!(config.frame_pump_buffers, constants::graph::DEFAULT_STREAM_BUFFERS);
    assert_eq!(config.monitor.poll_interval(), constants::monitor::POLL_INTERVAL);
    assert_eq!(
        config.monitor.stale_frame_timeout(),
        constants::monitor::STALE_FRAME_TIMEOUT
    );
}

#[test]
fn test_config_round_trip() {
    let path = scratch_file("round_trip/config.json");
    let config = EngineConfig {
        prefer_rgb24: true,
        minimum_fps: 5.0,
        monitor: MonitorConfig {
            poll_interval_ms: 250,
            stale_frame_timeout_ms: 3000,
        },
        frame_pump_buffers: 6,
    };

    config.save_to(&path).unwrap();
    let loaded = EngineConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.monitor.poll_interval(), Duration::from_millis(250));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_config_partial_file_uses_defaults() {
    let path = scratch_file("partial.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "prefer_rgb24": true }"#).unwrap();

    let loaded = EngineConfig::load_from(&path).unwrap();
    assert!(loaded.prefer_rgb24);
    assert_eq!(loaded.monitor, MonitorConfig::default());
    assert_eq!(loaded.frame_pump_buffers, constants::graph::DEFAULT_STREAM_BUFFERS);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_config_missing_file() {
    let path = scratch_file("does-not-exist.json");
    assert!(EngineConfig::load_from(&path).is_err());
}

#[test]
fn test_config_invalid_json() {
    let path = scratch_file("broken.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let err = EngineConfig::load_from(&path).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_config_validation() {
    let config = EngineConfig {
        prefer_rgb24: false,
        minimum_fps: -3.0,
        monitor: MonitorConfig {
            poll_interval_ms: 0,
            stale_frame_timeout_ms: 0,
        },
        frame_pump_buffers: 0,
    }
    .validated();

    assert_eq!(config.minimum_fps, 0.0);
    assert_eq!(config.monitor, MonitorConfig::default());
    assert_eq!(config.frame_pump_buffers, constants::graph::DEFAULT_STREAM_BUFFERS);

    let nan = EngineConfig {
        minimum_fps: f64::NAN,
        ..EngineConfig::default()
    }
    .validated();
    assert_eq!(nan.minimum_fps, 0.0);
}

#[test]
fn test_config_default_path() {
    if let Some(path) = EngineConfig::default_path() {
        assert!(path.ends_with("camera-capture/config.json"));
    }
}
