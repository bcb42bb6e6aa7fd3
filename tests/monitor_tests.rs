// SPDX-License-Identifier: MPL-2.0

//! Integration tests for device-loss detection

use camera_capture::backends::camera::DeviceRef;
use camera_capture::backends::camera::virtual_camera::VirtualBackend;
use camera_capture::capture::{CaptureSession, SessionState};
use camera_capture::config::{EngineConfig, MonitorConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn fast_config() -> EngineConfig {
    EngineConfig {
        monitor: MonitorConfig {
            poll_interval_ms: 20,
            stale_frame_timeout_ms: 100,
        },
        ..EngineConfig::default()
    }
}

fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_callback_fires_once_on_unplug() {
    let backend = Arc::new(VirtualBackend::with_demo_devices().with_manual_delivery());
    let session = CaptureSession::with_config(backend.clone(), fast_config());
    session
        .open(&DeviceRef::Path("virtual:webcam0".to_string()), None, false)
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    session.set_disconnection_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    session.start().unwrap();
    backend.deliver_frame();

    assert!(backend.disconnect("virtual:webcam0"));
    assert!(wait_for(Duration::from_secs(5), || {
        calls.load(Ordering::SeqCst) == 1 && !session.is_capturing()
    }));

    // Give a leftover monitor a chance to misfire
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Open);

    session.close();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_no_callback_while_frames_flow() {
    let backend = Arc::new(VirtualBackend::with_demo_devices());
    let session = CaptureSession::with_config(backend.clone(), fast_config());
    session
        .open(&DeviceRef::Path("virtual:webcam0".to_string()), None, false)
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    session.set_disconnection_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    session.start().unwrap();

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(session.is_capturing());

    session.stop().unwrap();
    session.close();
}

#[test]
fn test_cleared_callback_is_not_called() {
    let backend = Arc::new(VirtualBackend::with_demo_devices().with_manual_delivery());
    let session = CaptureSession::with_config(backend.clone(), fast_config());
    session
        .open(&DeviceRef::Path("virtual:webcam0".to_string()), None, false)
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    session.set_disconnection_callback(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    session.start().unwrap();
    session.clear_disconnection_callback();

    backend.disconnect("virtual:webcam0");
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Still visible to a direct query
    assert!(session.is_disconnecting());
    assert!(session.is_capturing());
    session.close();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_unplugged_device_cannot_be_reopened() {
    let backend = Arc::new(VirtualBackend::with_demo_devices().with_manual_delivery());
    let session = CaptureSession::new(backend.clone());
    backend.disconnect("virtual:webcam0");

    let device = DeviceRef::Path("virtual:webcam0".to_string());
    assert!(session.open(&device, None, false).is_err());
    assert_eq!(session.devices().len(), 1);

    backend.reconnect("virtual:webcam0");
    session.open(&device, None, false).unwrap();
}
