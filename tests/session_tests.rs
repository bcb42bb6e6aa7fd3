// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the capture session lifecycle

use camera_capture::backends::camera::virtual_camera::VirtualBackend;
use camera_capture::backends::camera::{
    BackendStep, CameraProperty, DeviceRef, GraphEvent, PixelFormat, VideoFormat,
};
use camera_capture::capture::{CaptureSession, FrameBuffer, SessionState};
use camera_capture::errors::CaptureError;
use std::sync::Arc;

fn manual_backend() -> Arc<VirtualBackend> {
    Arc::new(VirtualBackend::with_demo_devices().with_manual_delivery())
}

fn webcam() -> DeviceRef {
    DeviceRef::Path("virtual:webcam0".to_string())
}

fn mjpeg_camera() -> DeviceRef {
    DeviceRef::Path("virtual:mjpeg0".to_string())
}

#[test]
fn test_open_close_releases_everything() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());

    for _ in 0..3 {
        session.open(&webcam(), None, false).unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(backend.live_objects(), 8);

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(backend.live_objects(), 0);
    }

    // Closing twice is harmless
    session.close();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_drop_closes_session() {
    let backend = manual_backend();
    {
        let session = CaptureSession::new(backend.clone());
        session.open(&webcam(), None, false).unwrap();
        session.start().unwrap();
    }
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_failed_build_step_leaves_nothing_behind() {
    let fatal = [
        BackendStep::BindDevice,
        BackendStep::CreateGraph,
        BackendStep::EventChannel,
        BackendStep::MediaControl,
        BackendStep::AddSource,
        BackendStep::StreamControl,
        BackendStep::ReadFormat,
        BackendStep::AddGrabber,
        BackendStep::SetSampleSink,
        BackendStep::SetGrabberFormat,
        BackendStep::AddRenderer,
        BackendStep::Connect,
        BackendStep::EnumerateFormats,
    ];

    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    for step in fatal {
        backend.inject_failure(step);
        let result = session.open(&webcam(), None, false);
        assert!(result.is_err(), "open should fail at {}", step.label());
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(backend.live_objects(), 0, "leak after failing {}", step.label());
        assert!(session.last_error().contains(step.label()));
        assert!(session.video_formats().is_empty());
        assert!(session.device().is_none());
        backend.clear_failures();
    }

    // The device is free again afterwards
    session.open(&webcam(), None, false).unwrap();
    session.close();
}

#[test]
fn test_optional_build_steps_do_not_fail_open() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());

    backend.inject_failure(BackendStep::ConnectedFormat);
    backend.inject_failure(BackendStep::QueryProperties);
    session.open(&webcam(), None, false).unwrap();

    assert!(session.properties().is_empty());
    assert_eq!(session.current_video_format_index(), Some(1));
    session.close();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_operations_on_closed_session() {
    let session = CaptureSession::new(manual_backend());

    let err = session.stop().unwrap_err();
    assert!(matches!(err, CaptureError::NotInitialized));
    assert_eq!(session.last_error(), "not initialized");

    assert!(session.start().is_err());
    let mut frame = FrameBuffer::new();
    assert!(matches!(
        session.frame(&mut frame, false, 0),
        Err(CaptureError::NotInitialized)
    ));
    assert!(session.set_video_format_index(0).is_err());
    assert!(session.video_formats().is_empty());
    assert!(session.current_video_format_index().is_none());
    assert!(session.is_disconnecting());
}

#[test]
fn test_open_twice_keeps_first_graph() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();

    let err = session.open(&mjpeg_camera(), None, false).unwrap_err();
    assert!(matches!(err, CaptureError::AlreadyOpen));
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.device().unwrap().path, "virtual:webcam0");
    assert_eq!(backend.live_objects(), 8);
}

#[test]
fn test_open_uses_device_default_format() {
    let session = CaptureSession::new(manual_backend());
    session.open(&webcam(), None, false).unwrap();

    assert_eq!(session.video_formats().len(), 2);
    assert_eq!(session.current_video_format_index(), Some(1));
    let current = session.current_video_format().unwrap();
    assert_eq!(current.pixel_format, PixelFormat::YUYV);
    assert_eq!((current.width, current.height), (640, 480));

    let emitted = session.emitted_format().unwrap();
    assert_eq!(emitted.pixel_format, PixelFormat::YUYV);
    assert_eq!(emitted.sample_size, 640 * 480 * 2);
}

#[test]
fn test_open_with_format_hint() {
    let session = CaptureSession::new(manual_backend());
    let hint = VideoFormat::new(PixelFormat::YUYV, 1280, 720, 0);
    session.open(&webcam(), Some(&hint), false).unwrap();

    assert_eq!(session.current_video_format_index(), Some(0));
    assert_eq!(session.current_video_format(), Some(hint));
}

#[test]
fn test_open_with_unknown_format_hint() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    let hint = VideoFormat::new(PixelFormat::NV12, 1920, 1080, 0);

    let err = session.open(&webcam(), Some(&hint), false).unwrap_err();
    assert!(matches!(err, CaptureError::FormatNotFound(_)));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn test_rgb24_preference() {
    let session = CaptureSession::new(manual_backend());
    session.open(&webcam(), None, true).unwrap();

    let emitted = session.emitted_format().unwrap();
    assert_eq!(emitted.pixel_format, PixelFormat::RGB24);
    assert_eq!(emitted.sample_size, 640 * 480 * 3);
    // The catalog still describes the device format
    assert_eq!(
        session.current_video_format().unwrap().pixel_format,
        PixelFormat::YUYV
    );
}

#[test]
fn test_compressed_format_passes_through() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&mjpeg_camera(), None, true).unwrap();

    let emitted = session.emitted_format().unwrap();
    assert_eq!(emitted.pixel_format, PixelFormat::MJPEG);
    assert_eq!(emitted.sample_size, 1280 * 720 * 2);
    assert_eq!(session.grabber().buffer_size(), 1280 * 720 * 2);

    session.start().unwrap();
    assert_eq!(backend.deliver_frame(), 1);

    let mut frame = FrameBuffer::new();
    session.frame(&mut frame, false, 0).unwrap();
    assert_eq!(frame.size(), 1280 * 720 * 2);
    assert!(frame.payload_len() <= frame.size());
    assert!(frame.data()[frame.payload_len()..].iter().all(|&b| b == 0));
}

#[test]
fn test_frame_versions() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();

    let mut frame = FrameBuffer::new();
    assert!(matches!(
        session.frame(&mut frame, false, 0),
        Err(CaptureError::NotCapturing)
    ));

    session.start().unwrap();
    assert!(session.is_capturing());
    assert!(matches!(
        session.frame(&mut frame, false, 0),
        Err(CaptureError::NoFrame)
    ));

    assert_eq!(backend.deliver_frame(), 1);
    session.frame(&mut frame, false, 0).unwrap();
    assert_eq!(frame.version(), 1);
    assert_eq!((frame.width(), frame.height()), (640, 480));
    assert_eq!(frame.pixel_format(), Some(PixelFormat::YUYV));
    assert_eq!(frame.size(), 640 * 480 * 2);

    let err = session.frame(&mut frame, true, 1).unwrap_err();
    assert!(matches!(err, CaptureError::StaleFrame));
    assert_eq!(session.last_error(), err.to_string());

    backend.deliver_frame();
    session.frame(&mut frame, true, 1).unwrap();
    assert_eq!(frame.version(), 2);
}

#[test]
fn test_start_twice_and_stop() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();

    session.start().unwrap();
    session.start().unwrap();
    assert!(session.is_capturing());

    session.stop().unwrap();
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(backend.deliver_frame(), 0);
    assert!(matches!(session.stop(), Err(CaptureError::NotCapturing)));

    // Restart after stop
    session.start().unwrap();
    assert_eq!(backend.deliver_frame(), 1);
}

#[test]
fn test_failed_run_keeps_session_open() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();

    backend.inject_failure(BackendStep::Run);
    assert!(session.start().is_err());
    assert_eq!(session.state(), SessionState::Open);
    assert!(session.last_error().contains(BackendStep::Run.label()));

    backend.clear_failure(BackendStep::Run);
    session.start().unwrap();
}

#[test]
fn test_failed_stop_still_leaves_capture() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();
    session.start().unwrap();

    backend.inject_failure(BackendStep::Pause);
    assert!(session.stop().is_err());
    assert_eq!(session.state(), SessionState::Open);
}

#[test]
fn test_switch_format_by_index() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();
    session.start().unwrap();
    backend.deliver_frame();

    session.set_video_format_index(0).unwrap();
    assert_eq!(session.current_video_format_index(), Some(0));
    assert_eq!(session.emitted_format().unwrap().sample_size, 1280 * 720 * 2);

    // The old frame is gone with the old buffer
    let mut frame = FrameBuffer::new();
    assert!(matches!(
        session.frame(&mut frame, false, 0),
        Err(CaptureError::NoFrame)
    ));

    backend.deliver_frame();
    session.frame(&mut frame, false, 0).unwrap();
    assert_eq!(frame.size(), 1280 * 720 * 2);
    assert_eq!((frame.width(), frame.height()), (1280, 720));
}

#[test]
fn test_switch_format_by_value() {
    let session = CaptureSession::new(manual_backend());
    session.open(&webcam(), None, false).unwrap();

    // Size is not part of the comparison
    let wanted = VideoFormat::new(PixelFormat::YUYV, 1280, 720, 1);
    session.set_video_format(&wanted).unwrap();
    assert_eq!(session.current_video_format_index(), Some(0));

    let missing = VideoFormat::new(PixelFormat::MJPEG, 1280, 720, 0);
    assert!(matches!(
        session.set_video_format(&missing),
        Err(CaptureError::FormatNotFound(_))
    ));
    assert_eq!(session.current_video_format_index(), Some(0));
}

#[test]
fn test_switch_format_out_of_range() {
    let session = CaptureSession::new(manual_backend());
    session.open(&webcam(), None, false).unwrap();

    let err = session.set_video_format_index(5).unwrap_err();
    assert!(matches!(err, CaptureError::IndexOutOfRange { index: 5, len: 2 }));
    assert_eq!(session.current_video_format_index(), Some(1));
}

#[test]
fn test_failed_format_switch_keeps_previous() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();

    backend.inject_failure(BackendStep::SetFormat);
    assert!(session.set_video_format_index(0).is_err());
    assert_eq!(session.current_video_format_index(), Some(1));
    assert_eq!(session.emitted_format().unwrap().width, 640);
}

#[test]
fn test_grabber_failure_restores_device_format() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();

    backend.inject_failure(BackendStep::SetGrabberFormat);
    assert!(session.set_video_format_index(0).is_err());
    backend.clear_failures();
    assert_eq!(session.current_video_format_index(), Some(1));

    // Samples must still match the reported 640x480 format
    session.start().unwrap();
    backend.deliver_frame();
    let mut frame = FrameBuffer::new();
    session.frame(&mut frame, false, 0).unwrap();
    assert_eq!((frame.width(), frame.height()), (640, 480));
    assert_eq!(frame.size(), 640 * 480 * 2);
    assert_eq!(frame.payload_len(), 640 * 480 * 2);
    assert_eq!(session.grabber().resize_count(), 0);
}

#[test]
fn test_only_device_lost_counts_as_disconnect() {
    let backend = manual_backend();
    let session = CaptureSession::new(backend.clone());
    session.open(&webcam(), None, false).unwrap();
    session.start().unwrap();

    backend.push_event("virtual:webcam0", GraphEvent::Complete);
    assert!(!session.is_disconnecting());

    backend.push_event("virtual:webcam0", GraphEvent::Other(7));
    backend.push_event("virtual:webcam0", GraphEvent::DeviceLost);
    assert!(session.is_disconnecting());

    // Events are drained once read
    assert!(!session.is_disconnecting());
}

#[test]
fn test_properties_need_open_session() {
    let session = CaptureSession::new(manual_backend());

    assert!(session.properties().is_empty());
    assert!(matches!(
        session.refresh_properties(),
        Err(CaptureError::NotInitialized)
    ));
    assert!(session
        .set_property_value(CameraProperty::Brightness, 10, false)
        .is_err());
    assert!(session.reset_properties_to_default(false).is_err());
}

#[test]
fn test_property_writes_are_clamped() {
    let session = CaptureSession::new(manual_backend());
    session.open(&webcam(), None, false).unwrap();
    assert_eq!(session.properties().len(), 9);

    session
        .set_property_value(CameraProperty::Brightness, 1000, false)
        .unwrap();
    let brightness = |session: &CaptureSession| {
        session
            .properties()
            .into_iter()
            .find(|p| p.property == CameraProperty::Brightness)
            .unwrap()
    };
    assert_eq!(brightness(&session).value, 64);

    session.reset_properties_to_default(false).unwrap();
    assert_eq!(brightness(&session).value, 0);

    session.refresh_properties().unwrap();
    assert_eq!(brightness(&session).value, 0);

    session.close();
    assert!(session.properties().is_empty());
}

#[test]
fn test_device_enumeration() {
    let session = CaptureSession::new(manual_backend());
    let devices = session.devices();

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].path, "virtual:webcam0");
    let sizes: Vec<(u32, u32)> = devices[0]
        .supported_formats
        .iter()
        .map(|f| (f.width, f.height))
        .collect();
    // Largest first within a pixel format
    assert_eq!(sizes, vec![(1280, 720), (640, 480)]);
}

#[test]
fn test_open_by_index() {
    let session = CaptureSession::new(manual_backend());
    session.open(&DeviceRef::Index(1), None, false).unwrap();
    assert_eq!(session.device().unwrap().path, "virtual:mjpeg0");

    let other = CaptureSession::new(manual_backend());
    assert!(other.open(&DeviceRef::Index(7), None, false).is_err());
    assert_eq!(other.state(), SessionState::Closed);
}
