// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Printing a camera's format catalog
//! - Watching frames arrive until Ctrl+C, a timeout or device loss

use camera_capture::backends::camera::{CaptureBackend, DeviceDescriptor, DeviceRef, MediaType, VideoFormat};
use camera_capture::capture::{CaptureSession, FrameBuffer, enumerate_devices};
use camera_capture::config::EngineConfig;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// List all available cameras
pub fn list_devices(backend: Arc<dyn CaptureBackend>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let devices = enumerate_devices(backend.as_ref());

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({} backend):", backend.name());
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device.friendly_name);
        println!("      Path: {}", device.path);
        if !device.description.is_empty() {
            println!("      {}", device.description);
        }
        for format in &device.supported_formats {
            println!("      {}", format);
        }
        println!();
    }

    Ok(())
}

#[derive(Serialize)]
struct FormatsReport {
    device: Option<DeviceDescriptor>,
    current_index: Option<usize>,
    emitted_format: Option<MediaType>,
    formats: Vec<VideoFormat>,
}

/// Open a camera and print its catalog with the active entry marked
pub fn show_formats(
    backend: Arc<dyn CaptureBackend>,
    config: EngineConfig,
    device: usize,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let prefer_rgb24 = config.prefer_rgb24;
    let session = CaptureSession::with_config(backend, config);
    session.open(&DeviceRef::Index(device), None, prefer_rgb24)?;

    let report = FormatsReport {
        device: session.device(),
        current_index: session.current_video_format_index(),
        emitted_format: session.emitted_format(),
        formats: session.video_formats(),
    };
    session.close();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(device) = &report.device {
        println!("Using camera: {}", device.friendly_name);
    }
    for (index, format) in report.formats.iter().enumerate() {
        let marker = if report.current_index == Some(index) { '*' } else { ' ' };
        println!(" {} [{}] {}", marker, index, format);
    }
    if let Some(emitted) = report.emitted_format {
        println!();
        println!("Grabber output: {}", emitted);
    }

    Ok(())
}

/// Options of the `watch` command
pub struct WatchOptions {
    pub device: usize,
    pub format: Option<usize>,
    pub rgb24: bool,
    pub seconds: Option<u64>,
}

/// Capture until Ctrl+C, the time limit or device loss
pub fn watch(
    backend: Arc<dyn CaptureBackend>,
    config: EngineConfig,
    options: WatchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let prefer_rgb24 = options.rgb24 || config.prefer_rgb24;
    let session = CaptureSession::with_config(backend, config);
    session.open(&DeviceRef::Index(options.device), None, prefer_rgb24)?;
    if let Some(index) = options.format {
        session.set_video_format_index(index)?;
    }

    if let Some(device) = session.device() {
        println!("Using camera: {}", device.friendly_name);
    }
    if let Some(format) = session.current_video_format() {
        println!("Capture format: {}", format);
    }

    let lost = Arc::new(AtomicBool::new(false));
    let lost_flag = lost.clone();
    session.set_disconnection_callback(move || {
        lost_flag.store(true, Ordering::SeqCst);
    });

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    session.start()?;
    if let Some(emitted) = session.emitted_format() {
        println!("Grabber output: {}", emitted);
    }
    println!();
    println!("Capturing... (press Ctrl+C to stop)");

    let start = Instant::now();
    let limit = options.seconds.map(Duration::from_secs);
    let mut frame = FrameBuffer::new();
    let mut last_seen = 0;
    let mut frames = 0u64;
    let mut last_report = Instant::now();

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }
        if lost.load(Ordering::SeqCst) {
            println!();
            println!("Camera disconnected.");
            break;
        }
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            println!();
            break;
        }

        match session.frame(&mut frame, true, last_seen) {
            Ok(()) => {
                last_seen = frame.version();
                frames += 1;
            }
            Err(e) if e.is_no_data() => {}
            Err(e) => {
                // Capture ended underneath us
                println!();
                println!("Capture ended: {}", e);
                break;
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            print!(
                "\rFrame {:>6}  {:>5.1} fps  {}x{}  {} bytes",
                last_seen,
                session.fps(),
                frame.width(),
                frame.height(),
                frame.payload_len()
            );
            std::io::Write::flush(&mut std::io::stdout())?;
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    if session.is_capturing() {
        session.stop()?;
    }
    session.close();
    println!("Frames received: {}", frames);

    Ok(())
}
