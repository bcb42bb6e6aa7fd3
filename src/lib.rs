// SPDX-License-Identifier: MPL-2.0

//! Camera Capture - a single-camera capture engine
//!
//! Drives a native capture graph (device → sample grabber → discard stage)
//! through its whole lifecycle and exposes the latest frame to polling
//! consumers.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: the `CaptureBackend` abstraction and its implementations
//! - [`capture`]: session state machine, frame grabber, format catalog and
//!   connection monitor
//! - [`config`]: engine configuration handling
//! - [`errors`]: error types shared by the engine
//!
//! # Example
//!
//! ```no_run
//! use camera_capture::backends::camera::{DeviceRef, virtual_camera::VirtualBackend};
//! use camera_capture::capture::{CaptureSession, FrameBuffer};
//! use std::sync::Arc;
//!
//! let session = CaptureSession::new(Arc::new(VirtualBackend::with_demo_devices()));
//! session.open(&DeviceRef::Index(0), None, true)?;
//! session.start()?;
//!
//! let mut frame = FrameBuffer::new();
//! session.frame(&mut frame, false, 0)?;
//! session.close();
//! # Ok::<(), camera_capture::errors::CaptureError>(())
//! ```

pub mod backends;
pub mod capture;
pub mod config;
pub mod constants;
pub mod errors;

// Re-export commonly used types
pub use backends::camera::{CaptureBackend, DeviceRef, VideoFormat};
pub use capture::{CaptureSession, FrameBuffer, SessionState};
pub use config::EngineConfig;
pub use errors::{CaptureError, CaptureResult};
