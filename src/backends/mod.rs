// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! # Modules
//!
//! - [`camera`]: the `CaptureBackend` trait, the virtual backend and the
//!   optional V4L2 backend

pub mod camera;
