// SPDX-License-Identifier: GPL-3.0-only

//! Capture engine
//!
//! - [`session`]: the `CaptureSession` state machine and graph build order
//! - [`grabber`]: single-slot frame store fed by the backend's callback
//! - [`catalog`]: the device's negotiable formats
//! - [`graph`]: backend objects held by an open session
//! - [`properties`]: camera property table
//! - [`monitor`]: background device-loss detection

pub mod catalog;
pub mod frame;
pub mod grabber;
pub mod graph;
pub mod monitor;
pub mod properties;
pub mod session;

pub use catalog::{CatalogEntry, VideoFormatCatalog};
pub use frame::FrameBuffer;
pub use grabber::{FrameGrabber, GrabberTiming};
pub use monitor::{ConnectionMonitor, MonitorTarget};
pub use properties::PropertyTable;
pub use session::{CaptureSession, DisconnectionCallback, SessionState, enumerate_devices};
