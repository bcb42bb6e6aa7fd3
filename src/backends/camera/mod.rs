// SPDX-License-Identifier: GPL-3.0-only

//! Capture backend abstraction
//!
//! A backend is the native filter/graph framework the engine drives. It is
//! consumed strictly through this trait so the engine can own the ordering
//! of every build and teardown step.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   CaptureSession    │  ← state machine, build/teardown order
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CaptureBackend Trait│  ← one fallible call per graph step
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!  ┌─────────┐ ┌───────┐
//!  │ Virtual │ │ V4L2  │
//!  └─────────┘ └───────┘
//! ```
//!
//! Build steps are individually fallible. Releasing an object that was
//! already released must be harmless.

pub mod format_converters;
pub mod frame_loop;
pub mod types;
pub mod virtual_camera;

#[cfg(feature = "v4l2")]
pub mod v4l2;
#[cfg(feature = "v4l2")]
pub mod v4l2_controls;

pub use types::*;

use std::sync::Arc;

/// Receiver of samples pushed by a backend's delivery thread
pub trait SampleSink: Send + Sync {
    /// Called once per delivered sample with the sample's payload
    fn on_sample(&self, data: &[u8]);
}

/// Complete capture backend trait
///
/// Every method maps to one step of graph assembly, control or teardown.
pub trait CaptureBackend: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    // ===== Enumeration =====

    /// Enumerate capture devices with the formats they report
    fn enumerate_devices(&self) -> Vec<DeviceDescriptor>;

    /// Bind (take ownership of) a device
    fn bind_device(&self, device: &DeviceRef) -> BackendResult<(DeviceHandle, DeviceDescriptor)>;

    // ===== Graph assembly =====

    /// Instantiate an empty graph container
    fn create_graph(&self) -> BackendResult<GraphHandle>;

    /// Query the graph's event channel
    fn event_channel(&self, graph: GraphHandle) -> BackendResult<EventChannelHandle>;

    /// Query the graph's run/pause/stop control
    fn media_control(&self, graph: GraphHandle) -> BackendResult<MediaControlHandle>;

    /// Attach a bound device to the graph as its source stage
    fn add_source(&self, graph: GraphHandle, device: DeviceHandle) -> BackendResult<()>;

    /// Locate the output stream control interface of the source stage
    fn stream_control(
        &self,
        graph: GraphHandle,
        device: DeviceHandle,
    ) -> BackendResult<StreamControlHandle>;

    /// All formats the stream control can negotiate, in device order
    ///
    /// Repeated calls must return the same `Arc` for the same entry.
    fn stream_formats(&self, stream: StreamControlHandle) -> BackendResult<Vec<FormatDescriptor>>;

    /// The format the device is currently set to
    fn current_format(&self, stream: StreamControlHandle) -> BackendResult<FormatDescriptor>;

    /// Apply one of the descriptors returned by `stream_formats`
    fn set_format(&self, stream: StreamControlHandle, format: &FormatDescriptor)
    -> BackendResult<()>;

    /// Instantiate a grabber stage, returning the stage and its grabber interface
    fn add_grabber(&self, graph: GraphHandle) -> BackendResult<(StageHandle, GrabberHandle)>;

    /// Register (or clear, with `None`) the callback receiving samples
    fn set_sample_sink(
        &self,
        grabber: GrabberHandle,
        sink: Option<Arc<dyn SampleSink>>,
    ) -> BackendResult<()>;

    /// Whether the grabber can emit RGB24 for a source of this type
    fn converts_to_rgb24(&self, source: &MediaType) -> bool {
        source.pixel_format.is_rgb_convertible()
    }

    /// Set the type the grabber emits to its callback
    fn set_grabber_format(&self, grabber: GrabberHandle, media: &MediaType) -> BackendResult<()>;

    /// Instantiate a terminating stage that discards samples
    fn add_null_renderer(&self, graph: GraphHandle) -> BackendResult<StageHandle>;

    /// Connect source → grabber → discard stage
    fn connect(
        &self,
        graph: GraphHandle,
        source: DeviceHandle,
        grabber: StageHandle,
        renderer: StageHandle,
    ) -> BackendResult<()>;

    /// The type actually negotiated on the grabber's input
    fn connected_format(&self, grabber: GrabberHandle) -> BackendResult<MediaType>;

    // ===== Control =====

    fn run(&self, control: MediaControlHandle) -> BackendResult<()>;

    fn pause(&self, control: MediaControlHandle) -> BackendResult<()>;

    fn stop(&self, control: MediaControlHandle) -> BackendResult<()>;

    /// Take the next pending graph event, if any
    fn poll_event(&self, events: EventChannelHandle) -> BackendResult<Option<GraphEvent>>;

    /// Drain all pending events, reporting whether the device was lost
    fn poll_disconnect_events(&self, events: EventChannelHandle) -> BackendResult<bool> {
        let mut lost = false;
        while let Some(event) = self.poll_event(events)? {
            if event == GraphEvent::DeviceLost {
                lost = true;
            }
        }
        Ok(lost)
    }

    // ===== Teardown =====

    /// Disconnect and remove every stage downstream of `stage`
    fn remove_downstream(&self, graph: GraphHandle, stage: StageHandle) -> BackendResult<()>;

    /// Release one object
    fn release(&self, object: BackendObject) -> BackendResult<()>;

    // ===== Properties =====

    /// Read the device's property table
    fn query_properties(&self, device: DeviceHandle) -> BackendResult<Vec<PropertyInfo>>;

    /// Write one property
    fn set_property(
        &self,
        device: DeviceHandle,
        property: CameraProperty,
        value: i32,
        auto: bool,
    ) -> BackendResult<()>;
}

/// Available backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraBackendType {
    /// In-process virtual devices
    #[default]
    Virtual,
    /// Video4Linux2 devices
    V4l2,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::Virtual => write!(f, "virtual"),
            CameraBackendType::V4l2 => write!(f, "v4l2"),
        }
    }
}

/// Get a concrete backend instance for a backend type
///
/// `stream_buffers` is the number of buffers streaming backends queue.
pub fn get_backend_for_type(
    backend_type: CameraBackendType,
    stream_buffers: u32,
) -> BackendResult<Arc<dyn CaptureBackend>> {
    match backend_type {
        CameraBackendType::Virtual => Ok(Arc::new(virtual_camera::VirtualBackend::with_demo_devices())),
        #[cfg(feature = "v4l2")]
        CameraBackendType::V4l2 => Ok(Arc::new(v4l2::V4l2Backend::with_buffer_count(stream_buffers))),
        #[cfg(not(feature = "v4l2"))]
        CameraBackendType::V4l2 => {
            let _ = stream_buffers;
            Err(BackendError::NotAvailable(
                "built without the v4l2 feature".to_string(),
            ))
        }
    }
}
