// SPDX-License-Identifier: GPL-3.0-only

//! Capture session state machine
//!
//! ```text
//! Closed ──open──▶ Opening ──ok──▶ Open ──start──▶ Capturing
//!   ▲                 │              ▲                 │
//!   │                 └──failure─────┼─────────────────┤
//!   │                                └──────stop───────┘
//!   └────────────────────close (any state)────────────────
//! ```
//!
//! The session owns the order of every graph build and teardown step. All
//! state lives behind one mutex inside a shared core so the connection
//! monitor can reach the session from its own thread.

use super::catalog::VideoFormatCatalog;
use super::frame::FrameBuffer;
use super::grabber::{FrameGrabber, GrabberTiming};
use super::graph::CaptureGraph;
use super::monitor::{ConnectionMonitor, MonitorTarget};
use super::properties::PropertyTable;
use crate::backends::camera::{
    BackendError, BackendStep, CameraProperty, CaptureBackend, DeviceDescriptor, DeviceRef,
    MediaType, PropertyInfo, SampleSink, VideoFormat,
};
use crate::config::EngineConfig;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Closed,
    /// Graph assembly in progress
    Opening,
    Open,
    Capturing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Closed => write!(f, "closed"),
            SessionState::Opening => write!(f, "opening"),
            SessionState::Open => write!(f, "open"),
            SessionState::Capturing => write!(f, "capturing"),
        }
    }
}

/// Callback run on the monitor thread when the device is lost
pub type DisconnectionCallback = Arc<dyn Fn() + Send + Sync>;

struct SessionInner {
    state: SessionState,
    graph: CaptureGraph,
    device: Option<DeviceDescriptor>,
    catalog: VideoFormatCatalog,
    current_index: Option<usize>,
    /// Format the device is negotiated to
    native_format: Option<MediaType>,
    /// Format the grabber hands to its callback
    emitted_format: Option<MediaType>,
    prefer_rgb24: bool,
    properties: PropertyTable,
    callback: Option<DisconnectionCallback>,
    monitor: Option<ConnectionMonitor>,
    last_error: String,
}

impl SessionInner {
    fn new() -> Self {
        Self {
            state: SessionState::Closed,
            graph: CaptureGraph::new(),
            device: None,
            catalog: VideoFormatCatalog::new(),
            current_index: None,
            native_format: None,
            emitted_format: None,
            prefer_rgb24: false,
            properties: PropertyTable::new(),
            callback: None,
            monitor: None,
            last_error: String::new(),
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open | SessionState::Capturing)
    }

    fn require_open(&self) -> CaptureResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CaptureError::NotInitialized)
        }
    }

    /// Remember the text of a failed result
    fn record<T>(&mut self, result: CaptureResult<T>) -> CaptureResult<T> {
        if let Err(e) = &result {
            self.last_error = e.to_string();
        }
        result
    }

    fn halt_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            debug!("Signalling connection monitor to stop");
            monitor.detach();
        }
    }
}

fn at(step: BackendStep) -> impl FnOnce(BackendError) -> CaptureError {
    move |source| CaptureError::backend(step.label(), source)
}

struct SessionCore {
    backend: Arc<dyn CaptureBackend>,
    grabber: Arc<FrameGrabber>,
    config: EngineConfig,
    inner: Mutex<SessionInner>,
}

impl SessionCore {
    fn inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(
        &self,
        device: &DeviceRef,
        hint: Option<&VideoFormat>,
        prefer_rgb24: bool,
    ) -> CaptureResult<()> {
        let mut inner = self.inner();
        let result = self.open_locked(&mut inner, device, hint, prefer_rgb24);
        inner.record(result)
    }

    fn open_locked(
        &self,
        inner: &mut SessionInner,
        device: &DeviceRef,
        hint: Option<&VideoFormat>,
        prefer_rgb24: bool,
    ) -> CaptureResult<()> {
        if inner.state != SessionState::Closed {
            warn!(state = %inner.state, "Open called on a session that is not closed");
            return Err(CaptureError::AlreadyOpen);
        }

        info!(device = %device, backend = self.backend.name(), "Opening capture session");
        inner.state = SessionState::Opening;
        inner.prefer_rgb24 = prefer_rgb24;

        match self.build_graph(inner, device, hint) {
            Ok(()) => {
                inner.state = SessionState::Open;
                info!(
                    device = inner.device.as_ref().map(|d| d.friendly_name.as_str()).unwrap_or(""),
                    format = ?inner.emitted_format.map(|m| m.to_string()),
                    index = ?inner.current_index,
                    "Capture session open"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to open capture session, tearing down");
                self.teardown(inner);
                Err(e)
            }
        }
    }

    /// Assemble device → grabber → discard stage
    ///
    /// Every acquired object is stored in `inner.graph` as soon as it exists,
    /// so an early return leaves a graph `teardown` can fully release.
    fn build_graph(
        &self,
        inner: &mut SessionInner,
        device_ref: &DeviceRef,
        hint: Option<&VideoFormat>,
    ) -> CaptureResult<()> {
        let backend = self.backend.as_ref();

        let (device, descriptor) = backend
            .bind_device(device_ref)
            .map_err(at(BackendStep::BindDevice))?;
        inner.graph.device = Some(device);
        debug!(path = %descriptor.path, "Device bound");
        inner.device = Some(descriptor);

        let graph = backend.create_graph().map_err(at(BackendStep::CreateGraph))?;
        inner.graph.graph = Some(graph);

        inner.graph.events = Some(
            backend
                .event_channel(graph)
                .map_err(at(BackendStep::EventChannel))?,
        );
        let control = backend
            .media_control(graph)
            .map_err(at(BackendStep::MediaControl))?;
        inner.graph.media_control = Some(control);

        backend
            .add_source(graph, device)
            .map_err(at(BackendStep::AddSource))?;
        debug!("Source stage added");

        let stream = backend
            .stream_control(graph, device)
            .map_err(at(BackendStep::StreamControl))?;
        inner.graph.stream_control = Some(stream);

        let native = match hint {
            Some(wanted) => {
                inner
                    .catalog
                    .update(backend, stream)
                    .map_err(at(BackendStep::EnumerateFormats))?;
                let index = inner
                    .catalog
                    .index_of(wanted)
                    .ok_or_else(|| CaptureError::FormatNotFound(wanted.to_string()))?;
                let descriptor = inner
                    .catalog
                    .descriptor(index)
                    .cloned()
                    .ok_or(CaptureError::IndexOutOfRange {
                        index,
                        len: inner.catalog.len(),
                    })?;
                backend
                    .set_format(stream, &descriptor)
                    .map_err(at(BackendStep::SetFormat))?;
                debug!(format = %descriptor.media_type, index, "Applied requested format");
                descriptor.media_type
            }
            None => {
                let current = backend
                    .current_format(stream)
                    .map_err(at(BackendStep::ReadFormat))?;
                debug!(format = %current.media_type, "Using device's current format");
                current.media_type
            }
        };
        inner.native_format = Some(native);

        let (stage, grabber) = backend
            .add_grabber(graph)
            .map_err(at(BackendStep::AddGrabber))?;
        inner.graph.grabber_stage = Some(stage);
        inner.graph.grabber = Some(grabber);

        let sink: Arc<dyn SampleSink> = self.grabber.clone();
        backend
            .set_sample_sink(grabber, Some(sink))
            .map_err(at(BackendStep::SetSampleSink))?;
        inner.graph.sink_registered = true;

        let emitted = self.emitted_for(&native, inner.prefer_rgb24);
        backend
            .set_grabber_format(grabber, &emitted)
            .map_err(at(BackendStep::SetGrabberFormat))?;
        self.apply_emitted(inner, emitted);

        let renderer = backend
            .add_null_renderer(graph)
            .map_err(at(BackendStep::AddRenderer))?;
        inner.graph.renderer = Some(renderer);

        backend
            .connect(graph, device, stage, renderer)
            .map_err(at(BackendStep::Connect))?;
        debug!("Graph connected");

        // The chain may not report a connected type yet
        match backend.connected_format(grabber) {
            Ok(connected) if connected.width > 0 && connected.height > 0 => {
                if Some(connected) != inner.emitted_format {
                    debug!(format = %connected, "Grabber negotiated a different output");
                    self.apply_emitted(inner, connected);
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Connected format not available yet"),
        }

        if let Err(e) = inner.properties.refresh(backend, device) {
            warn!(error = %e, "Device reports no property table");
            inner.properties.clear();
        }

        inner
            .catalog
            .update(backend, stream)
            .map_err(at(BackendStep::EnumerateFormats))?;
        let active = backend
            .current_format(stream)
            .map_err(at(BackendStep::ReadFormat))?;
        inner.current_index = inner.catalog.index_of_native(&active);
        if inner.current_index.is_none() {
            warn!(format = %active.media_type, "Active format not found in catalog");
        }

        Ok(())
    }

    /// What the grabber emits for a device format under the RGB policy
    fn emitted_for(&self, native: &MediaType, prefer_rgb24: bool) -> MediaType {
        if prefer_rgb24 && self.backend.converts_to_rgb24(native) {
            native.as_rgb24()
        } else {
            *native
        }
    }

    fn apply_emitted(&self, inner: &mut SessionInner, emitted: MediaType) {
        self.grabber
            .set_buffer_size(emitted.pixel_format, emitted.sample_size);
        inner.emitted_format = Some(emitted);
    }

    /// Release everything and return to `Closed`
    fn teardown(&self, inner: &mut SessionInner) {
        if inner.state == SessionState::Capturing {
            if let Err(e) = self.stop_locked(inner) {
                warn!(error = %e, "Stop during close failed");
            }
        }
        inner.halt_monitor();

        inner.catalog.clear();
        inner.current_index = None;
        inner.graph.teardown(self.backend.as_ref());
        inner.properties.clear();
        inner.device = None;
        inner.native_format = None;
        inner.emitted_format = None;
        self.grabber.reset();
        inner.state = SessionState::Closed;
    }

    fn close(&self) {
        let mut inner = self.inner();
        if inner.state == SessionState::Closed && !inner.graph.holds_objects() {
            return;
        }
        info!("Closing capture session");
        self.teardown(&mut inner);
    }

    fn start(self: &Arc<Self>) -> CaptureResult<()> {
        let mut inner = self.inner();
        let result = self.start_locked(&mut inner);
        inner.record(result)
    }

    fn start_locked(self: &Arc<Self>, inner: &mut SessionInner) -> CaptureResult<()> {
        match inner.state {
            SessionState::Open => {}
            SessionState::Capturing => {
                debug!("Start called while already capturing");
                return Ok(());
            }
            SessionState::Closed | SessionState::Opening => {
                return Err(CaptureError::NotInitialized);
            }
        }

        let (Some(grabber), Some(control), Some(native)) = (
            inner.graph.grabber,
            inner.graph.media_control,
            inner.native_format,
        ) else {
            return Err(CaptureError::NotInitialized);
        };

        let emitted = self.emitted_for(&native, inner.prefer_rgb24);
        self.backend
            .set_grabber_format(grabber, &emitted)
            .map_err(at(BackendStep::SetGrabberFormat))?;
        self.apply_emitted(inner, emitted);

        self.backend.run(control).map_err(|e| {
            error!(error = %e, "Failed to run capture graph");
            CaptureError::backend(BackendStep::Run.label(), e)
        })?;

        inner.state = SessionState::Capturing;
        info!(format = %emitted, "Capture started");
        self.start_monitor(inner);
        Ok(())
    }

    /// Start the monitor if a callback is registered and none is running
    fn start_monitor(self: &Arc<Self>, inner: &mut SessionInner) {
        if inner.callback.is_none() || inner.state != SessionState::Capturing {
            return;
        }
        if let Some(monitor) = &inner.monitor {
            if monitor.is_running() && !monitor.stop_requested() {
                return;
            }
        }

        let target: Weak<dyn MonitorTarget> = Arc::downgrade(self) as Weak<dyn MonitorTarget>;
        match ConnectionMonitor::start(target, self.config.monitor) {
            Ok(monitor) => inner.monitor = Some(monitor),
            Err(e) => warn!(error = %e, "Failed to spawn connection monitor"),
        }
    }

    fn stop(&self) -> CaptureResult<()> {
        let mut inner = self.inner();
        let result = self.stop_locked(&mut inner);
        inner.record(result)
    }

    /// Pause then stop the graph
    ///
    /// The state becomes `Open` even when a backend call fails.
    fn stop_locked(&self, inner: &mut SessionInner) -> CaptureResult<()> {
        match inner.state {
            SessionState::Capturing => {}
            SessionState::Open => return Err(CaptureError::NotCapturing),
            SessionState::Closed | SessionState::Opening => {
                return Err(CaptureError::NotInitialized);
            }
        }

        inner.halt_monitor();

        let mut outcome = Ok(());
        if let Some(control) = inner.graph.media_control {
            if let Err(e) = self.backend.pause(control) {
                warn!(error = %e, "Failed to pause capture graph");
                outcome = Err(CaptureError::backend(BackendStep::Pause.label(), e));
            }
            if let Err(e) = self.backend.stop(control) {
                warn!(error = %e, "Failed to stop capture graph");
                if outcome.is_ok() {
                    outcome = Err(CaptureError::backend(BackendStep::Stop.label(), e));
                }
            }
        }

        inner.state = SessionState::Open;
        info!("Capture stopped");
        outcome
    }

    fn frame(&self, out: &mut FrameBuffer, only_new: bool, last_seen: u64) -> CaptureResult<()> {
        let emitted = {
            let mut inner = self.inner();
            let result = match inner.state {
                SessionState::Capturing => inner.emitted_format.ok_or(CaptureError::NotCapturing),
                SessionState::Open => Err(CaptureError::NotCapturing),
                SessionState::Closed | SessionState::Opening => Err(CaptureError::NotInitialized),
            };
            inner.record(result)?
        };

        out.set_metadata(emitted.width, emitted.height, emitted.pixel_format);
        let result = self.grabber.frame(out, only_new, last_seen);
        if let Err(e) = &result {
            self.inner().last_error = e.to_string();
        }
        result
    }

    fn set_video_format_index(&self, index: usize) -> CaptureResult<()> {
        let mut inner = self.inner();
        let result = self.set_format_locked(&mut inner, index);
        inner.record(result)
    }

    fn set_video_format(&self, format: &VideoFormat) -> CaptureResult<()> {
        let mut inner = self.inner();
        let result = inner.require_open().and_then(|()| {
            inner
                .catalog
                .index_of(format)
                .ok_or_else(|| CaptureError::FormatNotFound(format.to_string()))
        });
        let result = result.and_then(|index| self.set_format_locked(&mut inner, index));
        inner.record(result)
    }

    /// Apply a catalog entry; on failure the previous format stays active
    fn set_format_locked(&self, inner: &mut SessionInner, index: usize) -> CaptureResult<()> {
        inner.require_open()?;
        let len = inner.catalog.len();
        let descriptor = inner
            .catalog
            .descriptor(index)
            .cloned()
            .ok_or(CaptureError::IndexOutOfRange { index, len })?;
        let (Some(stream), Some(grabber)) = (inner.graph.stream_control, inner.graph.grabber)
        else {
            return Err(CaptureError::NotInitialized);
        };

        let previous = inner
            .current_index
            .and_then(|current| inner.catalog.descriptor(current).cloned())
            .or_else(|| self.backend.current_format(stream).ok());

        self.backend
            .set_format(stream, &descriptor)
            .map_err(at(BackendStep::SetFormat))?;

        let native = descriptor.media_type;
        let emitted = self.emitted_for(&native, inner.prefer_rgb24);
        if let Err(e) = self.backend.set_grabber_format(grabber, &emitted) {
            // The device already switched; put it back on the active entry
            match &previous {
                Some(previous) => {
                    if let Err(rollback) = self.backend.set_format(stream, previous) {
                        warn!(error = %rollback, format = %previous.media_type, "Failed to restore previous format");
                    }
                }
                None => warn!("No previous format to restore"),
            }
            return Err(CaptureError::backend(BackendStep::SetGrabberFormat.label(), e));
        }

        inner.native_format = Some(native);
        self.apply_emitted(inner, emitted);
        inner.current_index = Some(index);
        info!(index, format = %native, emitted = %emitted, "Video format changed");
        Ok(())
    }

    fn is_disconnecting(&self) -> bool {
        let inner = self.inner();
        let Some(events) = inner.graph.events else {
            return true;
        };
        match self.backend.poll_disconnect_events(events) {
            Ok(lost) => lost,
            Err(BackendError::Disconnected(_)) => true,
            Err(e) => {
                warn!(error = %e, "Failed to poll graph events");
                false
            }
        }
    }

    fn with_device<T>(
        &self,
        f: impl FnOnce(&mut SessionInner, &dyn CaptureBackend) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        let mut inner = self.inner();
        let result = inner
            .require_open()
            .and_then(|()| f(&mut *inner, self.backend.as_ref()));
        inner.record(result)
    }
}

impl MonitorTarget for SessionCore {
    fn timing(&self) -> GrabberTiming {
        self.grabber.timing_snapshot()
    }

    fn is_disconnecting(&self) -> bool {
        SessionCore::is_disconnecting(self)
    }

    fn device_lost(&self, stop: &AtomicBool) {
        let callback = {
            let inner = self.inner();
            if stop.load(Ordering::SeqCst) || inner.state != SessionState::Capturing {
                return;
            }
            inner.callback.clone()
        };

        if let Some(callback) = callback {
            callback();
        }

        let mut inner = self.inner();
        if stop.load(Ordering::SeqCst) || inner.state != SessionState::Capturing {
            return;
        }
        let result = self.stop_locked(&mut inner);
        if let Err(e) = inner.record(result) {
            warn!(error = %e, "Stopping after device loss failed");
        }
    }
}

/// A single logical camera driven through a capture backend
///
/// All methods take `&self`; the session is safe to share between threads.
/// Dropping the session closes it.
pub struct CaptureSession {
    core: Arc<SessionCore>,
}

impl CaptureSession {
    /// Create a closed session with default settings
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self::with_config(backend, EngineConfig::default())
    }

    /// Create a closed session with the given settings
    pub fn with_config(backend: Arc<dyn CaptureBackend>, config: EngineConfig) -> Self {
        let config = config.validated();
        let grabber = Arc::new(FrameGrabber::new());
        grabber.set_minimum_fps(config.minimum_fps);
        Self {
            core: Arc::new(SessionCore {
                backend,
                grabber,
                config,
                inner: Mutex::new(SessionInner::new()),
            }),
        }
    }

    /// Enumerate the backend's devices
    ///
    /// Each device's formats are deduplicated and sorted by format, then
    /// by decreasing size.
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        enumerate_devices(self.core.backend.as_ref())
    }

    /// Build the capture graph for a device
    ///
    /// On failure the session is `Closed` and holds no backend objects.
    pub fn open(
        &self,
        device: &DeviceRef,
        format: Option<&VideoFormat>,
        prefer_rgb24: bool,
    ) -> CaptureResult<()> {
        self.core.open(device, format, prefer_rgb24)
    }

    /// Run the graph; frames start arriving in the grabber
    pub fn start(&self) -> CaptureResult<()> {
        self.core.start()
    }

    pub fn stop(&self) -> CaptureResult<()> {
        self.core.stop()
    }

    /// Release everything; safe from any state and idempotent
    pub fn close(&self) {
        self.core.close();
    }

    pub fn state(&self) -> SessionState {
        self.core.inner().state
    }

    pub fn is_open(&self) -> bool {
        self.core.inner().is_open()
    }

    pub fn is_capturing(&self) -> bool {
        self.core.inner().state == SessionState::Capturing
    }

    /// Copy the latest frame into `out`
    ///
    /// `out` is described with the current emitted format before the bytes
    /// are copied. With `only_new`, fails with `StaleFrame` if the latest
    /// version equals `last_seen`.
    pub fn frame(&self, out: &mut FrameBuffer, only_new: bool, last_seen: u64) -> CaptureResult<()> {
        self.core.frame(out, only_new, last_seen)
    }

    pub fn fps(&self) -> f64 {
        self.core.grabber.fps()
    }

    pub fn set_minimum_fps(&self, minimum_fps: f64) {
        self.core.grabber.set_minimum_fps(minimum_fps);
    }

    pub fn minimum_fps(&self) -> f64 {
        self.core.grabber.minimum_fps()
    }

    /// The grabber receiving this session's samples
    pub fn grabber(&self) -> Arc<FrameGrabber> {
        Arc::clone(&self.core.grabber)
    }

    /// Formats of the open device, in device order
    pub fn video_formats(&self) -> Vec<VideoFormat> {
        self.core.inner().catalog.formats()
    }

    /// Catalog index of the active format, `None` if it could not be resolved
    pub fn current_video_format_index(&self) -> Option<usize> {
        self.core.inner().current_index
    }

    pub fn current_video_format(&self) -> Option<VideoFormat> {
        let inner = self.core.inner();
        inner
            .current_index
            .and_then(|index| inner.catalog.get(index).copied())
    }

    /// Switch to the catalog entry equal to `format`
    pub fn set_video_format(&self, format: &VideoFormat) -> CaptureResult<()> {
        self.core.set_video_format(format)
    }

    pub fn set_video_format_index(&self, index: usize) -> CaptureResult<()> {
        self.core.set_video_format_index(index)
    }

    /// Format the grabber hands out, which may differ from the device format
    pub fn emitted_format(&self) -> Option<MediaType> {
        self.core.inner().emitted_format
    }

    /// Descriptor of the bound device
    pub fn device(&self) -> Option<DeviceDescriptor> {
        self.core.inner().device.clone()
    }

    /// Register the device-lost callback
    ///
    /// Starts the connection monitor right away when capturing.
    pub fn set_disconnection_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.core.inner();
        inner.callback = Some(Arc::new(callback));
        self.core.start_monitor(&mut inner);
    }

    pub fn clear_disconnection_callback(&self) {
        let mut inner = self.core.inner();
        inner.callback = None;
        inner.halt_monitor();
    }

    /// Drain backend events, true iff the device was lost
    ///
    /// Also true when the session has no graph at all.
    pub fn is_disconnecting(&self) -> bool {
        self.core.is_disconnecting()
    }

    /// Text of the most recent failure
    pub fn last_error(&self) -> String {
        self.core.inner().last_error.clone()
    }

    pub fn refresh_properties(&self) -> CaptureResult<()> {
        self.core.with_device(|inner, backend| {
            let device = inner.graph.device.ok_or(CaptureError::NotInitialized)?;
            inner
                .properties
                .refresh(backend, device)
                .map_err(at(BackendStep::QueryProperties))
        })
    }

    /// Write every property back to its default, optionally in auto mode
    pub fn reset_properties_to_default(&self, as_auto: bool) -> CaptureResult<()> {
        self.core.with_device(|inner, backend| {
            let device = inner.graph.device.ok_or(CaptureError::NotInitialized)?;
            inner
                .properties
                .reset_to_default(backend, device, as_auto)
                .map_err(at(BackendStep::SetProperty))
        })
    }

    pub fn set_property_value(
        &self,
        property: CameraProperty,
        value: i32,
        is_auto: bool,
    ) -> CaptureResult<()> {
        self.core.with_device(|inner, backend| {
            let device = inner.graph.device.ok_or(CaptureError::NotInitialized)?;
            inner
                .properties
                .set_value(backend, device, property, value, is_auto)
                .map_err(at(BackendStep::SetProperty))
        })
    }

    /// Snapshot of the property table, empty when closed
    pub fn properties(&self) -> Vec<PropertyInfo> {
        self.core.inner().properties.entries().to_vec()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.core.close();
    }
}

/// Enumerate a backend's devices with deduplicated, sorted formats
pub fn enumerate_devices(backend: &dyn CaptureBackend) -> Vec<DeviceDescriptor> {
    backend
        .enumerate_devices()
        .into_iter()
        .map(|mut device| {
            device.supported_formats =
                VideoFormatCatalog::dedup_sorted(std::mem::take(&mut device.supported_formats));
            device
        })
        .collect()
}
