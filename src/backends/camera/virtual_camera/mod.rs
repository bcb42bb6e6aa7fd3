// SPDX-License-Identifier: GPL-3.0-only

//! In-process capture backend with virtual devices
//!
//! Implements the full graph contract against scripted devices that emit
//! test patterns. Besides serving the demo binary it makes the engine's
//! guarantees observable:
//!
//! - `live_objects()` counts every handle not yet released
//! - `inject_failure()` makes one build step fail on demand
//! - `disconnect()` simulates unplugging a device mid-capture
//! - manual delivery (`with_manual_delivery` + `deliver_frame`) replaces
//!   the timed delivery thread for deterministic tests
//!
//! # Architecture
//!
//! ```text
//!  VirtualDevice (formats, properties)
//!        │ bind_device
//!        ▼
//!  graph: source ──▶ grabber stage ──▶ discard stage
//!                        │
//!                        ▼ set_sample_sink
//!                   DeliveryLoop thread ──▶ SampleSink::on_sample
//! ```

mod device;
mod pattern;

pub use device::{VirtualDevice, demo_devices, webcam_properties};

use super::format_converters;
use super::frame_loop::{DeliveryLoop, LoopAction};
use super::types::*;
use super::{CaptureBackend, SampleSink};
use crate::constants::virtual_camera::{DEFAULT_FRAME_DURATION, THREAD_NAME};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Device,
    Graph,
    EventChannel,
    MediaControl,
    StreamControl,
    Stage,
    Grabber,
}

struct BoundDevice {
    /// Position in the backend's device list
    device: usize,
    /// Active entry of the device's format list
    current: usize,
    properties: Vec<PropertyInfo>,
}

#[derive(Default)]
struct GraphState {
    source: Option<u64>,
    stages: Vec<u64>,
    events: VecDeque<GraphEvent>,
    connected: bool,
    running: bool,
    frames: u64,
    delivery: Option<DeliveryLoop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageRole {
    Grabber,
    Renderer,
}

struct Stage {
    graph: u64,
    role: StageRole,
}

struct GrabberSlot {
    graph: u64,
    sink: Option<Arc<dyn SampleSink>>,
    format: Option<MediaType>,
}

#[derive(Default)]
struct VirtualState {
    objects: HashMap<u64, ObjectKind>,
    bound: HashMap<u64, BoundDevice>,
    graphs: HashMap<u64, GraphState>,
    /// Event channels and media controls, by owning graph
    owners: HashMap<u64, u64>,
    /// Stream controls, by device handle
    streams: HashMap<u64, u64>,
    stages: HashMap<u64, Stage>,
    grabbers: HashMap<u64, GrabberSlot>,
    failures: HashSet<BackendStep>,
    disconnected: HashSet<String>,
}

/// What a delivery iteration found for its graph
enum NextSample {
    Gone,
    Idle,
    /// Sink, native type, emitted type, frame number
    Ready(Arc<dyn SampleSink>, MediaType, MediaType, u64),
}

fn lock(state: &Mutex<VirtualState>) -> MutexGuard<'_, VirtualState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend over a fixed list of virtual devices
pub struct VirtualBackend {
    devices: Arc<Vec<VirtualDevice>>,
    state: Arc<Mutex<VirtualState>>,
    next_id: AtomicU64,
    manual: bool,
}

impl VirtualBackend {
    pub fn new(devices: Vec<VirtualDevice>) -> Self {
        Self {
            devices: Arc::new(devices),
            state: Arc::new(Mutex::new(VirtualState::default())),
            next_id: AtomicU64::new(1),
            manual: false,
        }
    }

    /// The YUY2 webcam and the MJPEG camera used by the CLI
    pub fn with_demo_devices() -> Self {
        Self::new(demo_devices())
    }

    /// Deliver samples only through `deliver_frame`
    pub fn with_manual_delivery(mut self) -> Self {
        self.manual = true;
        self
    }

    /// Make every later call of `step` fail
    pub fn inject_failure(&self, step: BackendStep) {
        lock(&self.state).failures.insert(step);
    }

    pub fn clear_failure(&self, step: BackendStep) {
        lock(&self.state).failures.remove(&step);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }

    /// Number of handles handed out and not yet released
    pub fn live_objects(&self) -> usize {
        lock(&self.state).objects.len()
    }

    /// Simulate unplugging a device
    ///
    /// Graphs using it stop delivering and receive `GraphEvent::DeviceLost`.
    /// Returns false for an unknown path.
    pub fn disconnect(&self, path: &str) -> bool {
        let Some(device) = self.devices.iter().position(|d| d.path == path) else {
            return false;
        };
        info!(path, "Virtual device disconnected");
        let mut st = lock(&self.state);
        st.disconnected.insert(path.to_string());
        for graph in Self::graphs_using(&st, device) {
            if let Some(graph) = st.graphs.get_mut(&graph) {
                graph.running = false;
                graph.events.push_back(GraphEvent::DeviceLost);
            }
        }
        true
    }

    /// Make a disconnected device available again
    pub fn reconnect(&self, path: &str) {
        lock(&self.state).disconnected.remove(path);
    }

    /// Queue an event on every graph sourcing the device at `path`
    pub fn push_event(&self, path: &str, event: GraphEvent) {
        let Some(device) = self.devices.iter().position(|d| d.path == path) else {
            return;
        };
        let mut st = lock(&self.state);
        for graph in Self::graphs_using(&st, device) {
            if let Some(graph) = st.graphs.get_mut(&graph) {
                graph.events.push_back(event.clone());
            }
        }
    }

    /// Push one sample to every running graph, returning how many got one
    pub fn deliver_frame(&self) -> usize {
        let graphs: Vec<u64> = lock(&self.state).graphs.keys().copied().collect();
        graphs
            .into_iter()
            .filter(|&graph| deliver_one(&self.state, &self.devices, graph) == Delivery::Delivered)
            .count()
    }

    fn graphs_using(st: &VirtualState, device: usize) -> Vec<u64> {
        st.graphs
            .iter()
            .filter(|(_, g)| {
                g.source
                    .and_then(|source| st.bound.get(&source))
                    .is_some_and(|b| b.device == device)
            })
            .map(|(&id, _)| id)
            .collect()
    }

    fn check(st: &VirtualState, step: BackendStep) -> BackendResult<()> {
        if st.failures.contains(&step) {
            debug!(%step, "Injected failure");
            return Err(BackendError::Call(format!("injected failure: {}", step)));
        }
        Ok(())
    }

    fn register(&self, st: &mut VirtualState, kind: ObjectKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        st.objects.insert(id, kind);
        id
    }

    fn device_of<'a>(&'a self, st: &'a VirtualState, handle: u64) -> BackendResult<(&'a BoundDevice, &'a VirtualDevice)> {
        let bound = st.bound.get(&handle).ok_or(BackendError::InvalidHandle(handle))?;
        let device = self
            .devices
            .get(bound.device)
            .ok_or(BackendError::InvalidHandle(handle))?;
        if st.disconnected.contains(&device.path) {
            return Err(BackendError::Disconnected(device.path.clone()));
        }
        Ok((bound, device))
    }

    fn stream_device<'a>(
        &'a self,
        st: &'a VirtualState,
        stream: StreamControlHandle,
    ) -> BackendResult<(u64, &'a BoundDevice, &'a VirtualDevice)> {
        let handle = *st
            .streams
            .get(&stream.id())
            .ok_or(BackendError::InvalidHandle(stream.id()))?;
        let (bound, device) = self.device_of(st, handle)?;
        Ok((handle, bound, device))
    }

    /// Device format currently feeding a graph
    fn source_format(&self, st: &VirtualState, graph: u64) -> Option<MediaType> {
        let source = st.graphs.get(&graph)?.source?;
        let bound = st.bound.get(&source)?;
        let device = self.devices.get(bound.device)?;
        device.formats().get(bound.current).map(|f| f.media_type)
    }

    fn graph_of_control(st: &VirtualState, control: u64) -> BackendResult<u64> {
        st.owners
            .get(&control)
            .copied()
            .ok_or(BackendError::InvalidHandle(control))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// The graph was released
    Gone,
    Idle,
    Delivered,
}

/// Produce one sample for `graph`; the sink runs outside the state lock
fn deliver_one(state: &Mutex<VirtualState>, devices: &[VirtualDevice], graph: u64) -> Delivery {
    let next = {
        let mut st = lock(state);
        next_sample(&mut st, devices, graph)
    };
    match next {
        NextSample::Gone => Delivery::Gone,
        NextSample::Idle => Delivery::Idle,
        NextSample::Ready(sink, native, emitted, frame_no) => {
            let sample = pattern::render(&native, frame_no);
            let sample = if emitted.pixel_format != native.pixel_format {
                format_converters::to_rgb24(&native, &sample).unwrap_or(sample)
            } else {
                sample
            };
            sink.on_sample(&sample);
            Delivery::Delivered
        }
    }
}

fn next_sample(st: &mut VirtualState, devices: &[VirtualDevice], graph_id: u64) -> NextSample {
    let Some(graph) = st.graphs.get(&graph_id) else {
        return NextSample::Gone;
    };
    if !graph.running || !graph.connected {
        return NextSample::Idle;
    }
    let Some(source) = graph.source.and_then(|s| st.bound.get(&s)) else {
        return NextSample::Idle;
    };
    let Some(device) = devices.get(source.device) else {
        return NextSample::Idle;
    };
    if st.disconnected.contains(&device.path) {
        return NextSample::Idle;
    }
    let Some(native) = device.formats().get(source.current).map(|f| f.media_type) else {
        return NextSample::Idle;
    };

    let grabber = st.grabbers.values().find(|slot| slot.graph == graph_id);
    let Some((sink, format)) = grabber.and_then(|slot| slot.sink.clone().map(|sink| (sink, slot.format)))
    else {
        return NextSample::Idle;
    };
    let emitted = format.unwrap_or(native);

    let Some(graph) = st.graphs.get_mut(&graph_id) else {
        return NextSample::Gone;
    };
    graph.frames += 1;
    NextSample::Ready(sink, native, emitted, graph.frames)
}

impl Drop for VirtualBackend {
    fn drop(&mut self) {
        let deliveries: Vec<DeliveryLoop> = lock(&self.state)
            .graphs
            .values_mut()
            .filter_map(|graph| graph.delivery.take())
            .collect();
        for mut delivery in deliveries {
            delivery.stop();
        }
    }
}

impl CaptureBackend for VirtualBackend {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn enumerate_devices(&self) -> Vec<DeviceDescriptor> {
        let st = lock(&self.state);
        self.devices
            .iter()
            .filter(|d| !st.disconnected.contains(&d.path))
            .map(VirtualDevice::descriptor)
            .collect()
    }

    fn bind_device(&self, device: &DeviceRef) -> BackendResult<(DeviceHandle, DeviceDescriptor)> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::BindDevice)?;

        let index = match device {
            DeviceRef::Index(i) => self
                .devices
                .iter()
                .enumerate()
                .filter(|(_, d)| !st.disconnected.contains(&d.path))
                .nth(*i)
                .map(|(index, _)| index),
            DeviceRef::Path(path) => self
                .devices
                .iter()
                .position(|d| &d.path == path && !st.disconnected.contains(&d.path)),
        }
        .ok_or_else(|| BackendError::DeviceNotFound(device.to_string()))?;

        if st.bound.values().any(|b| b.device == index) {
            return Err(BackendError::Call(format!(
                "device {} is already in use",
                self.devices[index].path
            )));
        }

        let virtual_device = &self.devices[index];
        let id = self.register(&mut st, ObjectKind::Device);
        st.bound.insert(
            id,
            BoundDevice {
                device: index,
                current: virtual_device.default_index(),
                properties: virtual_device.properties().to_vec(),
            },
        );
        debug!(handle = id, path = %virtual_device.path, "Bound virtual device");
        Ok((DeviceHandle(id), virtual_device.descriptor()))
    }

    fn create_graph(&self) -> BackendResult<GraphHandle> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::CreateGraph)?;
        let id = self.register(&mut st, ObjectKind::Graph);
        st.graphs.insert(id, GraphState::default());
        Ok(GraphHandle(id))
    }

    fn event_channel(&self, graph: GraphHandle) -> BackendResult<EventChannelHandle> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::EventChannel)?;
        if !st.graphs.contains_key(&graph.id()) {
            return Err(BackendError::InvalidHandle(graph.id()));
        }
        let id = self.register(&mut st, ObjectKind::EventChannel);
        st.owners.insert(id, graph.id());
        Ok(EventChannelHandle(id))
    }

    fn media_control(&self, graph: GraphHandle) -> BackendResult<MediaControlHandle> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::MediaControl)?;
        if !st.graphs.contains_key(&graph.id()) {
            return Err(BackendError::InvalidHandle(graph.id()));
        }
        let id = self.register(&mut st, ObjectKind::MediaControl);
        st.owners.insert(id, graph.id());
        Ok(MediaControlHandle(id))
    }

    fn add_source(&self, graph: GraphHandle, device: DeviceHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::AddSource)?;
        self.device_of(&st, device.id())?;
        let graph = st
            .graphs
            .get_mut(&graph.id())
            .ok_or(BackendError::InvalidHandle(graph.id()))?;
        graph.source = Some(device.id());
        Ok(())
    }

    fn stream_control(
        &self,
        graph: GraphHandle,
        device: DeviceHandle,
    ) -> BackendResult<StreamControlHandle> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::StreamControl)?;
        let source = st
            .graphs
            .get(&graph.id())
            .ok_or(BackendError::InvalidHandle(graph.id()))?
            .source;
        if source != Some(device.id()) {
            return Err(BackendError::Call(
                "device is not the source of this graph".to_string(),
            ));
        }
        let id = self.register(&mut st, ObjectKind::StreamControl);
        st.streams.insert(id, device.id());
        Ok(StreamControlHandle(id))
    }

    fn stream_formats(&self, stream: StreamControlHandle) -> BackendResult<Vec<FormatDescriptor>> {
        let st = lock(&self.state);
        Self::check(&st, BackendStep::EnumerateFormats)?;
        let (_, _, device) = self.stream_device(&st, stream)?;
        Ok(device.formats().to_vec())
    }

    fn current_format(&self, stream: StreamControlHandle) -> BackendResult<FormatDescriptor> {
        let st = lock(&self.state);
        Self::check(&st, BackendStep::ReadFormat)?;
        let (_, bound, device) = self.stream_device(&st, stream)?;
        device
            .formats()
            .get(bound.current)
            .cloned()
            .ok_or_else(|| BackendError::FormatNotSupported("device reports no formats".to_string()))
    }

    fn set_format(&self, stream: StreamControlHandle, format: &FormatDescriptor) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::SetFormat)?;
        let (handle, _, device) = self.stream_device(&st, stream)?;
        let formats = device.formats();
        let position = formats
            .iter()
            .position(|f| Arc::ptr_eq(f, format))
            .or_else(|| {
                let wanted = VideoFormat::from(&format.media_type);
                formats
                    .iter()
                    .position(|f| VideoFormat::from(&f.media_type) == wanted)
            })
            .ok_or_else(|| BackendError::FormatNotSupported(format.media_type.to_string()))?;

        if let Some(bound) = st.bound.get_mut(&handle) {
            bound.current = position;
        }
        debug!(format = %format.media_type, "Virtual device format set");
        Ok(())
    }

    fn add_grabber(&self, graph: GraphHandle) -> BackendResult<(StageHandle, GrabberHandle)> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::AddGrabber)?;
        if !st.graphs.contains_key(&graph.id()) {
            return Err(BackendError::InvalidHandle(graph.id()));
        }
        let stage = self.register(&mut st, ObjectKind::Stage);
        let grabber = self.register(&mut st, ObjectKind::Grabber);
        st.stages.insert(
            stage,
            Stage {
                graph: graph.id(),
                role: StageRole::Grabber,
            },
        );
        st.grabbers.insert(
            grabber,
            GrabberSlot {
                graph: graph.id(),
                sink: None,
                format: None,
            },
        );
        if let Some(graph) = st.graphs.get_mut(&graph.id()) {
            graph.stages.push(stage);
        }
        Ok((StageHandle(stage), GrabberHandle(grabber)))
    }

    fn set_sample_sink(
        &self,
        grabber: GrabberHandle,
        sink: Option<Arc<dyn SampleSink>>,
    ) -> BackendResult<()> {
        let mut st = lock(&self.state);
        if sink.is_some() {
            Self::check(&st, BackendStep::SetSampleSink)?;
        }
        let slot = st
            .grabbers
            .get_mut(&grabber.id())
            .ok_or(BackendError::InvalidHandle(grabber.id()))?;
        slot.sink = sink;
        Ok(())
    }

    fn set_grabber_format(&self, grabber: GrabberHandle, media: &MediaType) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::SetGrabberFormat)?;
        let graph = st
            .grabbers
            .get(&grabber.id())
            .ok_or(BackendError::InvalidHandle(grabber.id()))?
            .graph;

        if let Some(native) = self.source_format(&st, graph) {
            let passthrough = media.pixel_format == native.pixel_format;
            let converted =
                media.pixel_format == PixelFormat::RGB24 && self.converts_to_rgb24(&native);
            if !passthrough && !converted {
                return Err(BackendError::FormatNotSupported(format!(
                    "cannot emit {} from {}",
                    media.pixel_format, native.pixel_format
                )));
            }
        }

        if let Some(slot) = st.grabbers.get_mut(&grabber.id()) {
            slot.format = Some(*media);
        }
        Ok(())
    }

    fn add_null_renderer(&self, graph: GraphHandle) -> BackendResult<StageHandle> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::AddRenderer)?;
        if !st.graphs.contains_key(&graph.id()) {
            return Err(BackendError::InvalidHandle(graph.id()));
        }
        let stage = self.register(&mut st, ObjectKind::Stage);
        st.stages.insert(
            stage,
            Stage {
                graph: graph.id(),
                role: StageRole::Renderer,
            },
        );
        if let Some(graph) = st.graphs.get_mut(&graph.id()) {
            graph.stages.push(stage);
        }
        Ok(StageHandle(stage))
    }

    fn connect(
        &self,
        graph: GraphHandle,
        source: DeviceHandle,
        grabber: StageHandle,
        renderer: StageHandle,
    ) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::Connect)?;

        let role_of = |stage: StageHandle| {
            st.stages
                .get(&stage.id())
                .filter(|s| s.graph == graph.id())
                .map(|s| s.role)
        };
        if role_of(grabber) != Some(StageRole::Grabber) || role_of(renderer) != Some(StageRole::Renderer) {
            return Err(BackendError::Call("stages do not belong to this graph".to_string()));
        }

        let state = st
            .graphs
            .get_mut(&graph.id())
            .ok_or(BackendError::InvalidHandle(graph.id()))?;
        if state.source != Some(source.id()) {
            return Err(BackendError::Call("source is not part of this graph".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    fn connected_format(&self, grabber: GrabberHandle) -> BackendResult<MediaType> {
        let st = lock(&self.state);
        Self::check(&st, BackendStep::ConnectedFormat)?;
        let slot = st
            .grabbers
            .get(&grabber.id())
            .ok_or(BackendError::InvalidHandle(grabber.id()))?;
        let connected = st.graphs.get(&slot.graph).is_some_and(|g| g.connected);
        if !connected {
            return Err(BackendError::Call("grabber input is not connected".to_string()));
        }
        slot.format
            .or_else(|| self.source_format(&st, slot.graph))
            .ok_or_else(|| BackendError::Call("no media type negotiated".to_string()))
    }

    fn run(&self, control: MediaControlHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::Run)?;
        let graph_id = Self::graph_of_control(&st, control.id())?;

        let period = self
            .source_format(&st, graph_id)
            .and_then(|m| m.framerate)
            .and_then(|f| f.frame_duration())
            .unwrap_or(DEFAULT_FRAME_DURATION);
        let source = st.graphs.get(&graph_id).and_then(|g| g.source);
        if let Some(source) = source {
            self.device_of(&st, source)?;
        }

        let graph = st
            .graphs
            .get_mut(&graph_id)
            .ok_or(BackendError::InvalidHandle(graph_id))?;
        if !graph.connected {
            return Err(BackendError::Call("graph is not connected".to_string()));
        }
        graph.running = true;

        if !self.manual && graph.delivery.is_none() {
            let state = Arc::clone(&self.state);
            let devices = Arc::clone(&self.devices);
            let delivery = DeliveryLoop::start(THREAD_NAME, move || {
                thread::sleep(period);
                match deliver_one(&state, &devices, graph_id) {
                    Delivery::Gone => LoopAction::Stop,
                    Delivery::Idle | Delivery::Delivered => LoopAction::Continue,
                }
            })?;
            graph.delivery = Some(delivery);
        }
        debug!(graph = graph_id, period_ms = period.as_millis() as u64, "Virtual graph running");
        Ok(())
    }

    fn pause(&self, control: MediaControlHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::Pause)?;
        let graph_id = Self::graph_of_control(&st, control.id())?;
        if let Some(graph) = st.graphs.get_mut(&graph_id) {
            graph.running = false;
        }
        Ok(())
    }

    fn stop(&self, control: MediaControlHandle) -> BackendResult<()> {
        let delivery = {
            let mut st = lock(&self.state);
            Self::check(&st, BackendStep::Stop)?;
            let graph_id = Self::graph_of_control(&st, control.id())?;
            st.graphs.get_mut(&graph_id).and_then(|graph| {
                graph.running = false;
                graph.delivery.take()
            })
        };
        // Joined without the state lock; the loop body takes it
        if let Some(mut delivery) = delivery {
            delivery.stop();
        }
        Ok(())
    }

    fn poll_event(&self, events: EventChannelHandle) -> BackendResult<Option<GraphEvent>> {
        let mut st = lock(&self.state);
        let graph_id = Self::graph_of_control(&st, events.id())?;
        Ok(st
            .graphs
            .get_mut(&graph_id)
            .and_then(|graph| graph.events.pop_front()))
    }

    fn remove_downstream(&self, graph: GraphHandle, stage: StageHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        if !st.stages.contains_key(&stage.id()) {
            return Err(BackendError::InvalidHandle(stage.id()));
        }
        let graph = st
            .graphs
            .get_mut(&graph.id())
            .ok_or(BackendError::InvalidHandle(graph.id()))?;
        graph.connected = false;
        graph.running = false;
        Ok(())
    }

    fn release(&self, object: BackendObject) -> BackendResult<()> {
        let delivery = {
            let mut st = lock(&self.state);
            let id = match object {
                BackendObject::Device(h) => h.id(),
                BackendObject::Graph(h) => h.id(),
                BackendObject::EventChannel(h) => h.id(),
                BackendObject::StreamControl(h) => h.id(),
                BackendObject::Stage(h) => h.id(),
                BackendObject::Grabber(h) => h.id(),
                BackendObject::MediaControl(h) => h.id(),
            };
            if st.objects.remove(&id).is_none() {
                debug!(id, "Release of unknown object ignored");
                return Ok(());
            }

            match object {
                BackendObject::Device(_) => {
                    st.bound.remove(&id);
                    None
                }
                BackendObject::Graph(_) => st.graphs.remove(&id).and_then(|mut g| g.delivery.take()),
                BackendObject::EventChannel(_) | BackendObject::MediaControl(_) => {
                    st.owners.remove(&id);
                    None
                }
                BackendObject::StreamControl(_) => {
                    st.streams.remove(&id);
                    None
                }
                BackendObject::Stage(_) => {
                    if let Some(stage) = st.stages.remove(&id) {
                        if let Some(graph) = st.graphs.get_mut(&stage.graph) {
                            graph.stages.retain(|&s| s != id);
                        }
                    }
                    None
                }
                BackendObject::Grabber(_) => {
                    st.grabbers.remove(&id);
                    None
                }
            }
        };

        if let Some(mut delivery) = delivery {
            warn!("Graph released while delivering, stopping delivery");
            delivery.stop();
        }
        Ok(())
    }

    fn query_properties(&self, device: DeviceHandle) -> BackendResult<Vec<PropertyInfo>> {
        let st = lock(&self.state);
        Self::check(&st, BackendStep::QueryProperties)?;
        let (bound, _) = self.device_of(&st, device.id())?;
        Ok(bound.properties.clone())
    }

    fn set_property(
        &self,
        device: DeviceHandle,
        property: CameraProperty,
        value: i32,
        auto: bool,
    ) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::check(&st, BackendStep::SetProperty)?;
        self.device_of(&st, device.id())?;
        let bound = st
            .bound
            .get_mut(&device.id())
            .ok_or(BackendError::InvalidHandle(device.id()))?;
        let entry = bound
            .properties
            .iter_mut()
            .find(|p| p.property == property)
            .ok_or_else(|| BackendError::Call(format!("{} is not supported", property.name())))?;
        if value < entry.minimum || value > entry.maximum {
            return Err(BackendError::Call(format!(
                "{} value {} outside {}..={}",
                property.name(),
                value,
                entry.minimum,
                entry.maximum
            )));
        }
        entry.value = value;
        entry.is_auto = auto && entry.supports_auto;
        Ok(())
    }
}
