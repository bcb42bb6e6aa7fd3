// SPDX-License-Identifier: GPL-3.0-only

//! Video4Linux2 capture backend
//!
//! Maps the graph contract onto a V4L2 device node:
//!
//! - the bound device is an open node plus its cached format list
//! - the source → grabber → discard chain is bookkeeping only
//! - `run` starts an mmap stream on a delivery thread that converts to
//!   RGB24 when the grabber asks for it and pushes every sample to the sink
//! - `ENODEV` while dequeuing, or the node vanishing, posts
//!   `GraphEvent::DeviceLost`

mod formats;

pub use formats::{DeviceFormat, device_formats, probe, video_nodes};

use super::format_converters;
use super::frame_loop::{DeliveryLoop, LoopAction};
use super::types::*;
use super::v4l2_controls;
use super::{CaptureBackend, SampleSink};
use crate::constants::graph::DEFAULT_STREAM_BUFFERS;
use crate::constants::v4l2::{MAX_CONSECUTIVE_ERRORS, THREAD_NAME};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Device, Format};

struct BoundDevice {
    path: String,
    device: Device,
    /// Separate descriptor for control ioctls
    controls: File,
    formats: Vec<DeviceFormat>,
    current: usize,
}

#[derive(Default)]
struct GraphState {
    source: Option<u64>,
    stages: Vec<u64>,
    events: VecDeque<GraphEvent>,
    connected: bool,
    running: bool,
    lost_reported: bool,
    delivery: Option<DeliveryLoop>,
}

struct GrabberSlot {
    graph: u64,
    sink: Option<Arc<dyn SampleSink>>,
    format: Option<MediaType>,
}

#[derive(Default)]
struct V4l2State {
    objects: HashMap<u64, &'static str>,
    bound: HashMap<u64, BoundDevice>,
    graphs: HashMap<u64, GraphState>,
    owners: HashMap<u64, u64>,
    streams: HashMap<u64, u64>,
    /// Stage handle to owning graph
    stages: HashMap<u64, u64>,
    grabbers: HashMap<u64, GrabberSlot>,
}

fn lock(state: &Mutex<V4l2State>) -> MutexGuard<'_, V4l2State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend over the system's `/dev/video*` nodes
pub struct V4l2Backend {
    state: Arc<Mutex<V4l2State>>,
    next_id: AtomicU64,
    buffer_count: u32,
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2Backend {
    pub fn new() -> Self {
        Self::with_buffer_count(DEFAULT_STREAM_BUFFERS)
    }

    /// Queue `buffer_count` mmap buffers per stream
    pub fn with_buffer_count(buffer_count: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(V4l2State::default())),
            next_id: AtomicU64::new(1),
            buffer_count: buffer_count.max(1),
        }
    }

    fn register(&self, st: &mut V4l2State, kind: &'static str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        st.objects.insert(id, kind);
        id
    }

    fn bound(st: &V4l2State, handle: u64) -> BackendResult<&BoundDevice> {
        st.bound.get(&handle).ok_or(BackendError::InvalidHandle(handle))
    }

    fn stream_device(st: &V4l2State, stream: StreamControlHandle) -> BackendResult<u64> {
        st.streams
            .get(&stream.id())
            .copied()
            .ok_or(BackendError::InvalidHandle(stream.id()))
    }

    fn graph_of_control(st: &V4l2State, control: u64) -> BackendResult<u64> {
        st.owners
            .get(&control)
            .copied()
            .ok_or(BackendError::InvalidHandle(control))
    }

    fn ensure_graph(st: &V4l2State, graph: GraphHandle) -> BackendResult<()> {
        if st.graphs.contains_key(&graph.id()) {
            Ok(())
        } else {
            Err(BackendError::InvalidHandle(graph.id()))
        }
    }

    fn source_format(st: &V4l2State, graph: u64) -> Option<MediaType> {
        let source = st.graphs.get(&graph)?.source?;
        let bound = st.bound.get(&source)?;
        bound
            .formats
            .get(bound.current)
            .map(|f| f.descriptor.media_type)
    }
}

/// Post `event` to a graph and stop its delivery
fn abort_graph(state: &Mutex<V4l2State>, graph_id: u64, event: GraphEvent) {
    let mut st = lock(state);
    if let Some(graph) = st.graphs.get_mut(&graph_id) {
        graph.running = false;
        if event == GraphEvent::DeviceLost {
            graph.lost_reported = true;
        }
        graph.events.push_back(event);
    }
}

/// Delivery thread body for one graph
fn delivery_loop(
    state: Arc<Mutex<V4l2State>>,
    graph_id: u64,
    native: MediaType,
    mut stream: MmapStream<'static>,
) -> impl FnMut() -> LoopAction + Send + 'static {
    let mut failures = 0u32;

    move || {
        let sample = match stream.next() {
            Ok((buf, meta)) => {
                failures = 0;
                let used = (meta.bytesused as usize).min(buf.len());
                if used == 0 { buf } else { &buf[..used] }
            }
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                error!(graph = graph_id, "V4L2 device lost while streaming");
                abort_graph(&state, graph_id, GraphEvent::DeviceLost);
                return LoopAction::Stop;
            }
            Err(e) => {
                failures += 1;
                warn!(graph = graph_id, error = %e, failures, "Failed to dequeue V4L2 buffer");
                if failures >= MAX_CONSECUTIVE_ERRORS {
                    abort_graph(&state, graph_id, GraphEvent::ErrorAbort(e.to_string()));
                    return LoopAction::Stop;
                }
                return LoopAction::Continue;
            }
        };

        let target = {
            let st = lock(&state);
            let Some(graph) = st.graphs.get(&graph_id) else {
                return LoopAction::Stop;
            };
            if !graph.running {
                None
            } else {
                st.grabbers
                    .values()
                    .find(|slot| slot.graph == graph_id)
                    .and_then(|slot| slot.sink.clone().map(|sink| (sink, slot.format)))
            }
        };

        // Sink runs outside the state lock
        if let Some((sink, format)) = target {
            let emitted = format.unwrap_or(native);
            if emitted.pixel_format != native.pixel_format {
                match format_converters::to_rgb24(&native, sample) {
                    Some(rgb) => sink.on_sample(&rgb),
                    None => sink.on_sample(sample),
                }
            } else {
                sink.on_sample(sample);
            }
        }
        LoopAction::Continue
    }
}

impl Drop for V4l2Backend {
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

impl CaptureBackend for V4l2Backend {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn enumerate_devices(&self) -> Vec<DeviceDescriptor> {
        video_nodes()
            .iter()
            .filter_map(|path| probe(path))
            .map(|(descriptor, _)| descriptor)
            .collect()
    }

    fn bind_device(&self, device: &DeviceRef) -> BackendResult<(DeviceHandle, DeviceDescriptor)> {
        let (descriptor, formats) = match device {
            DeviceRef::Index(i) => video_nodes().iter().filter_map(|path| probe(path)).nth(*i),
            DeviceRef::Path(path) => probe(Path::new(path)),
        }
        .ok_or_else(|| BackendError::DeviceNotFound(device.to_string()))?;

        let mut st = lock(&self.state);
        if st.bound.values().any(|b| b.path == descriptor.path) {
            return Err(BackendError::Call(format!(
                "device {} is already in use",
                descriptor.path
            )));
        }

        let dev = Device::with_path(&descriptor.path)?;
        let controls = File::options().read(true).write(true).open(&descriptor.path)?;
        let current = match dev.format() {
            Ok(active) => formats
                .iter()
                .position(|f| {
                    f.fourcc == active.fourcc
                        && f.descriptor.media_type.width == active.width
                        && f.descriptor.media_type.height == active.height
                })
                .unwrap_or(0),
            Err(e) => {
                warn!(path = %descriptor.path, error = %e, "Failed to read active format");
                0
            }
        };

        let id = self.register(&mut st, "device");
        st.bound.insert(
            id,
            BoundDevice {
                path: descriptor.path.clone(),
                device: dev,
                controls,
                formats,
                current,
            },
        );
        info!(handle = id, path = %descriptor.path, name = %descriptor.friendly_name, "Bound V4L2 device");
        Ok((DeviceHandle(id), descriptor))
    }

    fn create_graph(&self) -> BackendResult<GraphHandle> {
        let mut st = lock(&self.state);
        let id = self.register(&mut st, "graph");
        st.graphs.insert(id, GraphState::default());
        Ok(GraphHandle(id))
    }

    fn event_channel(&self, graph: GraphHandle) -> BackendResult<EventChannelHandle> {
        let mut st = lock(&self.state);
        Self::ensure_graph(&st, graph)?;
        let id = self.register(&mut st, "event channel");
        st.owners.insert(id, graph.id());
        Ok(EventChannelHandle(id))
    }

    fn media_control(&self, graph: GraphHandle) -> BackendResult<MediaControlHandle> {
        let mut st = lock(&self.state);
        Self::ensure_graph(&st, graph)?;
        let id = self.register(&mut st, "media control");
        st.owners.insert(id, graph.id());
        Ok(MediaControlHandle(id))
    }

    fn add_source(&self, graph: GraphHandle, device: DeviceHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        Self::bound(&st, device.id())?;
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
        let id = self.register(&mut st, "stream control");
        st.streams.insert(id, device.id());
        Ok(StreamControlHandle(id))
    }

    fn stream_formats(&self, stream: StreamControlHandle) -> BackendResult<Vec<FormatDescriptor>> {
        let st = lock(&self.state);
        let bound = Self::bound(&st, Self::stream_device(&st, stream)?)?;
        Ok(bound.formats.iter().map(|f| Arc::clone(&f.descriptor)).collect())
    }

    fn current_format(&self, stream: StreamControlHandle) -> BackendResult<FormatDescriptor> {
        let st = lock(&self.state);
        let bound = Self::bound(&st, Self::stream_device(&st, stream)?)?;
        bound
            .formats
            .get(bound.current)
            .map(|f| Arc::clone(&f.descriptor))
            .ok_or_else(|| BackendError::FormatNotSupported("device reports no formats".to_string()))
    }

    fn set_format(&self, stream: StreamControlHandle, format: &FormatDescriptor) -> BackendResult<()> {
        let mut st = lock(&self.state);
        let handle = Self::stream_device(&st, stream)?;
        let bound = st
            .bound
            .get_mut(&handle)
            .ok_or(BackendError::InvalidHandle(handle))?;

        let wanted = VideoFormat::from(&format.media_type);
        let position = bound
            .formats
            .iter()
            .position(|f| Arc::ptr_eq(&f.descriptor, format))
            .or_else(|| {
                bound
                    .formats
                    .iter()
                    .position(|f| VideoFormat::from(&f.descriptor.media_type) == wanted)
            })
            .ok_or_else(|| BackendError::FormatNotSupported(format.media_type.to_string()))?;

        let entry = &bound.formats[position];
        let media = entry.descriptor.media_type;
        let requested = Format::new(media.width, media.height, entry.fourcc);
        let applied = bound.device.set_format(&requested)?;
        if applied.width != media.width || applied.height != media.height || applied.fourcc != entry.fourcc {
            return Err(BackendError::FormatNotSupported(format!(
                "driver chose {}x{} {} instead of {}",
                applied.width, applied.height, applied.fourcc, media
            )));
        }

        if let Some(framerate) = media.framerate {
            let params = Parameters::with_fps(framerate.as_f64().round() as u32);
            if let Err(e) = bound.device.set_params(&params) {
                debug!(error = %e, "Driver rejected frame rate");
            }
        }

        bound.current = position;
        debug!(path = %bound.path, format = %media, "V4L2 format set");
        Ok(())
    }

    fn add_grabber(&self, graph: GraphHandle) -> BackendResult<(StageHandle, GrabberHandle)> {
        let mut st = lock(&self.state);
        Self::ensure_graph(&st, graph)?;
        let stage = self.register(&mut st, "grabber stage");
        let grabber = self.register(&mut st, "grabber");
        st.stages.insert(stage, graph.id());
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
        let slot = st
            .grabbers
            .get_mut(&grabber.id())
            .ok_or(BackendError::InvalidHandle(grabber.id()))?;
        slot.sink = sink;
        Ok(())
    }

    fn converts_to_rgb24(&self, source: &MediaType) -> bool {
        source.pixel_format.is_rgb_convertible()
    }

    fn set_grabber_format(&self, grabber: GrabberHandle, media: &MediaType) -> BackendResult<()> {
        let mut st = lock(&self.state);
        let graph = st
            .grabbers
            .get(&grabber.id())
            .ok_or(BackendError::InvalidHandle(grabber.id()))?
            .graph;

        if let Some(native) = Self::source_format(&st, graph) {
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
        Self::ensure_graph(&st, graph)?;
        let stage = self.register(&mut st, "discard stage");
        st.stages.insert(stage, graph.id());
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
        let in_graph = |stage: StageHandle| st.stages.get(&stage.id()) == Some(&graph.id());
        if !in_graph(grabber) || !in_graph(renderer) || grabber == renderer {
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
        let slot = st
            .grabbers
            .get(&grabber.id())
            .ok_or(BackendError::InvalidHandle(grabber.id()))?;
        if !st.graphs.get(&slot.graph).is_some_and(|g| g.connected) {
            return Err(BackendError::Call("grabber input is not connected".to_string()));
        }
        slot.format
            .or_else(|| Self::source_format(&st, slot.graph))
            .ok_or_else(|| BackendError::Call("no media type negotiated".to_string()))
    }

    fn run(&self, control: MediaControlHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        let graph_id = Self::graph_of_control(&st, control.id())?;
        let graph = st
            .graphs
            .get(&graph_id)
            .ok_or(BackendError::InvalidHandle(graph_id))?;
        if !graph.connected {
            return Err(BackendError::Call("graph is not connected".to_string()));
        }
        let needs_stream = graph.delivery.is_none();
        let source = graph
            .source
            .ok_or_else(|| BackendError::Call("graph has no source".to_string()))?;

        let delivery = if needs_stream {
            let bound = Self::bound(&st, source)?;
            let native = bound
                .formats
                .get(bound.current)
                .map(|f| f.descriptor.media_type)
                .ok_or_else(|| BackendError::FormatNotSupported("no active format".to_string()))?;
            let stream: MmapStream<'static> =
                MmapStream::with_buffers(&bound.device, Type::VideoCapture, self.buffer_count)?;
            info!(path = %bound.path, format = %native, buffers = self.buffer_count, "Starting V4L2 stream");
            Some(DeliveryLoop::start(
                THREAD_NAME,
                delivery_loop(Arc::clone(&self.state), graph_id, native, stream),
            )?)
        } else {
            None
        };

        if let Some(graph) = st.graphs.get_mut(&graph_id) {
            graph.running = true;
            if delivery.is_some() {
                graph.delivery = delivery;
            }
        }
        Ok(())
    }

    fn pause(&self, control: MediaControlHandle) -> BackendResult<()> {
        let mut st = lock(&self.state);
        let graph_id = Self::graph_of_control(&st, control.id())?;
        if let Some(graph) = st.graphs.get_mut(&graph_id) {
            graph.running = false;
        }
        Ok(())
    }

    fn stop(&self, control: MediaControlHandle) -> BackendResult<()> {
        let delivery = {
            let mut st = lock(&self.state);
            let graph_id = Self::graph_of_control(&st, control.id())?;
            st.graphs.get_mut(&graph_id).and_then(|graph| {
                graph.running = false;
                graph.delivery.take()
            })
        };
        // The stream is released when the delivery thread exits
        if let Some(mut delivery) = delivery {
            delivery.stop();
        }
        Ok(())
    }

    fn poll_event(&self, events: EventChannelHandle) -> BackendResult<Option<GraphEvent>> {
        let mut st = lock(&self.state);
        let graph_id = Self::graph_of_control(&st, events.id())?;
        let node_gone = st
            .graphs
            .get(&graph_id)
            .and_then(|g| g.source)
            .and_then(|source| st.bound.get(&source))
            .is_some_and(|bound| !Path::new(&bound.path).exists());

        let Some(graph) = st.graphs.get_mut(&graph_id) else {
            return Ok(None);
        };
        if node_gone && !graph.lost_reported {
            graph.lost_reported = true;
            graph.running = false;
            graph.events.push_back(GraphEvent::DeviceLost);
        }
        Ok(graph.events.pop_front())
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
            let Some(kind) = st.objects.remove(&id) else {
                return Ok(());
            };
            debug!(id, kind, "Releasing V4L2 object");

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
                    if let Some(graph) = st.stages.remove(&id) {
                        if let Some(graph) = st.graphs.get_mut(&graph) {
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
            warn!("Graph released while streaming, stopping delivery");
            delivery.stop();
        }
        Ok(())
    }

    fn query_properties(&self, device: DeviceHandle) -> BackendResult<Vec<PropertyInfo>> {
        let st = lock(&self.state);
        let bound = Self::bound(&st, device.id())?;
        if !Path::new(&bound.path).exists() {
            return Err(BackendError::Disconnected(bound.path.clone()));
        }
        Ok(CameraProperty::ALL
            .iter()
            .filter_map(|&property| v4l2_controls::query_property(&bound.controls, property))
            .collect())
    }

    fn set_property(
        &self,
        device: DeviceHandle,
        property: CameraProperty,
        value: i32,
        auto: bool,
    ) -> BackendResult<()> {
        let st = lock(&self.state);
        let bound = Self::bound(&st, device.id())?;
        v4l2_controls::set_property(&bound.controls, property, value, auto)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_handles_are_rejected() {
        let backend = V4l2Backend::new();
        assert!(backend.event_channel(GraphHandle(42)).is_err());
        assert!(backend.stream_formats(StreamControlHandle(42)).is_err());
        assert!(backend.run(MediaControlHandle(42)).is_err());
    }

    #[test]
    fn test_graph_bookkeeping_without_device() {
        let backend = V4l2Backend::with_buffer_count(2);
        let graph = backend.create_graph().unwrap();
        let events = backend.event_channel(graph).unwrap();
        let control = backend.media_control(graph).unwrap();
        let (stage, grabber) = backend.add_grabber(graph).unwrap();
        let renderer = backend.add_null_renderer(graph).unwrap();

        // No source yet
        assert!(backend.connect(graph, DeviceHandle(999), stage, renderer).is_err());
        assert!(backend.run(control).is_err());
        assert_eq!(backend.poll_event(events).unwrap(), None);

        for object in [
            BackendObject::Grabber(grabber),
            BackendObject::EventChannel(events),
            BackendObject::MediaControl(control),
            BackendObject::Stage(renderer),
            BackendObject::Stage(stage),
            BackendObject::Graph(graph),
        ] {
            backend.release(object).unwrap();
        }
        assert!(lock(&backend.state).objects.is_empty());
        // Releasing twice is harmless
        backend.release(BackendObject::Graph(graph)).unwrap();
    }

    #[test]
    fn test_missing_node_is_not_found() {
        let backend = V4l2Backend::new();
        let result = backend.bind_device(&DeviceRef::Path("/dev/video-does-not-exist".into()));
        assert!(matches!(result, Err(BackendError::DeviceNotFound(_))));
    }
}
