// SPDX-License-Identifier: GPL-3.0-only

//! Ownership tree of one assembled capture graph
//!
//! Every backend object acquired while building the graph lives in an
//! `Option` slot. Teardown walks the slots in a fixed order, taking each one
//! out before releasing it, so a partially built graph releases exactly what
//! it holds and a second teardown is a no-op.

use crate::backends::camera::{
    BackendObject, CaptureBackend, DeviceHandle, EventChannelHandle, GrabberHandle, GraphHandle,
    MediaControlHandle, StageHandle, StreamControlHandle,
};
use tracing::{debug, warn};

/// Backend objects owned by a session, filled in build order
#[derive(Debug, Default)]
pub struct CaptureGraph {
    pub device: Option<DeviceHandle>,
    pub graph: Option<GraphHandle>,
    pub events: Option<EventChannelHandle>,
    pub media_control: Option<MediaControlHandle>,
    pub stream_control: Option<StreamControlHandle>,
    pub grabber_stage: Option<StageHandle>,
    pub grabber: Option<GrabberHandle>,
    pub renderer: Option<StageHandle>,
    /// The grabber callback is registered and must be cleared first
    pub sink_registered: bool,
}

impl CaptureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while any backend object is still held
    pub fn holds_objects(&self) -> bool {
        self.device.is_some()
            || self.graph.is_some()
            || self.events.is_some()
            || self.media_control.is_some()
            || self.stream_control.is_some()
            || self.grabber_stage.is_some()
            || self.grabber.is_some()
            || self.renderer.is_some()
    }

    /// Release everything in reverse acquisition order
    ///
    /// Failures are logged and skipped; teardown always runs to the end.
    pub fn teardown(&mut self, backend: &dyn CaptureBackend) {
        // Unhook the callback before anything it writes into goes away
        if self.sink_registered {
            self.sink_registered = false;
            if let Some(grabber) = self.grabber {
                if let Err(e) = backend.set_sample_sink(grabber, None) {
                    warn!(error = %e, "Failed to clear sample callback");
                }
            }
        }

        if let Some(grabber) = self.grabber.take() {
            release(backend, BackendObject::Grabber(grabber), "grabber interface");
        }

        if let (Some(graph), Some(stage)) = (self.graph, self.grabber_stage) {
            debug!("Removing downstream stages");
            if let Err(e) = backend.remove_downstream(graph, stage) {
                warn!(error = %e, "Failed to remove downstream stages");
            }
        }

        if let Some(events) = self.events.take() {
            release(backend, BackendObject::EventChannel(events), "event channel");
        }
        if let Some(control) = self.media_control.take() {
            release(backend, BackendObject::MediaControl(control), "media control");
        }
        if let Some(stream) = self.stream_control.take() {
            release(backend, BackendObject::StreamControl(stream), "stream control");
        }
        if let Some(renderer) = self.renderer.take() {
            release(backend, BackendObject::Stage(renderer), "discard stage");
        }
        if let Some(stage) = self.grabber_stage.take() {
            release(backend, BackendObject::Stage(stage), "grabber stage");
        }
        if let Some(device) = self.device.take() {
            release(backend, BackendObject::Device(device), "device");
        }
        if let Some(graph) = self.graph.take() {
            release(backend, BackendObject::Graph(graph), "graph");
        }
    }
}

fn release(backend: &dyn CaptureBackend, object: BackendObject, what: &'static str) {
    debug!(object = what, "Releasing");
    if let Err(e) = backend.release(object) {
        warn!(object = what, error = %e, "Release failed, continuing teardown");
    }
}
