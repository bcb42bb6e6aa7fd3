// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for sample delivery loops
//!
//! Backends push samples to their sink from a dedicated thread. This module
//! gives every backend the same start/stop/join handling for that thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Leave the loop
    Stop,
}

/// Controller for a delivery loop running in its own thread
///
/// # Example
///
/// ```ignore
/// let mut delivery = DeliveryLoop::start("virtual-delivery", move || {
///     sink.on_sample(&next_frame());
///     thread::sleep(period);
///     LoopAction::Continue
/// })?;
///
/// // Later, stop and join
/// delivery.stop();
/// ```
pub struct DeliveryLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl DeliveryLoop {
    /// Spawn a named thread calling `loop_fn` until it returns
    /// `LoopAction::Stop` or a stop is requested
    pub fn start<F>(name: &str, mut loop_fn: F) -> std::io::Result<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting delivery loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %thread_name, "Delivery thread started");
                while !stop.load(Ordering::SeqCst) {
                    if loop_fn() == LoopAction::Stop {
                        debug!(name = %thread_name, "Loop requested stop");
                        break;
                    }
                }
                debug!(name = %thread_name, "Delivery thread exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Flag checked before every iteration
    ///
    /// Long blocking reads inside the loop body can poll it too.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting delivery loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Signal the loop to stop and wait for the thread
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside the loop body; it exits on its own
                return;
            }
            if handle.join().is_err() {
                warn!(name = %self.name, "Delivery thread panicked");
            }
        }
    }
}

impl Drop for DeliveryLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "DeliveryLoop dropped, stopping loop");
            self.stop();
        }
    }
}

impl std::fmt::Debug for DeliveryLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryLoop")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
