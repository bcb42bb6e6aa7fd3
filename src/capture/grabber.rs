// SPDX-License-Identifier: GPL-3.0-only

//! Producer/consumer bridge between the backend's delivery thread and readers
//!
//! Single-slot design: every delivered sample overwrites the one live
//! buffer and readers always copy out the most recent complete frame.
//! Frames are dropped when the producer outpaces the consumer.

use super::frame::FrameBuffer;
use crate::backends::camera::{PixelFormat, SampleSink};
use crate::constants::grabber::DEFAULT_MINIMUM_FPS;
use crate::errors::{CaptureError, CaptureResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Frame arrival accounting, kept apart from the buffer lock
#[derive(Debug, Clone, Copy)]
struct FrameTiming {
    last_frame: Option<Instant>,
    fps: f64,
    minimum_fps: f64,
}

/// Snapshot of the grabber's timing used by health checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrabberTiming {
    /// Time of the last delivered sample
    pub last_frame: Option<Instant>,
    /// Rate reported by `fps()` at snapshot time
    pub fps: f64,
}

impl GrabberTiming {
    /// Time since the last delivered sample, `None` if nothing arrived yet
    pub fn since_last_frame(&self, now: Instant) -> Option<Duration> {
        self.last_frame.map(|last| now.saturating_duration_since(last))
    }
}

/// Receives samples from a backend and hands copies to readers
#[derive(Debug)]
pub struct FrameGrabber {
    buffer: Mutex<FrameBuffer>,
    timing: Mutex<FrameTiming>,
    resizes: AtomicU64,
}

impl Default for FrameGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameGrabber {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(FrameBuffer::new()),
            timing: Mutex::new(FrameTiming {
                last_frame: None,
                fps: 0.0,
                minimum_fps: DEFAULT_MINIMUM_FPS,
            }),
            resizes: AtomicU64::new(0),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, FrameBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timing(&self) -> MutexGuard<'_, FrameTiming> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reallocate the slot for a newly emitted format
    ///
    /// Zero-fills the buffer and forgets previously produced data, so reads
    /// fail until the next sample arrives.
    pub fn set_buffer_size(&self, pixel_format: PixelFormat, size: usize) {
        debug!(%pixel_format, size, "Allocating grabber buffer");
        self.buffer().allocate(pixel_format, size);
    }

    /// Store one sample and update the frame rate
    pub fn on_sample(&self, sample: &[u8]) {
        let resized = {
            let mut buffer = self.buffer();
            let declared = buffer.size();
            let resized = buffer.write_sample(sample);
            if resized {
                warn!(
                    declared,
                    actual = sample.len(),
                    "Sample larger than negotiated buffer, reallocated"
                );
            }
            resized
        };
        if resized {
            self.resizes.fetch_add(1, Ordering::Relaxed);
        }

        let now = Instant::now();
        let mut timing = self.timing();
        if let Some(last) = timing.last_frame {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                timing.fps = 1.0 / elapsed;
            }
        }
        timing.last_frame = Some(now);
    }

    /// Copy the latest frame into `out`
    ///
    /// With `only_new`, a frame whose version equals `last_seen` is
    /// reported as `StaleFrame` and nothing is copied.
    pub fn frame(&self, out: &mut FrameBuffer, only_new: bool, last_seen: u64) -> CaptureResult<()> {
        let buffer = self.buffer();
        if buffer.is_empty() {
            return Err(CaptureError::NoFrame);
        }
        if only_new && buffer.version() == last_seen {
            return Err(CaptureError::StaleFrame);
        }
        buffer.copy_into(out)
    }

    /// Current frame rate, or 0 when below the minimum
    ///
    /// Two checks: the gap since the last frame already implies a rate
    /// under the floor (stale now), or the last measured rate was under
    /// the floor.
    pub fn fps(&self) -> f64 {
        let timing = *self.timing();
        Self::floored_fps(&timing, Instant::now())
    }

    fn floored_fps(timing: &FrameTiming, now: Instant) -> f64 {
        let Some(last) = timing.last_frame else {
            return 0.0;
        };
        if timing.minimum_fps > 0.0 {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 1.0 / timing.minimum_fps {
                return 0.0;
            }
        }
        if timing.fps < timing.minimum_fps {
            return 0.0;
        }
        timing.fps
    }

    /// Set the frame-rate floor; negative values disable it
    pub fn set_minimum_fps(&self, minimum_fps: f64) {
        self.timing().minimum_fps = minimum_fps.max(0.0);
    }

    pub fn minimum_fps(&self) -> f64 {
        self.timing().minimum_fps
    }

    /// Last frame time and floored rate, read atomically
    pub fn timing_snapshot(&self) -> GrabberTiming {
        let timing = *self.timing();
        let now = Instant::now();
        GrabberTiming {
            last_frame: timing.last_frame,
            fps: Self::floored_fps(&timing, now),
        }
    }

    pub fn last_frame_time(&self) -> Option<Instant> {
        self.timing().last_frame
    }

    /// Version of the latest frame, 0 if none was ever delivered
    pub fn version(&self) -> u64 {
        self.buffer().version()
    }

    /// Declared size of the slot in bytes
    pub fn buffer_size(&self) -> usize {
        self.buffer().size()
    }

    /// Number of times a sample forced the slot to grow
    pub fn resize_count(&self) -> u64 {
        self.resizes.load(Ordering::Relaxed)
    }

    /// Drop the buffer and timing history
    pub fn reset(&self) {
        self.buffer().allocate(PixelFormat::RGB24, 0);
        let mut timing = self.timing();
        timing.last_frame = None;
        timing.fps = 0.0;
    }
}

impl SampleSink for FrameGrabber {
    fn on_sample(&self, data: &[u8]) {
        FrameGrabber::on_sample(self, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_grabber_has_no_frame() {
        let grabber = FrameGrabber::new();
        let mut out = FrameBuffer::new();
        assert!(matches!(
            grabber.frame(&mut out, false, 0),
            Err(CaptureError::NoFrame)
        ));
        assert_eq!(grabber.fps(), 0.0);
    }

    #[test]
    fn test_only_new_rejects_seen_version() {
        let grabber = FrameGrabber::new();
        grabber.set_buffer_size(PixelFormat::Gray8, 4);
        grabber.on_sample(&[1, 2, 3, 4]);

        let mut out = FrameBuffer::new();
        grabber.frame(&mut out, true, 0).unwrap();
        let seen = out.version();

        assert!(matches!(
            grabber.frame(&mut out, true, seen),
            Err(CaptureError::StaleFrame)
        ));
        // Without only_new the same frame is readable again
        grabber.frame(&mut out, false, seen).unwrap();

        grabber.on_sample(&[5, 6, 7, 8]);
        grabber.frame(&mut out, true, seen).unwrap();
        assert!(out.version() > seen);
        assert_eq!(out.data(), &[5, 6, 7, 8]);
    }

    #[test]
    fn test_exact_size_sample_never_resizes() {
        let grabber = FrameGrabber::new();
        grabber.set_buffer_size(PixelFormat::YUYV, 8);
        for _ in 0..5 {
            grabber.on_sample(&[0xAA; 8]);
        }
        assert_eq!(grabber.resize_count(), 0);
        assert_eq!(grabber.buffer_size(), 8);
    }

    #[test]
    fn test_oversized_sample_resizes_once() {
        let grabber = FrameGrabber::new();
        grabber.set_buffer_size(PixelFormat::YUYV, 8);
        grabber.on_sample(&[0xBB; 12]);
        assert_eq!(grabber.resize_count(), 1);
        assert_eq!(grabber.buffer_size(), 12);

        grabber.on_sample(&[0xCC; 12]);
        assert_eq!(grabber.resize_count(), 1);
    }

    #[test]
    fn test_set_buffer_size_forgets_data() {
        let grabber = FrameGrabber::new();
        grabber.set_buffer_size(PixelFormat::Gray8, 2);
        grabber.on_sample(&[1, 2]);
        grabber.set_buffer_size(PixelFormat::RGB24, 6);

        let mut out = FrameBuffer::new();
        assert!(grabber.frame(&mut out, false, 0).is_err());
        // The stamp keeps counting across reallocation
        assert_eq!(grabber.version(), 1);
    }

    #[test]
    fn test_fps_measured_between_frames() {
        let grabber = FrameGrabber::new();
        grabber.set_minimum_fps(1.0);
        grabber.set_buffer_size(PixelFormat::Gray8, 1);
        grabber.on_sample(&[0]);
        thread::sleep(Duration::from_millis(20));
        grabber.on_sample(&[0]);

        let fps = grabber.fps();
        assert!(fps > 1.0 && fps <= 50.0, "fps = {}", fps);
    }

    #[test]
    fn test_fps_zero_when_stale() {
        let grabber = FrameGrabber::new();
        grabber.set_minimum_fps(10.0);
        grabber.set_buffer_size(PixelFormat::Gray8, 1);
        grabber.on_sample(&[0]);
        thread::sleep(Duration::from_millis(10));
        grabber.on_sample(&[0]);

        // Gap longer than 1000 / 10 ms
        thread::sleep(Duration::from_millis(150));
        assert_eq!(grabber.fps(), 0.0);
        assert_eq!(grabber.timing_snapshot().fps, 0.0);
    }

    #[test]
    fn test_fps_zero_when_rate_below_floor() {
        let timing = FrameTiming {
            last_frame: Some(Instant::now()),
            fps: 4.0,
            minimum_fps: 5.0,
        };
        assert_eq!(FrameGrabber::floored_fps(&timing, Instant::now()), 0.0);

        let healthy = FrameTiming { fps: 30.0, ..timing };
        assert_eq!(FrameGrabber::floored_fps(&healthy, Instant::now()), 30.0);
    }

    #[test]
    fn test_concurrent_producer_and_reader() {
        let grabber = std::sync::Arc::new(FrameGrabber::new());
        grabber.set_buffer_size(PixelFormat::Gray8, 64);

        let producer = {
            let grabber = std::sync::Arc::clone(&grabber);
            thread::spawn(move || {
                for i in 0..200u8 {
                    grabber.on_sample(&[i; 64]);
                }
            })
        };

        let mut out = FrameBuffer::new();
        let mut last = 0;
        for _ in 0..200 {
            if grabber.frame(&mut out, true, last).is_ok() {
                assert!(out.data().iter().all(|&b| b == out.data()[0]));
                last = out.version();
            }
        }
        producer.join().unwrap();
        assert_eq!(grabber.version(), 200);
    }
}
