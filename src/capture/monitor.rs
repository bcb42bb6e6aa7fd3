// SPDX-License-Identifier: GPL-3.0-only

//! Background connection-health monitor
//!
//! Polls the grabber's timing at a fixed interval. When frames look stalled
//! it asks the session whether the backend reported the device as lost and,
//! if so, hands control to the session's device-lost handling and exits.
//!
//! Termination is cooperative: a stop request is observed on the next
//! wake-up, so shutdown latency is bounded by one poll interval. The thread
//! is never joined by the session, which may itself be running on it.

use super::grabber::GrabberTiming;
use crate::config::MonitorConfig;
use crate::constants::monitor::{MISSED_INTERVALS, THREAD_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// What the monitor watches
pub trait MonitorTarget: Send + Sync {
    /// Current frame timing of the capture
    fn timing(&self) -> GrabberTiming;

    /// Drain pending backend events, true iff the device was lost
    fn is_disconnecting(&self) -> bool;

    /// React to a confirmed loss
    ///
    /// `stop` is the monitor's own stop flag; implementations must ignore
    /// the loss if it was raised in the meantime.
    fn device_lost(&self, stop: &AtomicBool);
}

/// Whether the timing warrants asking the backend about the device
///
/// Any of: no frame for longer than `stale_timeout`, a floored rate of 0,
/// or a gap of at least two expected frame intervals.
pub fn looks_stalled(timing: &GrabberTiming, now: Instant, stale_timeout: Duration) -> bool {
    let Some(since_last) = timing.since_last_frame(now) else {
        return true;
    };
    if since_last > stale_timeout || timing.fps <= 0.0 {
        return true;
    }
    let expected = Duration::from_secs_f64(1.0 / timing.fps);
    since_last.as_secs_f64() >= MISSED_INTERVALS * expected.as_secs_f64()
}

/// Handle to a running monitor thread
#[derive(Debug)]
pub struct ConnectionMonitor {
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ConnectionMonitor {
    /// Spawn the monitor thread
    pub fn start(target: Weak<dyn MonitorTarget>, config: MonitorConfig) -> std::io::Result<Self> {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let done = Arc::clone(&finished);

        info!(
            interval_ms = config.poll_interval_ms,
            stale_ms = config.stale_frame_timeout_ms,
            "Starting connection monitor"
        );

        let thread_handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                run(&target, &stop, config);
                done.store(true, Ordering::SeqCst);
                debug!("Connection monitor exiting");
            })?;

        Ok(Self {
            stop_signal,
            finished,
            thread_handle: Some(thread_handle),
        })
    }

    /// True until the thread has left its loop
    pub fn is_running(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }

    /// Ask the loop to end at its next wake-up (non-blocking)
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Request a stop and let the thread finish on its own
    pub fn detach(mut self) {
        self.request_stop();
        self.thread_handle.take();
    }

    /// Wait for the thread to finish
    ///
    /// Sessions always detach; only tests wait for the loop to exit.
    #[cfg(test)]
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Connection monitor thread panicked");
            }
        }
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.request_stop();
    }
}

fn run(target: &Weak<dyn MonitorTarget>, stop: &AtomicBool, config: MonitorConfig) {
    loop {
        thread::sleep(config.poll_interval());
        if stop.load(Ordering::SeqCst) {
            debug!("Connection monitor stop requested");
            return;
        }

        let Some(target) = target.upgrade() else {
            debug!("Monitored session dropped");
            return;
        };

        let timing = target.timing();
        if !looks_stalled(&timing, Instant::now(), config.stale_frame_timeout()) {
            continue;
        }

        debug!(fps = timing.fps, "Frames stalled, checking device");
        if target.is_disconnecting() {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            error!("Capture device lost");
            target.device_lost(stop);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct FakeTarget {
        timing: GrabberTiming,
        lost: AtomicBool,
        checks: AtomicU32,
        callbacks: AtomicU32,
    }

    impl MonitorTarget for FakeTarget {
        fn timing(&self) -> GrabberTiming {
            self.timing
        }

        fn is_disconnecting(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.lost.load(Ordering::SeqCst)
        }

        fn device_lost(&self, stop: &AtomicBool) {
            if !stop.load(Ordering::SeqCst) {
                self.callbacks.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval_ms: 5,
            stale_frame_timeout_ms: 50,
        }
    }

    fn target(timing: GrabberTiming, lost: bool) -> Arc<FakeTarget> {
        Arc::new(FakeTarget {
            timing,
            lost: AtomicBool::new(lost),
            checks: AtomicU32::new(0),
            callbacks: AtomicU32::new(0),
        })
    }

    #[test]
    fn test_stall_heuristics() {
        let now = Instant::now();
        let timeout = Duration::from_secs(10);

        let never = GrabberTiming { last_frame: None, fps: 0.0 };
        assert!(looks_stalled(&never, now, timeout));

        let healthy = GrabberTiming { last_frame: Some(now), fps: 30.0 };
        assert!(!looks_stalled(&healthy, now, timeout));

        let zero_fps = GrabberTiming { last_frame: Some(now), fps: 0.0 };
        assert!(looks_stalled(&zero_fps, now, timeout));

        // 30 fps expects a frame every ~33 ms
        let gap = GrabberTiming {
            last_frame: Some(now),
            fps: 30.0,
        };
        assert!(looks_stalled(&gap, now + Duration::from_millis(70), timeout));
        assert!(!looks_stalled(&gap, now + Duration::from_millis(50), timeout));
    }

    #[test]
    fn test_device_lost_fires_once() {
        let fake = target(GrabberTiming { last_frame: None, fps: 0.0 }, true);
        let weak: Weak<dyn MonitorTarget> = Arc::downgrade(&fake) as Weak<dyn MonitorTarget>;

        let mut monitor = ConnectionMonitor::start(weak, fast_config()).unwrap();
        monitor.join();

        assert!(!monitor.is_running());
        assert_eq!(fake.callbacks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_healthy_capture_never_escalates() {
        let fake = target(
            GrabberTiming {
                last_frame: Some(Instant::now() + Duration::from_secs(3600)),
                fps: 30.0,
            },
            true,
        );
        let weak: Weak<dyn MonitorTarget> = Arc::downgrade(&fake) as Weak<dyn MonitorTarget>;

        let mut monitor = ConnectionMonitor::start(weak, fast_config()).unwrap();
        thread::sleep(Duration::from_millis(40));
        monitor.request_stop();
        monitor.join();

        assert_eq!(fake.checks.load(Ordering::SeqCst), 0);
        assert_eq!(fake.callbacks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stall_without_loss_keeps_polling() {
        let fake = target(GrabberTiming { last_frame: None, fps: 0.0 }, false);
        let weak: Weak<dyn MonitorTarget> = Arc::downgrade(&fake) as Weak<dyn MonitorTarget>;

        let mut monitor = ConnectionMonitor::start(weak, fast_config()).unwrap();
        thread::sleep(Duration::from_millis(60));
        assert!(monitor.is_running());
        monitor.request_stop();
        monitor.join();

        assert!(fake.checks.load(Ordering::SeqCst) > 1);
        assert_eq!(fake.callbacks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exits_when_target_dropped() {
        let fake = target(GrabberTiming { last_frame: None, fps: 0.0 }, false);
        let weak: Weak<dyn MonitorTarget> = Arc::downgrade(&fake) as Weak<dyn MonitorTarget>;
        drop(fake);

        let mut monitor = ConnectionMonitor::start(weak, fast_config()).unwrap();
        monitor.join();
        assert!(!monitor.is_running());
    }
}
