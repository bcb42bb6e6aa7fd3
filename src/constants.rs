// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

use std::time::Duration;

/// Connection monitor timing
pub mod monitor {
    use super::Duration;

    /// Sleep between two health checks of the monitor thread
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

    /// Time without any frame after which the device is suspected lost,
    /// regardless of the measured frame rate
    pub const STALE_FRAME_TIMEOUT: Duration = Duration::from_millis(10_000);

    /// A gap of this many expected frame intervals also counts as a stall
    pub const MISSED_INTERVALS: f64 = 2.0;

    /// Name given to the monitor thread
    pub const THREAD_NAME: &str = "capture-monitor";
}

/// Frame grabber defaults
pub mod grabber {
    /// Frame rate below which `fps()` reports zero
    pub const DEFAULT_MINIMUM_FPS: f64 = 1.0;

    /// Version stamp of a grabber that has never received a frame
    pub const EMPTY_VERSION: u64 = 0;
}

/// Graph and negotiation defaults
pub mod graph {
    /// Bytes per pixel of the RGB24 emitted format
    pub const RGB24_BYTES_PER_PIXEL: usize = 3;

    /// Number of mmap buffers requested from streaming backends
    pub const DEFAULT_STREAM_BUFFERS: u32 = 4;
}

/// Virtual backend timing
pub mod virtual_camera {
    use super::Duration;

    /// Frame period used when a virtual device reports no frame rate
    pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(33);

    /// Name given to virtual delivery threads
    pub const THREAD_NAME: &str = "virtual-delivery";
}

/// Video4Linux2 backend
pub mod v4l2 {
    /// Directory scanned for capture nodes
    pub const DEVICE_DIR: &str = "/dev";

    /// File name prefix of capture nodes
    pub const NODE_PREFIX: &str = "video";

    /// Name given to V4L2 delivery threads
    pub const THREAD_NAME: &str = "v4l2-delivery";

    /// Worst-case bytes per pixel assumed for compressed samples
    pub const COMPRESSED_BYTES_PER_PIXEL: usize = 2;

    /// Sizes offered for devices reporting a stepwise size range
    pub const STEPWISE_SIZES: [(u32, u32); 5] =
        [(320, 240), (640, 480), (1280, 720), (1920, 1080), (3840, 2160)];

    /// Failed dequeues in a row before the graph aborts
    pub const MAX_CONSECUTIVE_ERRORS: u32 = 30;
}

/// Configuration file location
pub mod config {
    /// Directory under the user config dir
    pub const APP_DIR: &str = "camera-capture";

    /// File name of the engine configuration
    pub const FILE_NAME: &str = "config.json";
}
