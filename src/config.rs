// SPDX-License-Identifier: GPL-3.0-only

use crate::constants;
use crate::errors::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection monitor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sleep between two health checks (milliseconds)
    pub poll_interval_ms: u64,
    /// Time without frames after which the device is suspected lost (milliseconds)
    pub stale_frame_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: constants::monitor::POLL_INTERVAL.as_millis() as u64,
            stale_frame_timeout_ms: constants::monitor::STALE_FRAME_TIMEOUT.as_millis() as u64,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_frame_timeout_ms)
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Emit RGB24 from the grabber whenever the device format allows it
    pub prefer_rgb24: bool,
    /// Frame rate below which the session reports 0 fps
    pub minimum_fps: f64,
    /// Connection monitor timing
    pub monitor: MonitorConfig,
    /// Buffers requested by streaming backends
    pub frame_pump_buffers: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefer_rgb24: false,
            minimum_fps: constants::grabber::DEFAULT_MINIMUM_FPS,
            monitor: MonitorConfig::default(),
            frame_pump_buffers: constants::graph::DEFAULT_STREAM_BUFFERS,
        }
    }
}

impl EngineConfig {
    /// Default location: `$XDG_CONFIG_HOME/camera-capture/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::config::APP_DIR)
                .join(constants::config::FILE_NAME)
        })
    }

    /// Load from the default location, falling back to defaults
    ///
    /// A missing or unreadable file is not an error for the engine.
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config");
                Self::default()
            }
        }
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> CaptureResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config.validated())
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| {
            CaptureError::Config(format!("cannot write {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Clamp values into their usable ranges
    pub fn validated(mut self) -> Self {
        let defaults = MonitorConfig::default();
        if !(self.minimum_fps >= 0.0) {
            self.minimum_fps = 0.0;
        }
        if self.monitor.poll_interval_ms == 0 {
            self.monitor.poll_interval_ms = defaults.poll_interval_ms;
        }
        if self.monitor.stale_frame_timeout_ms == 0 {
            self.monitor.stale_frame_timeout_ms = defaults.stale_frame_timeout_ms;
        }
        if self.frame_pump_buffers == 0 {
            self.frame_pump_buffers = constants::graph::DEFAULT_STREAM_BUFFERS;
        }
        self
    }
}
