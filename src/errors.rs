// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture engine

use crate::backends::camera::BackendError;
use std::fmt;

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Main engine error type
///
/// Every fallible session operation returns one of these and also records
/// its text as the session's last error.
#[derive(Debug, Clone)]
pub enum CaptureError {
    /// A backend call failed while building, running or reconfiguring the graph
    Backend {
        /// Which step was being performed
        step: &'static str,
        /// The backend's own error
        source: BackendError,
    },
    /// The operation needs an open session
    NotInitialized,
    /// The operation needs an active capture
    NotCapturing,
    /// `open` was called on a session that is already open
    AlreadyOpen,
    /// A format index outside the catalog bounds
    IndexOutOfRange { index: usize, len: usize },
    /// No catalog entry matches the requested format
    FormatNotFound(String),
    /// No frame has been delivered yet
    NoFrame,
    /// No frame newer than the caller's last seen version
    StaleFrame,
    /// Copying a frame out of the grabber failed
    Allocation(String),
    /// Configuration could not be read or written
    Config(String),
}

impl CaptureError {
    /// Wrap a backend error with the step that produced it
    pub fn backend(step: &'static str, source: BackendError) -> Self {
        CaptureError::Backend { step, source }
    }

    /// True for the "nothing new yet" outcomes of a frame read
    pub fn is_no_data(&self) -> bool {
        matches!(self, CaptureError::NoFrame | CaptureError::StaleFrame)
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Backend { step, source } => write!(f, "{} failed: {}", step, source),
            CaptureError::NotInitialized => write!(f, "not initialized"),
            CaptureError::NotCapturing => write!(f, "not capturing"),
            CaptureError::AlreadyOpen => write!(f, "already open"),
            CaptureError::IndexOutOfRange { index, len } => {
                write!(f, "format index {} out of range (0..{})", index, len)
            }
            CaptureError::FormatNotFound(msg) => write!(f, "format not found: {}", msg),
            CaptureError::NoFrame => write!(f, "no frame captured yet"),
            CaptureError::StaleFrame => write!(f, "no new frame"),
            CaptureError::Allocation(msg) => write!(f, "frame copy failed: {}", msg),
            CaptureError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Backend { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::collections::TryReserveError> for CaptureError {
    fn from(err: std::collections::TryReserveError) -> Self {
        CaptureError::Allocation(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}
