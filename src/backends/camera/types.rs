// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for capture backends

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Pixel format type tag of a stream
///
/// Covers the raw and compressed layouts webcams commonly report. Anything
/// else is carried through as its FourCC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PixelFormat {
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// RGB32 - 32-bit RGB with an unused padding byte
    RGB32,
    /// ARGB32 - 32-bit with alpha
    ARGB32,
    /// RGB565 - 16-bit packed RGB
    RGB565,
    /// RGB555 - 15-bit packed RGB
    RGB555,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved), a.k.a. YUY2
    YUYV,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    UYVY,
    /// NV12 - Semi-planar 4:2:0
    NV12,
    /// I420 - Planar 4:2:0
    I420,
    /// YV12 - Planar 4:2:0 with V before U
    YV12,
    /// Gray8 - 8-bit grayscale
    Gray8,
    /// Motion JPEG, one JPEG image per sample
    MJPEG,
    /// H.264 elementary stream
    H264,
    /// Any other FourCC reported by a device
    Other([u8; 4]),
}

impl PixelFormat {
    /// FourCC code of this format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            Self::RGB24 => *b"RGB3",
            Self::RGB32 => *b"RGB4",
            Self::ARGB32 => *b"BA24",
            Self::RGB565 => *b"RGBP",
            Self::RGB555 => *b"RGBO",
            Self::YUYV => *b"YUYV",
            Self::UYVY => *b"UYVY",
            Self::NV12 => *b"NV12",
            Self::I420 => *b"YU12",
            Self::YV12 => *b"YV12",
            Self::Gray8 => *b"GREY",
            Self::MJPEG => *b"MJPG",
            Self::H264 => *b"H264",
            Self::Other(code) => *code,
        }
    }

    /// Parse a FourCC code, accepting the common aliases
    pub fn from_fourcc(code: &[u8; 4]) -> Self {
        match code {
            b"RGB3" | b"BGR3" => Self::RGB24,
            b"RGB4" | b"BGR4" | b"XR24" => Self::RGB32,
            b"BA24" | b"AR24" => Self::ARGB32,
            b"RGBP" => Self::RGB565,
            b"RGBO" => Self::RGB555,
            b"YUYV" | b"YUY2" => Self::YUYV,
            b"UYVY" => Self::UYVY,
            b"NV12" => Self::NV12,
            b"YU12" | b"I420" | b"IYUV" => Self::I420,
            b"YV12" => Self::YV12,
            b"GREY" | b"Y800" | b"Y8  " => Self::Gray8,
            b"MJPG" | b"JPEG" => Self::MJPEG,
            b"H264" | b"AVC1" => Self::H264,
            other => Self::Other(*other),
        }
    }

    /// Check if samples of this format have a variable, compressed length
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::MJPEG | Self::H264)
    }

    /// Check if this format converts losslessly to 24-bit RGB in the grabber
    ///
    /// RGB layouts and uncompressed YUV layouts qualify. Compressed and
    /// unknown formats pass through at their native sample size.
    pub fn is_rgb_convertible(&self) -> bool {
        matches!(
            self,
            Self::RGB24
                | Self::RGB32
                | Self::ARGB32
                | Self::RGB565
                | Self::RGB555
                | Self::YUYV
                | Self::UYVY
                | Self::NV12
                | Self::I420
                | Self::YV12
                | Self::Gray8
        )
    }

    /// Bits per pixel for uncompressed formats
    pub fn bits_per_pixel(&self) -> Option<u32> {
        match self {
            Self::RGB32 | Self::ARGB32 => Some(32),
            Self::RGB24 => Some(24),
            Self::RGB565 | Self::RGB555 | Self::YUYV | Self::UYVY => Some(16),
            Self::NV12 | Self::I420 | Self::YV12 => Some(12),
            Self::Gray8 => Some(8),
            Self::MJPEG | Self::H264 | Self::Other(_) => None,
        }
    }

    /// Byte size of one uncompressed frame
    pub fn frame_size(&self, width: u32, height: u32) -> Option<usize> {
        self.bits_per_pixel()
            .map(|bpp| width as usize * height as usize * bpp as usize / 8)
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = self.fourcc();
        write!(f, "{}", String::from_utf8_lossy(&code).trim_end())
    }
}

/// Framerate as a fraction (numerator/denominator)
/// Stores exact framerate to handle NTSC rates like 59.94fps (60000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub denom: u32,
}

impl Framerate {
    /// Create a new framerate from numerator and denominator
    pub fn new(num: u32, denom: u32) -> Self {
        Self {
            num,
            denom: if denom == 0 { 1 } else { denom },
        }
    }

    /// Create a framerate from an integer (e.g., 30 becomes 30/1)
    pub fn from_int(fps: u32) -> Self {
        Self { num: fps, denom: 1 }
    }

    /// Get the framerate as a floating point value
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }

    /// Duration of one frame, `None` for a zero rate
    pub fn frame_duration(&self) -> Option<std::time::Duration> {
        if self.num == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs_f64(1.0 / self.as_f64()))
        }
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show decimal for non-integer framerates (NTSC)
        if self.denom != 1 {
            write!(f, "{:.2}", self.as_f64())
        } else {
            write!(f, "{}", self.num)
        }
    }
}

/// A fully negotiated stream type: layout, geometry and sample size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaType {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per sample as reported or computed
    pub sample_size: usize,
    pub framerate: Option<Framerate>,
}

impl MediaType {
    /// Media type for a format, sizing uncompressed layouts from geometry
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            pixel_format,
            width,
            height,
            sample_size: pixel_format.frame_size(width, height).unwrap_or(0),
            framerate: None,
        }
    }

    /// Same geometry as `self`, emitted as packed RGB24
    pub fn as_rgb24(&self) -> Self {
        Self {
            pixel_format: PixelFormat::RGB24,
            width: self.width,
            height: self.height,
            sample_size: self.width as usize
                * self.height as usize
                * crate::constants::graph::RGB24_BYTES_PER_PIXEL,
            framerate: self.framerate,
        }
    }

    /// Override the sample size
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Attach a frame rate
    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = Some(framerate);
        self
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}x{}", self.pixel_format, self.width, self.height)?;
        if let Some(fps) = &self.framerate {
            write!(f, " @ {}fps", fps)?;
        }
        Ok(())
    }
}

/// The backend's own description of one negotiable stream format
///
/// Backends hand these out behind an `Arc` and keep handing out the same
/// allocation for the same entry, so the engine can tell "the exact
/// descriptor the device reported" apart from "a format that looks equal".
#[derive(Debug)]
pub struct NativeFormat {
    /// Position in the device's capability list
    pub index: u32,
    pub media_type: MediaType,
}

/// Shared native format descriptor, compared by identity
pub type FormatDescriptor = Arc<NativeFormat>;

/// Value view of a catalog entry
///
/// Equality and hashing only look at `(pixel_format, width, height)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes of one sample in this format
    pub total_size: usize,
}

impl VideoFormat {
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32, total_size: usize) -> Self {
        Self {
            pixel_format,
            width,
            height,
            total_size,
        }
    }

    /// A format with a non-empty geometry
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl From<&MediaType> for VideoFormat {
    fn from(media: &MediaType) -> Self {
        Self {
            pixel_format: media.pixel_format,
            width: media.width,
            height: media.height,
            total_size: media.sample_size,
        }
    }
}

impl PartialEq for VideoFormat {
    fn eq(&self, other: &Self) -> bool {
        self.pixel_format == other.pixel_format
            && self.width == other.width
            && self.height == other.height
    }
}

impl Eq for VideoFormat {}

impl Hash for VideoFormat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pixel_format.hash(state);
        self.width.hash(state);
        self.height.hash(state);
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} ({} bytes)",
            self.pixel_format, self.width, self.height, self.total_size
        )
    }
}

/// Represents a capture device as reported by enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub friendly_name: String,
    pub description: String,
    /// Stable identity key (device node path, moniker, ...)
    pub path: String,
    pub supported_formats: Vec<VideoFormat>,
}

impl DeviceDescriptor {
    /// A device is usable iff at least one of its formats is valid
    pub fn is_valid(&self) -> bool {
        self.supported_formats.iter().any(VideoFormat::is_valid)
    }
}

/// How a caller names the device to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRef {
    /// Position in `enumerate_devices()`
    Index(usize),
    /// Stable path of a device descriptor
    Path(String),
}

impl From<usize> for DeviceRef {
    fn from(index: usize) -> Self {
        DeviceRef::Index(index)
    }
}

impl From<&str> for DeviceRef {
    fn from(path: &str) -> Self {
        DeviceRef::Path(path.to_string())
    }
}

impl From<&DeviceDescriptor> for DeviceRef {
    fn from(device: &DeviceDescriptor) -> Self {
        DeviceRef::Path(device.path.clone())
    }
}

impl std::fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRef::Index(index) => write!(f, "#{}", index),
            DeviceRef::Path(path) => write!(f, "{}", path),
        }
    }
}

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw backend identifier
            pub fn id(self) -> u64 {
                self.0
            }
        }
    };
}

backend_handle!(
    /// A device bound for capture; also its source stage once added to a graph
    DeviceHandle
);
backend_handle!(
    /// Graph container owning all stages
    GraphHandle
);
backend_handle!(
    /// Event channel of a graph (device lost, errors, completion)
    EventChannelHandle
);
backend_handle!(
    /// Output stream control of a device (format enumeration and selection)
    StreamControlHandle
);
backend_handle!(
    /// A processing stage inside a graph (grabber, discard sink)
    StageHandle
);
backend_handle!(
    /// Sample-grabber interface of a grabber stage
    GrabberHandle
);
backend_handle!(
    /// Run/pause/stop control of a graph
    MediaControlHandle
);

/// Anything a backend can be asked to release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendObject {
    Device(DeviceHandle),
    Graph(GraphHandle),
    EventChannel(EventChannelHandle),
    StreamControl(StreamControlHandle),
    Stage(StageHandle),
    Grabber(GrabberHandle),
    MediaControl(MediaControlHandle),
}

/// Fallible backend steps, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendStep {
    BindDevice,
    CreateGraph,
    EventChannel,
    MediaControl,
    AddSource,
    StreamControl,
    EnumerateFormats,
    ReadFormat,
    SetFormat,
    AddGrabber,
    SetSampleSink,
    SetGrabberFormat,
    AddRenderer,
    Connect,
    ConnectedFormat,
    Run,
    Pause,
    Stop,
    QueryProperties,
    SetProperty,
}

impl BackendStep {
    /// Human readable label used in errors and logs
    pub fn label(self) -> &'static str {
        match self {
            BackendStep::BindDevice => "bind device",
            BackendStep::CreateGraph => "create graph",
            BackendStep::EventChannel => "query event channel",
            BackendStep::MediaControl => "query media control",
            BackendStep::AddSource => "add source stage",
            BackendStep::StreamControl => "find stream control",
            BackendStep::EnumerateFormats => "enumerate formats",
            BackendStep::ReadFormat => "read current format",
            BackendStep::SetFormat => "set format",
            BackendStep::AddGrabber => "add grabber stage",
            BackendStep::SetSampleSink => "register sample callback",
            BackendStep::SetGrabberFormat => "set grabber format",
            BackendStep::AddRenderer => "add discard stage",
            BackendStep::Connect => "connect stages",
            BackendStep::ConnectedFormat => "read connected format",
            BackendStep::Run => "run graph",
            BackendStep::Pause => "pause graph",
            BackendStep::Stop => "stop graph",
            BackendStep::QueryProperties => "query properties",
            BackendStep::SetProperty => "set property",
        }
    }
}

impl std::fmt::Display for BackendStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Events reported on a graph's event channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// The capture device went away
    DeviceLost,
    /// The stream reached its end
    Complete,
    /// The graph aborted with an error
    ErrorAbort(String),
    /// Backend-specific event code
    Other(u32),
}

/// Camera properties exposed through the property table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraProperty {
    Brightness,
    Contrast,
    Hue,
    Saturation,
    Sharpness,
    Gamma,
    WhiteBalance,
    BacklightCompensation,
    Gain,
    Pan,
    Tilt,
    Roll,
    Zoom,
    Exposure,
    Iris,
    Focus,
}

impl CameraProperty {
    pub const ALL: [CameraProperty; 16] = [
        CameraProperty::Brightness,
        CameraProperty::Contrast,
        CameraProperty::Hue,
        CameraProperty::Saturation,
        CameraProperty::Sharpness,
        CameraProperty::Gamma,
        CameraProperty::WhiteBalance,
        CameraProperty::BacklightCompensation,
        CameraProperty::Gain,
        CameraProperty::Pan,
        CameraProperty::Tilt,
        CameraProperty::Roll,
        CameraProperty::Zoom,
        CameraProperty::Exposure,
        CameraProperty::Iris,
        CameraProperty::Focus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CameraProperty::Brightness => "Brightness",
            CameraProperty::Contrast => "Contrast",
            CameraProperty::Hue => "Hue",
            CameraProperty::Saturation => "Saturation",
            CameraProperty::Sharpness => "Sharpness",
            CameraProperty::Gamma => "Gamma",
            CameraProperty::WhiteBalance => "White Balance",
            CameraProperty::BacklightCompensation => "Backlight Compensation",
            CameraProperty::Gain => "Gain",
            CameraProperty::Pan => "Pan",
            CameraProperty::Tilt => "Tilt",
            CameraProperty::Roll => "Roll",
            CameraProperty::Zoom => "Zoom",
            CameraProperty::Exposure => "Exposure",
            CameraProperty::Iris => "Iris",
            CameraProperty::Focus => "Focus",
        }
    }
}

/// One row of a device's property table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub property: CameraProperty,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
    pub value: i32,
    /// The device can run this property automatically
    pub supports_auto: bool,
    /// The property is currently in automatic mode
    pub is_auto: bool,
}

impl PropertyInfo {
    /// Clamp a requested value into range, snapping to the step grid
    pub fn clamp(&self, value: i32) -> i32 {
        let clamped = value.clamp(self.minimum, self.maximum.max(self.minimum));
        if self.step > 1 {
            let offset = (clamped - self.minimum) / self.step * self.step;
            self.minimum + offset
        } else {
            clamped
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Format not supported
    FormatNotSupported(String),
    /// A handle that the backend does not know (or already released)
    InvalidHandle(u64),
    /// The device went away
    Disconnected(String),
    /// A backend call returned a failure
    Call(String),
    /// General I/O error
    IoError(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::InvalidHandle(id) => write!(f, "Invalid handle: {}", id),
            BackendError::Disconnected(msg) => write!(f, "Device disconnected: {}", msg),
            BackendError::Call(msg) => write!(f, "Backend call failed: {}", msg),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        if err.raw_os_error() == Some(19) {
            // ENODEV
            BackendError::Disconnected(err.to_string())
        } else {
            BackendError::IoError(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressed_formats_have_no_fixed_size() {
        for format in [PixelFormat::MJPEG, PixelFormat::H264] {
            assert!(format.is_compressed());
            assert!(!format.is_rgb_convertible());
            assert_eq!(format.frame_size(640, 480), None);
        }
        assert!(!PixelFormat::YUYV.is_compressed());
        assert_eq!(PixelFormat::YUYV.frame_size(640, 480), Some(640 * 480 * 2));
    }

    #[test]
    fn test_fourcc_aliases() {
        assert_eq!(PixelFormat::from_fourcc(b"YUY2"), PixelFormat::YUYV);
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), PixelFormat::MJPEG);
        assert_eq!(
            PixelFormat::from_fourcc(b"ABCD"),
            PixelFormat::Other(*b"ABCD")
        );
        assert_eq!(PixelFormat::YUYV.to_string(), "YUYV");
    }

    #[test]
    fn test_rgb_convertibility() {
        assert!(PixelFormat::YUYV.is_rgb_convertible());
        assert!(PixelFormat::RGB32.is_rgb_convertible());
        assert!(!PixelFormat::MJPEG.is_rgb_convertible());
        assert!(!PixelFormat::H264.is_rgb_convertible());
        assert!(!PixelFormat::Other(*b"ABCD").is_rgb_convertible());
    }

    #[test]
    fn test_media_type_sizes() {
        let yuyv = MediaType::new(PixelFormat::YUYV, 640, 480);
        assert_eq!(yuyv.sample_size, 640 * 480 * 2);
        assert_eq!(yuyv.as_rgb24().sample_size, 640 * 480 * 3);
        assert_eq!(MediaType::new(PixelFormat::MJPEG, 640, 480).sample_size, 0);
    }

    #[test]
    fn test_video_format_equality_ignores_size() {
        let a = VideoFormat::new(PixelFormat::YUYV, 640, 480, 614_400);
        let b = VideoFormat::new(PixelFormat::YUYV, 640, 480, 1);
        let c = VideoFormat::new(PixelFormat::YUYV, 320, 240, 614_400);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_device_validity() {
        let mut device = DeviceDescriptor {
            friendly_name: "cam".to_string(),
            description: String::new(),
            path: "/dev/video0".to_string(),
            supported_formats: vec![VideoFormat::new(PixelFormat::YUYV, 0, 0, 0)],
        };
        assert!(!device.is_valid());
        device
            .supported_formats
            .push(VideoFormat::new(PixelFormat::YUYV, 640, 480, 614_400));
        assert!(device.is_valid());
    }

    #[test]
    fn test_property_clamp() {
        let info = PropertyInfo {
            property: CameraProperty::Brightness,
            minimum: -64,
            maximum: 64,
            step: 4,
            default_value: 0,
            value: 0,
            supports_auto: false,
            is_auto: false,
        };
        assert_eq!(info.clamp(100), 64);
        assert_eq!(info.clamp(-100), -64);
        assert_eq!(info.clamp(7), 4);
    }

    #[test]
    fn test_enodev_maps_to_disconnected() {
        let err = BackendError::from(std::io::Error::from_raw_os_error(19));
        assert!(matches!(err, BackendError::Disconnected(_)));
    }
}
