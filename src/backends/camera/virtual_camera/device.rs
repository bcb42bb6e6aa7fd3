// SPDX-License-Identifier: GPL-3.0-only

//! Virtual device definitions

use crate::backends::camera::{
    CameraProperty, DeviceDescriptor, FormatDescriptor, Framerate, MediaType, NativeFormat,
    PixelFormat, PropertyInfo, VideoFormat,
};
use std::sync::Arc;

/// A device the virtual backend can bind
///
/// Format descriptors are allocated once here, so every stream control
/// over this device hands out the same `Arc`s.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    pub friendly_name: String,
    pub description: String,
    pub path: String,
    formats: Vec<FormatDescriptor>,
    default_index: usize,
    properties: Vec<PropertyInfo>,
}

impl VirtualDevice {
    pub fn new(friendly_name: &str, path: &str) -> Self {
        Self {
            friendly_name: friendly_name.to_string(),
            description: "Virtual capture device".to_string(),
            path: path.to_string(),
            formats: Vec::new(),
            default_index: 0,
            properties: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Append a format; entries keep insertion order, duplicates included
    pub fn with_format(mut self, media_type: MediaType) -> Self {
        let index = self.formats.len() as u32;
        self.formats.push(Arc::new(NativeFormat { index, media_type }));
        self
    }

    /// Format active right after binding
    pub fn with_default_format(mut self, index: usize) -> Self {
        self.default_index = index;
        self
    }

    pub fn with_properties(mut self, properties: Vec<PropertyInfo>) -> Self {
        self.properties = properties;
        self
    }

    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    pub fn default_index(&self) -> usize {
        self.default_index.min(self.formats.len().saturating_sub(1))
    }

    pub fn properties(&self) -> &[PropertyInfo] {
        &self.properties
    }

    /// Enumeration view of this device
    pub fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            friendly_name: self.friendly_name.clone(),
            description: self.description.clone(),
            path: self.path.clone(),
            supported_formats: self
                .formats
                .iter()
                .map(|f| VideoFormat::from(&f.media_type))
                .collect(),
        }
    }
}

fn property(
    property: CameraProperty,
    (minimum, maximum, step): (i32, i32, i32),
    default_value: i32,
    supports_auto: bool,
) -> PropertyInfo {
    PropertyInfo {
        property,
        minimum,
        maximum,
        step,
        default_value,
        value: default_value,
        supports_auto,
        is_auto: supports_auto,
    }
}

/// Typical UVC webcam controls
pub fn webcam_properties() -> Vec<PropertyInfo> {
    vec![
        property(CameraProperty::Brightness, (-64, 64, 1), 0, false),
        property(CameraProperty::Contrast, (0, 100, 1), 50, false),
        property(CameraProperty::Saturation, (0, 100, 1), 60, false),
        property(CameraProperty::Sharpness, (0, 7, 1), 3, false),
        property(CameraProperty::Gamma, (72, 500, 1), 100, false),
        property(CameraProperty::WhiteBalance, (2800, 6500, 10), 4600, true),
        property(CameraProperty::Gain, (0, 255, 1), 32, true),
        property(CameraProperty::Exposure, (-13, -1, 1), -6, true),
        property(CameraProperty::Focus, (0, 250, 5), 0, true),
    ]
}

/// The devices shipped by `VirtualBackend::with_demo_devices`
pub fn demo_devices() -> Vec<VirtualDevice> {
    let fps30 = Framerate::from_int(30);
    vec![
        VirtualDevice::new("Virtual Webcam", "virtual:webcam0")
            .with_description("YUY2 test-pattern webcam")
            .with_format(MediaType::new(PixelFormat::YUYV, 1280, 720).with_framerate(Framerate::from_int(10)))
            .with_format(MediaType::new(PixelFormat::YUYV, 640, 480).with_framerate(fps30))
            .with_default_format(1)
            .with_properties(webcam_properties()),
        VirtualDevice::new("Virtual MJPEG Camera", "virtual:mjpeg0")
            .with_description("Motion-JPEG test-pattern camera")
            .with_format(
                MediaType::new(PixelFormat::MJPEG, 1280, 720)
                    .with_sample_size(1280 * 720 * 2)
                    .with_framerate(fps30),
            )
            .with_properties(vec![
                property(CameraProperty::Brightness, (0, 255, 1), 128, false),
                property(CameraProperty::Zoom, (100, 400, 10), 100, false),
            ]),
    ]
}
