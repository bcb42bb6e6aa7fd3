// SPDX-License-Identifier: GPL-3.0-only

//! Device and format enumeration through the v4l crate

use crate::backends::camera::types::{
    DeviceDescriptor, FormatDescriptor, Framerate, MediaType, NativeFormat, PixelFormat, VideoFormat,
};
use crate::constants::v4l2::{COMPRESSED_BYTES_PER_PIXEL, DEVICE_DIR, NODE_PREFIX, STEPWISE_SIZES};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// One negotiable format together with the FourCC the driver reported
#[derive(Debug, Clone)]
pub struct DeviceFormat {
    pub fourcc: FourCC,
    pub descriptor: FormatDescriptor,
}

/// `/dev/video*` nodes ordered by their number
pub fn video_nodes() -> Vec<PathBuf> {
    let mut nodes: Vec<(u32, PathBuf)> = std::fs::read_dir(DEVICE_DIR)
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let number = path
                .file_name()?
                .to_str()?
                .strip_prefix(NODE_PREFIX)?
                .parse::<u32>()
                .ok()?;
            Some((number, path))
        })
        .collect();
    nodes.sort_by_key(|(number, _)| *number);
    nodes.into_iter().map(|(_, path)| path).collect()
}

/// Describe a node if it is a video capture device with at least one format
pub fn probe(path: &Path) -> Option<(DeviceDescriptor, Vec<DeviceFormat>)> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return None;
    }

    let formats = device_formats(&dev);
    if formats.is_empty() {
        // Metadata nodes of UVC devices land here
        debug!(path = %path.display(), "Capture node without formats skipped");
        return None;
    }

    let descriptor = DeviceDescriptor {
        friendly_name: caps.card.clone(),
        description: format!("{} ({})", caps.driver, caps.bus),
        path: path.to_string_lossy().to_string(),
        supported_formats: formats
            .iter()
            .map(|f| VideoFormat::from(&f.descriptor.media_type))
            .collect(),
    };
    Some((descriptor, formats))
}

/// Every (FourCC, size) pair the device reports, in driver order
pub fn device_formats(dev: &Device) -> Vec<DeviceFormat> {
    let descriptions = match dev.enum_formats() {
        Ok(descriptions) => descriptions,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate formats");
            return Vec::new();
        }
    };

    let mut formats = Vec::new();
    for description in descriptions {
        let fourcc = description.fourcc;
        let pixel_format = PixelFormat::from_fourcc(&fourcc.repr);

        for (width, height) in frame_sizes(dev, fourcc) {
            let mut media = MediaType::new(pixel_format, width, height);
            if media.sample_size == 0 {
                media.sample_size = width as usize * height as usize * COMPRESSED_BYTES_PER_PIXEL;
            }
            if let Some(framerate) = best_framerate(dev, fourcc, width, height) {
                media = media.with_framerate(framerate);
            }

            let index = formats.len() as u32;
            formats.push(DeviceFormat {
                fourcc,
                descriptor: Arc::new(NativeFormat { index, media_type: media }),
            });
        }
    }
    formats
}

fn frame_sizes(dev: &Device, fourcc: FourCC) -> Vec<(u32, u32)> {
    let Ok(sizes) = dev.enum_framesizes(fourcc) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for size in sizes {
        match size.size {
            FrameSizeEnum::Discrete(discrete) => out.push((discrete.width, discrete.height)),
            FrameSizeEnum::Stepwise(stepwise) => {
                out.extend(STEPWISE_SIZES.iter().copied().filter(|&(w, h)| {
                    (stepwise.min_width..=stepwise.max_width).contains(&w)
                        && (stepwise.min_height..=stepwise.max_height).contains(&h)
                }));
                if !out.contains(&(stepwise.max_width, stepwise.max_height)) {
                    out.push((stepwise.max_width, stepwise.max_height));
                }
            }
        }
    }
    out
}

/// Highest frame rate offered for a size
fn best_framerate(dev: &Device, fourcc: FourCC, width: u32, height: u32) -> Option<Framerate> {
    dev.enum_frameintervals(fourcc, width, height)
        .ok()?
        .into_iter()
        .filter_map(|interval| {
            // Interval is seconds per frame, the rate is its inverse
            let fastest = match interval.interval {
                FrameIntervalEnum::Discrete(fraction) => fraction,
                FrameIntervalEnum::Stepwise(stepwise) => stepwise.min,
            };
            (fastest.numerator > 0 && fastest.denominator > 0)
                .then(|| Framerate::new(fastest.denominator, fastest.numerator))
        })
        .max_by(|a, b| a.as_f64().total_cmp(&b.as_f64()))
}
