// SPDX-License-Identifier: GPL-3.0-only

//! Test-pattern samples for virtual devices

use crate::backends::camera::{MediaType, PixelFormat};

/// Render sample `frame_no` in the given format
///
/// Raw formats fill exactly `sample_size` bytes. MJPEG samples are a
/// JPEG-framed payload shorter than `sample_size` whose length varies per
/// frame.
pub fn render(media: &MediaType, frame_no: u64) -> Vec<u8> {
    match media.pixel_format {
        PixelFormat::RGB24 => rgb24_bars(media.width, media.height, frame_no),
        PixelFormat::YUYV => yuyv_ramp(media.width, media.height, frame_no),
        PixelFormat::MJPEG => mjpeg_payload(media.sample_size, frame_no),
        _ => vec![(frame_no & 0xFF) as u8; media.sample_size],
    }
}

const BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Color bars scrolling one column per frame
fn rgb24_bars(width: u32, height: u32, frame_no: u64) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let mut data = Vec::with_capacity(width * height * 3);
    let bar_width = (width / BARS.len()).max(1);
    let shift = (frame_no as usize) % width.max(1);
    for _ in 0..height {
        for x in 0..width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            data.extend_from_slice(&BARS[bar]);
        }
    }
    data
}

/// Horizontal luma ramp with neutral chroma
fn yuyv_ramp(width: u32, height: u32, frame_no: u64) -> Vec<u8> {
    let width = width as usize;
    let height = height as usize;
    let mut data = Vec::with_capacity(width * height * 2);
    for _ in 0..height {
        for x in (0..width).step_by(2) {
            let y0 = ((x as u64 + frame_no) & 0xFF) as u8;
            let y1 = ((x as u64 + 1 + frame_no) & 0xFF) as u8;
            data.extend_from_slice(&[y0, 128, y1, 128]);
        }
    }
    data
}

/// SOI marker, filler, EOI marker
fn mjpeg_payload(max_size: usize, frame_no: u64) -> Vec<u8> {
    if max_size < 4 {
        return vec![0; max_size];
    }
    let len = (max_size / 4 + (frame_no as usize % 64)).clamp(4, max_size);
    let mut data = vec![(frame_no & 0xFF) as u8; len];
    data[..2].copy_from_slice(&[0xFF, 0xD8]);
    data[len - 2..].copy_from_slice(&[0xFF, 0xD9]);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_patterns_fill_sample_size() {
        let rgb = MediaType::new(PixelFormat::RGB24, 64, 8);
        assert_eq!(render(&rgb, 3).len(), rgb.sample_size);

        let yuyv = MediaType::new(PixelFormat::YUYV, 64, 8);
        assert_eq!(render(&yuyv, 3).len(), yuyv.sample_size);
    }

    #[test]
    fn test_mjpeg_payload_is_framed_and_short() {
        let mjpeg = MediaType::new(PixelFormat::MJPEG, 64, 48).with_sample_size(64 * 48 * 2);
        let sample = render(&mjpeg, 7);
        assert!(sample.len() < mjpeg.sample_size);
        assert_eq!(&sample[..2], &[0xFF, 0xD8]);
        assert_eq!(&sample[sample.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_frames_differ() {
        let rgb = MediaType::new(PixelFormat::RGB24, 32, 2);
        assert_ne!(render(&rgb, 0), render(&rgb, 1));
    }
}
