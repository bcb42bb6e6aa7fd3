// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion to packed RGB24
//!
//! The grabber stage of every backend emits either the native sample or
//! RGB24. These are the conversions behind the RGB24 path. Output is always
//! exactly `width * height * 3` bytes; a short input leaves the missing
//! pixels black.

use super::types::{MediaType, PixelFormat};

/// Convert one sample of `source` to RGB24
///
/// Returns `None` for compressed and unknown layouts.
pub fn to_rgb24(source: &MediaType, data: &[u8]) -> Option<Vec<u8>> {
    let (w, h) = (source.width, source.height);
    let rgb = match source.pixel_format {
        PixelFormat::RGB24 => copy_rgb24(data, w, h),
        PixelFormat::RGB32 | PixelFormat::ARGB32 => bgrx_to_rgb24(data, w, h),
        PixelFormat::RGB565 => rgb565_to_rgb24(data, w, h),
        PixelFormat::RGB555 => rgb555_to_rgb24(data, w, h),
        PixelFormat::YUYV => packed_422_to_rgb24(data, w, h, Packed422::Yuyv),
        PixelFormat::UYVY => packed_422_to_rgb24(data, w, h, Packed422::Uyvy),
        PixelFormat::NV12 => nv12_to_rgb24(data, w, h),
        PixelFormat::I420 => planar_420_to_rgb24(data, w, h, false),
        PixelFormat::YV12 => planar_420_to_rgb24(data, w, h, true),
        PixelFormat::Gray8 => gray8_to_rgb24(data, w, h),
        PixelFormat::MJPEG | PixelFormat::H264 | PixelFormat::Other(_) => return None,
    };
    Some(rgb)
}

/// YUV to RGB (BT.601)
#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

/// Pad or cut to the exact RGB24 frame size
fn finish(mut rgb: Vec<u8>, width: u32, height: u32) -> Vec<u8> {
    rgb.resize(pixel_count(width, height) * 3, 0);
    rgb
}

fn copy_rgb24(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let len = (pixel_count(width, height) * 3).min(data.len());
    finish(data[..len].to_vec(), width, height)
}

/// 32-bit layouts are B G R X in memory
fn bgrx_to_rgb24(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixel_count(width, height) * 3);
    for px in data.chunks_exact(4).take(pixel_count(width, height)) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    finish(rgb, width, height)
}

fn rgb565_to_rgb24(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixel_count(width, height) * 3);
    for px in data.chunks_exact(2).take(pixel_count(width, height)) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let r = ((v >> 11) & 0x1F) as u8;
        let g = ((v >> 5) & 0x3F) as u8;
        let b = (v & 0x1F) as u8;
        rgb.extend_from_slice(&[(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]);
    }
    finish(rgb, width, height)
}

fn rgb555_to_rgb24(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixel_count(width, height) * 3);
    for px in data.chunks_exact(2).take(pixel_count(width, height)) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let r = ((v >> 10) & 0x1F) as u8;
        let g = ((v >> 5) & 0x1F) as u8;
        let b = (v & 0x1F) as u8;
        rgb.extend_from_slice(&[(r << 3) | (r >> 2), (g << 3) | (g >> 2), (b << 3) | (b >> 2)]);
    }
    finish(rgb, width, height)
}

#[derive(Clone, Copy)]
enum Packed422 {
    /// Y0 U Y1 V
    Yuyv,
    /// U Y0 V Y1
    Uyvy,
}

/// Packed 4:2:2, each 4-byte group encodes 2 pixels
fn packed_422_to_rgb24(data: &[u8], width: u32, height: u32, layout: Packed422) -> Vec<u8> {
    let pixels = pixel_count(width, height);
    let mut rgb = Vec::with_capacity(pixels * 3);

    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = match layout {
            Packed422::Yuyv => (chunk[0], chunk[1], chunk[2], chunk[3]),
            Packed422::Uyvy => (chunk[1], chunk[0], chunk[3], chunk[2]),
        };
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
        if rgb.len() >= pixels * 3 {
            break;
        }
    }

    finish(rgb, width, height)
}

/// Y plane followed by interleaved U/V at quarter resolution
fn nv12_to_rgb24(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let y_plane = w * h;
    let chroma_stride = w.div_ceil(2) * 2;
    let mut rgb = Vec::with_capacity(y_plane * 3);

    for row in 0..h {
        for col in 0..w {
            let (Some(&y), Some(&u), Some(&v)) = (
                data.get(row * w + col),
                data.get(y_plane + (row / 2) * chroma_stride + (col / 2) * 2),
                data.get(y_plane + (row / 2) * chroma_stride + (col / 2) * 2 + 1),
            ) else {
                return finish(rgb, width, height);
            };
            rgb.extend_from_slice(&yuv_to_rgb(y, u, v));
        }
    }
    rgb
}

/// Three planes, Y then U then V (or V then U for YV12)
fn planar_420_to_rgb24(data: &[u8], width: u32, height: u32, v_first: bool) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let y_plane = w * h;
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let (first, second) = (y_plane, y_plane + cw * ch);
    let (u_base, v_base) = if v_first { (second, first) } else { (first, second) };
    let mut rgb = Vec::with_capacity(y_plane * 3);

    for row in 0..h {
        for col in 0..w {
            let chroma = (row / 2) * cw + col / 2;
            let (Some(&y), Some(&u), Some(&v)) = (
                data.get(row * w + col),
                data.get(u_base + chroma),
                data.get(v_base + chroma),
            ) else {
                return finish(rgb, width, height);
            };
            rgb.extend_from_slice(&yuv_to_rgb(y, u, v));
        }
    }
    rgb
}

fn gray8_to_rgb24(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixel_count(width, height) * 3);
    for &gray in data.iter().take(pixel_count(width, height)) {
        rgb.extend_from_slice(&[gray, gray, gray]);
    }
    finish(rgb, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(pixel_format: PixelFormat, width: u32, height: u32) -> MediaType {
        MediaType::new(pixel_format, width, height)
    }

    #[test]
    fn test_yuyv_white_and_black() {
        // Y=255 then Y=0, neutral chroma
        let yuyv = vec![255u8, 128, 0, 128];
        let rgb = to_rgb24(&media(PixelFormat::YUYV, 2, 1), &yuyv).unwrap();

        assert_eq!(rgb.len(), 6);
        assert!(rgb[..3].iter().all(|&c| c > 250));
        assert!(rgb[3..].iter().all(|&c| c < 5));
    }

    #[test]
    fn test_uyvy_matches_yuyv() {
        let yuyv = vec![200u8, 90, 60, 170];
        let uyvy = vec![90u8, 200, 170, 60];
        assert_eq!(
            to_rgb24(&media(PixelFormat::YUYV, 2, 1), &yuyv),
            to_rgb24(&media(PixelFormat::UYVY, 2, 1), &uyvy)
        );
    }

    #[test]
    fn test_bgrx_swaps_channels() {
        let bgrx = vec![10u8, 20, 30, 0, 40, 50, 60, 0];
        let rgb = to_rgb24(&media(PixelFormat::RGB32, 2, 1), &bgrx).unwrap();
        assert_eq!(rgb, vec![30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_rgb565_extremes() {
        let data = 0xFFFFu16.to_le_bytes().into_iter().chain(0u16.to_le_bytes()).collect::<Vec<_>>();
        let rgb = to_rgb24(&media(PixelFormat::RGB565, 2, 1), &data).unwrap();
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_planar_formats_size() {
        let i420 = media(PixelFormat::I420, 4, 2);
        let nv12 = media(PixelFormat::NV12, 4, 2);
        let data = vec![128u8; i420.sample_size];

        assert_eq!(to_rgb24(&i420, &data).unwrap().len(), 4 * 2 * 3);
        assert_eq!(to_rgb24(&nv12, &data).unwrap().len(), 4 * 2 * 3);
        assert_eq!(to_rgb24(&media(PixelFormat::YV12, 4, 2), &data).unwrap().len(), 24);
    }

    #[test]
    fn test_short_input_is_padded() {
        let rgb = to_rgb24(&media(PixelFormat::Gray8, 4, 4), &[7u8; 5]).unwrap();
        assert_eq!(rgb.len(), 4 * 4 * 3);
        assert_eq!(&rgb[..3], &[7, 7, 7]);
        assert!(rgb[15..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_compressed_is_not_converted() {
        let mjpeg = media(PixelFormat::MJPEG, 4, 4).with_sample_size(64);
        assert!(to_rgb24(&mjpeg, &[0xFF, 0xD8, 0xFF, 0xD9]).is_none());
        assert!(to_rgb24(&media(PixelFormat::Other(*b"ABCD"), 4, 4), &[]).is_none());
    }
}
