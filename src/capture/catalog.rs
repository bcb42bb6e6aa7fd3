// SPDX-License-Identifier: GPL-3.0-only

//! Catalog of the formats a bound device can negotiate
//!
//! Each entry keeps the backend's native descriptor next to its value view.
//! Lookups come in two flavours on purpose: by value (`index_of`) for
//! formats a caller describes, and by identity (`index_of_native`) for the
//! exact descriptor the backend reports as active.

use crate::backends::camera::{
    BackendResult, CaptureBackend, FormatDescriptor, StreamControlHandle, VideoFormat,
};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// One negotiable format
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub format: VideoFormat,
    pub descriptor: FormatDescriptor,
}

impl From<FormatDescriptor> for CatalogEntry {
    fn from(descriptor: FormatDescriptor) -> Self {
        Self {
            format: VideoFormat::from(&descriptor.media_type),
            descriptor,
        }
    }
}

/// Ordered set of formats, in the order the device reported them
#[derive(Debug, Clone, Default)]
pub struct VideoFormatCatalog {
    entries: Vec<CatalogEntry>,
}

impl VideoFormatCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog straight from descriptors, keeping their order
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = FormatDescriptor>) -> Self {
        Self {
            entries: descriptors.into_iter().map(CatalogEntry::from).collect(),
        }
    }

    /// Replace the contents with everything the stream control reports
    ///
    /// Order and duplicates are kept as reported. On failure the catalog
    /// is left empty.
    pub fn update(
        &mut self,
        backend: &dyn CaptureBackend,
        stream: StreamControlHandle,
    ) -> BackendResult<()> {
        self.entries.clear();
        let descriptors = backend.stream_formats(stream)?;
        self.entries = descriptors.into_iter().map(CatalogEntry::from).collect();
        debug!(count = self.entries.len(), "Format catalog updated");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VideoFormat> {
        self.entries.get(index).map(|entry| &entry.format)
    }

    pub fn descriptor(&self, index: usize) -> Option<&FormatDescriptor> {
        self.entries.get(index).map(|entry| &entry.descriptor)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Value views of all entries
    pub fn formats(&self) -> Vec<VideoFormat> {
        self.entries.iter().map(|entry| entry.format).collect()
    }

    /// First entry equal in `(pixel_format, width, height)`
    pub fn index_of(&self, format: &VideoFormat) -> Option<usize> {
        self.entries.iter().position(|entry| entry.format == *format)
    }

    /// Entry holding exactly this descriptor allocation
    pub fn index_of_native(&self, descriptor: &FormatDescriptor) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.descriptor, descriptor))
    }

    /// Enumeration policy: group by format, largest first, no duplicates
    ///
    /// Duplicates are `(pixel_format, width, height)`-equal entries; the
    /// largest one survives.
    pub fn dedup_sorted(formats: impl IntoIterator<Item = VideoFormat>) -> Vec<VideoFormat> {
        let mut sorted: Vec<VideoFormat> = formats.into_iter().collect();
        sorted.sort_by_key(|f| {
            (
                f.pixel_format,
                Reverse(f.total_size),
                Reverse(f.width as u64 * f.height as u64),
                Reverse(f.width),
            )
        });

        let mut seen = HashSet::new();
        sorted.retain(|f| seen.insert(*f));
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{MediaType, NativeFormat, PixelFormat};

    fn descriptor(index: u32, pixel_format: PixelFormat, width: u32, height: u32) -> FormatDescriptor {
        Arc::new(NativeFormat {
            index,
            media_type: MediaType::new(pixel_format, width, height),
        })
    }

    #[test]
    fn test_value_lookup() {
        let catalog = VideoFormatCatalog::from_descriptors([
            descriptor(0, PixelFormat::YUYV, 1280, 720),
            descriptor(1, PixelFormat::YUYV, 640, 480),
        ]);
        let wanted = VideoFormat::new(PixelFormat::YUYV, 640, 480, 0);
        assert_eq!(catalog.index_of(&wanted), Some(1));

        let missing = VideoFormat::new(PixelFormat::MJPEG, 640, 480, 0);
        assert_eq!(catalog.index_of(&missing), None);
    }

    #[test]
    fn test_identity_lookup() {
        let active = descriptor(1, PixelFormat::YUYV, 640, 480);
        let catalog = VideoFormatCatalog::from_descriptors([
            descriptor(0, PixelFormat::YUYV, 1280, 720),
            Arc::clone(&active),
        ]);
        assert_eq!(catalog.index_of_native(&active), Some(1));

        // Equal by value, different allocation
        let lookalike = descriptor(1, PixelFormat::YUYV, 640, 480);
        assert_eq!(catalog.index_of_native(&lookalike), None);
        assert_eq!(catalog.index_of(&VideoFormat::from(&lookalike.media_type)), Some(1));
    }

    #[test]
    fn test_duplicates_kept_as_reported() {
        let catalog = VideoFormatCatalog::from_descriptors([
            descriptor(0, PixelFormat::YUYV, 640, 480),
            descriptor(1, PixelFormat::YUYV, 640, 480),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.index_of(&catalog.formats()[1]), Some(0));
    }

    #[test]
    fn test_dedup_sorted_policy() {
        let formats = vec![
            VideoFormat::new(PixelFormat::YUYV, 640, 480, 614_400),
            VideoFormat::new(PixelFormat::MJPEG, 1280, 720, 1_843_200),
            VideoFormat::new(PixelFormat::YUYV, 1280, 720, 1_843_200),
            VideoFormat::new(PixelFormat::YUYV, 640, 480, 614_400),
            VideoFormat::new(PixelFormat::MJPEG, 640, 480, 614_400),
        ];
        let sorted = VideoFormatCatalog::dedup_sorted(formats);
        assert_eq!(
            sorted,
            vec![
                VideoFormat::new(PixelFormat::YUYV, 1280, 720, 0),
                VideoFormat::new(PixelFormat::YUYV, 640, 480, 0),
                VideoFormat::new(PixelFormat::MJPEG, 1280, 720, 0),
                VideoFormat::new(PixelFormat::MJPEG, 640, 480, 0),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let mut catalog =
            VideoFormatCatalog::from_descriptors([descriptor(0, PixelFormat::RGB24, 2, 2)]);
        assert!(!catalog.is_empty());
        catalog.clear();
        assert!(catalog.is_empty());
        assert!(catalog.get(0).is_none());
    }
}
