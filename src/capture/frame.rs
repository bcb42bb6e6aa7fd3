// SPDX-License-Identifier: GPL-3.0-only

//! Single mutable image buffer with a version stamp

use crate::backends::camera::PixelFormat;
use crate::constants::grabber::EMPTY_VERSION;
use crate::errors::CaptureResult;

/// One image worth of bytes plus the metadata describing them
///
/// The version stamp grows by one for every written sample, wraps to 1
/// instead of 0, and stays 0 only while nothing has ever been written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    size: usize,
    width: u32,
    height: u32,
    pixel_format: Option<PixelFormat>,
    version: u64,
    payload_len: usize,
    /// Samples written since the last allocation
    produced: u64,
}

/// Version that follows `version`, skipping 0
pub fn next_version(version: u64) -> u64 {
    match version.wrapping_add(1) {
        EMPTY_VERSION => 1,
        next => next,
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reallocate to `size` zeroed bytes and forget any produced data
    ///
    /// The version stamp is kept so readers never see it go backwards.
    pub fn allocate(&mut self, pixel_format: PixelFormat, size: usize) {
        self.data = vec![0; size];
        self.size = size;
        self.pixel_format = Some(pixel_format);
        self.payload_len = 0;
        self.produced = 0;
    }

    /// Describe the image geometry without touching the bytes
    pub fn set_metadata(&mut self, width: u32, height: u32, pixel_format: PixelFormat) {
        self.width = width;
        self.height = height;
        self.pixel_format = Some(pixel_format);
    }

    /// Store one sample, growing the buffer first if the sample is larger
    ///
    /// The declared size window is always fully rewritten: sample bytes
    /// first, zeros after them. Returns true when the buffer had to grow.
    pub fn write_sample(&mut self, sample: &[u8]) -> bool {
        let resized = sample.len() > self.size;
        if resized {
            self.data = vec![0; sample.len()];
            self.size = sample.len();
        }

        self.data[..sample.len()].copy_from_slice(sample);
        self.data[sample.len()..self.size].fill(0);
        self.payload_len = sample.len();
        self.version = next_version(self.version);
        self.produced += 1;
        resized
    }

    /// Copy bytes, size and version into `out`
    ///
    /// `out` is only modified once the copy fully succeeded.
    pub fn copy_into(&self, out: &mut FrameBuffer) -> CaptureResult<()> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(self.size)?;
        bytes.extend_from_slice(&self.data[..self.size]);

        out.data = bytes;
        out.size = self.size;
        out.version = self.version;
        out.payload_len = self.payload_len;
        out.produced = self.produced;
        if out.pixel_format.is_none() {
            out.pixel_format = self.pixel_format;
        }
        Ok(())
    }

    /// Move the contents out, leaving an empty buffer behind
    pub fn take(&mut self) -> FrameBuffer {
        std::mem::take(self)
    }

    /// The declared size window of the buffer
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Allocated capacity, always at least `size()`
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.pixel_format
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Length of the last sample as delivered by the backend
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// True until a sample has been written since the last allocation
    pub fn is_empty(&self) -> bool {
        self.produced == 0
    }

    #[cfg(test)]
    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
