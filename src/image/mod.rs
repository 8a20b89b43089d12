//! Camera frame reassembly.
//!
//! The board streams one 96×96 grayscale frame as a run of notifications on
//! the image chunk characteristic. There is no framing: a frame is complete
//! once enough bytes have arrived. Each byte carries a pixel shifted into
//! the signed range the model expects (`pixel - 128`).

pub mod export;
pub mod reassembler;

use bytes::Bytes;

use crate::utils::to_hex_csv;

pub use export::ImageExporter;
pub use reassembler::ImageReassembler;

/// Frame width in pixels.
pub const IMAGE_WIDTH: usize = 96;
/// Frame height in pixels.
pub const IMAGE_HEIGHT: usize = 96;
/// Bytes in one complete frame.
pub const EXPECTED_IMAGE_SIZE: usize = IMAGE_WIDTH * IMAGE_HEIGHT;

/// Shift a pixel into the device's signed encoding.
#[inline]
pub fn encode_pixel(pixel: u8) -> u8 {
    pixel.wrapping_sub(128)
}

/// Recover a pixel from the device's signed encoding.
#[inline]
pub fn decode_pixel(byte: u8) -> u8 {
    byte.wrapping_add(128)
}

/// Decode a whole payload.
pub fn decode_pixels(payload: &[u8]) -> Vec<u8> {
    payload.iter().copied().map(decode_pixel).collect()
}

/// Bytes accumulated for the frame in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    data: Vec<u8>,
    expected: usize,
}

impl ImageBuffer {
    /// Create an empty buffer for frames of `expected` bytes.
    pub fn new(expected: usize) -> Self {
        Self {
            data: Vec::with_capacity(expected),
            expected,
        }
    }

    /// Append a chunk. Returns the finished frame once `expected` bytes are
    /// in, after which the buffer is empty again.
    ///
    /// Bytes past the boundary in the completing chunk are discarded.
    pub fn append(&mut self, chunk: &[u8]) -> Option<CompletedImage> {
        self.data.extend_from_slice(chunk);

        if self.data.len() < self.expected {
            return None;
        }

        let overflow = self.data.len() - self.expected;
        self.data.truncate(self.expected);
        let raw = std::mem::replace(&mut self.data, Vec::with_capacity(self.expected));

        Some(CompletedImage::from_device_bytes(&raw, overflow))
    }

    /// Drop anything accumulated.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes in a complete frame.
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Fraction of the frame received (0.0 - 1.0).
    pub fn progress(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.expected as f64
    }
}

impl Default for ImageBuffer {
    fn default() -> Self {
        Self::new(EXPECTED_IMAGE_SIZE)
    }
}

/// A finished frame with pixels already decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedImage {
    pixels: Bytes,
    discarded: usize,
}

impl CompletedImage {
    fn from_device_bytes(raw: &[u8], discarded: usize) -> Self {
        Self {
            pixels: Bytes::from(decode_pixels(raw)),
            discarded,
        }
    }

    /// Decoded grayscale pixels, row-major.
    pub fn pixels(&self) -> &Bytes {
        &self.pixels
    }

    /// Raw binary export encoding.
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Comma-joined uppercase hex export encoding.
    pub fn to_hex_csv(&self) -> String {
        to_hex_csv(&self.pixels)
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Check if the frame is empty.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Bytes past the frame boundary that arrived in the completing chunk.
    pub fn discarded(&self) -> usize {
        self.discarded
    }
}
