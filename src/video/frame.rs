//! Video frame data structures

use bytes::Bytes;

/// JPEG start-of-image marker
pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
pub const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// One complete encoded JPEG image.
///
/// The payload is opaque and never mutated after construction. Cloning is
/// cheap (reference counted), so a reader holding a `Frame` keeps its view
/// even after the relay has moved on to a newer one.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded image data
    data: Bytes,
    /// Relay sequence number assigned on push
    sequence: u64,
}

impl Frame {
    /// Create a new frame
    pub fn new(data: Bytes, sequence: u64) -> Self {
        Self { data, sequence }
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sequence number assigned by the relay
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

}

/// Check for SOI at the start and EOI at the end of `data`
pub fn is_complete_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == JPEG_SOI && data[data.len() - 2..] == JPEG_EOI
}
