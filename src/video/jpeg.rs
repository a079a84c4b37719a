//! Splitting a concatenated MJPEG byte stream into frames
//!
//! Encoders such as `rpicam-vid --codec mjpeg -o -` write JPEG images back to
//! back with no framing. Inside entropy-coded data every `0xFF` is stuffed
//! (`FF 00`), so the first EOI marker after an SOI ends the image.

use bytes::{Buf, Bytes, BytesMut};

use super::frame::{JPEG_EOI, JPEG_SOI};

/// Incremental SOI/EOI frame splitter
pub struct JpegSplitter {
    buf: BytesMut,
    /// Offset from which the EOI search resumes (buffer starts at SOI)
    scan_from: usize,
    max_frame_bytes: usize,
    discarded: u64,
}

impl JpegSplitter {
    /// Create a splitter dropping partial frames larger than `max_frame_bytes`
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256 * 1024),
            scan_from: 2,
            max_frame_bytes,
            discarded: 0,
        }
    }

    /// Append raw bytes read from the encoder
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Total bytes thrown away (garbage between frames, oversized frames)
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Bytes waiting for the rest of their frame
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete JPEG, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if !self.align_to_soi() {
            return None;
        }

        match find_marker(&self.buf, JPEG_EOI, self.scan_from) {
            Some(eoi) => {
                let frame = self.buf.split_to(eoi + 2).freeze();
                self.scan_from = 2;
                Some(frame)
            }
            None => {
                if self.buf.len() > self.max_frame_bytes {
                    self.discarded += self.buf.len() as u64;
                    self.buf.clear();
                    self.scan_from = 2;
                } else {
                    // Resume one byte early in case the marker straddles reads
                    self.scan_from = self.buf.len().saturating_sub(1).max(2);
                }
                None
            }
        }
    }

    /// Drop bytes before the first SOI. Returns false if none is buffered.
    fn align_to_soi(&mut self) -> bool {
        if self.buf.starts_with(&JPEG_SOI) {
            return true;
        }

        match find_marker(&self.buf, JPEG_SOI, 0) {
            Some(start) => {
                self.discarded += start as u64;
                self.buf.advance(start);
                self.scan_from = 2;
                true
            }
            None => {
                // Keep a trailing 0xFF, it may be the first half of an SOI
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let drop = self.buf.len() - keep;
                self.discarded += drop as u64;
                self.buf.advance(drop);
                false
            }
        }
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
