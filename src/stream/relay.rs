//! Single-slot frame relay
//!
//! Bridges the capture thread to every HTTP reader. The relay keeps only the
//! most recent frame plus a sequence counter; each reader tracks the last
//! sequence it saw and waits until the counter moves past it. Frames pushed
//! while a reader is busy are coalesced: the reader wakes up to the latest one.
//!
//! # Contract
//!
//! - Exactly one producer calls [`FrameRelay::push`]. Concurrent pushes from
//!   several threads are not supported (not enforced at runtime).
//! - Any number of readers may call [`FrameRelay::next`] (async tasks) or
//!   [`FrameRelay::next_blocking`] (plain threads) concurrently.
//! - The internal lock is held only to swap or copy the slot, never across I/O
//!   or an `.await`, so slow readers cannot stall the producer.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::{AppError, Result};
use crate::video::Frame;

/// Default upper bound for a single frame (16 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

struct Slot {
    latest: Option<Frame>,
    sequence: u64,
}

impl Slot {
    fn newer_than(&self, cursor: u64) -> Option<(Frame, u64)> {
        match self.latest {
            Some(ref frame) if self.sequence != cursor => Some((frame.clone(), self.sequence)),
            _ => None,
        }
    }
}

/// Waitable latest-value slot shared by the producer and all readers
pub struct FrameRelay {
    slot: Mutex<Slot>,
    /// Wakes readers parked in `next_blocking`
    cond: Condvar,
    /// Wakes readers awaiting in `next`
    notify: Notify,
    max_frame_bytes: usize,
}

impl FrameRelay {
    /// Cursor for a reader that has not seen any frame yet.
    ///
    /// The first push produces sequence 1, so a reader starting here always
    /// waits for a real frame.
    pub const START: u64 = 0;

    /// Create a relay with the default frame size limit
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a relay rejecting frames larger than `max_frame_bytes`
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            slot: Mutex::new(Slot {
                latest: None,
                sequence: 0,
            }),
            cond: Condvar::new(),
            notify: Notify::new(),
            max_frame_bytes,
        }
    }

    /// Replace the current frame and wake every waiting reader.
    ///
    /// Returns the sequence number assigned to the frame. An oversized payload
    /// is rejected with [`AppError::InvalidFrame`]; the slot and the counter
    /// are left untouched and nobody is woken. Empty payloads are accepted.
    pub fn push(&self, data: impl Into<Bytes>) -> Result<u64> {
        let data = data.into();
        if data.len() > self.max_frame_bytes {
            return Err(AppError::InvalidFrame {
                len: data.len(),
                limit: self.max_frame_bytes,
            });
        }

        let sequence = {
            let mut slot = self.slot.lock();
            slot.sequence += 1;
            let sequence = slot.sequence;
            slot.latest = Some(Frame::new(data, sequence));
            sequence
        };

        self.cond.notify_all();
        self.notify.notify_waiters();
        Ok(sequence)
    }

    /// Wait until a frame newer than `cursor` exists and return it together
    /// with its sequence number (the reader's new cursor).
    pub async fn next(&self, cursor: u64) -> (Frame, u64) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed
            notified.as_mut().enable();

            let ready = self.slot.lock().newer_than(cursor);
            if let Some(next) = ready {
                return next;
            }

            notified.await;
        }
    }

    /// Like [`next`](Self::next), giving up after `timeout`
    pub async fn next_timeout(&self, cursor: u64, timeout: Duration) -> Option<(Frame, u64)> {
        tokio::time::timeout(timeout, self.next(cursor)).await.ok()
    }

    /// Thread-blocking variant of [`next`](Self::next)
    pub fn next_blocking(&self, cursor: u64) -> (Frame, u64) {
        let mut slot = self.slot.lock();
        loop {
            if let Some(next) = slot.newer_than(cursor) {
                return next;
            }
            self.cond.wait(&mut slot);
        }
    }

    /// Wait for at least one frame and return the current one
    pub async fn snapshot(&self) -> Frame {
        self.next(Self::START).await.0
    }

    /// Current frame without waiting
    pub fn latest(&self) -> Option<Frame> {
        self.slot.lock().latest.clone()
    }

    /// Sequence number of the current frame (0 before the first push)
    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Largest payload accepted by `push`
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}
