//! Frame source abstraction
//!
//! A frame source is the camera/encoder side of the pipeline. It is driven by
//! the dedicated capture thread, which calls [`FrameSource::read_frame`] in a
//! loop and pushes every buffer into the relay.

use bytes::Bytes;
use std::sync::Arc;

use super::command::CommandSource;
use super::pattern::TestPatternSource;
use crate::config::{CaptureConfig, SourceKind};
use crate::error::Result;

/// Callback that unblocks a source stuck in `read_frame` from another thread
pub type Interrupter = Arc<dyn Fn() + Send + Sync>;

/// Builds a source for a capture configuration
pub type SourceFactory = Box<dyn Fn(&CaptureConfig) -> Box<dyn FrameSource> + Send + Sync>;

/// Producer of encoded JPEG frames
pub trait FrameSource: Send {
    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Acquire the device or spawn the encoder
    fn open(&mut self) -> Result<()>;

    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` once the source has ended (encoder exited or
    /// interrupted).
    fn read_frame(&mut self) -> Result<Option<Bytes>>;

    /// Release the device. Must tolerate being called more than once.
    fn close(&mut self) -> Result<()>;

    /// Handle used by `stop()` to break a blocking read
    fn interrupter(&self) -> Option<Interrupter> {
        None
    }
}

/// Build the frame source selected in the configuration
pub fn build_source(config: &CaptureConfig, max_frame_bytes: usize) -> Box<dyn FrameSource> {
    match config.source {
        SourceKind::Command => Box::new(CommandSource::from_config(config, max_frame_bytes)),
        SourceKind::Pattern => Box::new(TestPatternSource::from_config(config)),
    }
}
