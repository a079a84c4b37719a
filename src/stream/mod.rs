//! Frame distribution
//!
//! # Components
//!
//! - `FrameRelay` - single-slot latest-frame mailbox between producer and readers
//! - `MjpegStreamer` - per-connection multipart/x-mixed-replace body

pub mod mjpeg;
pub mod relay;

pub use mjpeg::{create_mjpeg_part, ClientGuard, MjpegStreamer};
pub use relay::FrameRelay;
