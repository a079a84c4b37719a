//! Frame production
//!
//! Frame sources (external encoder process, test pattern), JPEG stream
//! splitting and the capture thread that feeds the relay.

pub mod capture;
pub mod command;
pub mod frame;
pub mod jpeg;
pub mod pattern;
pub mod source;

pub use capture::{CaptureService, CaptureState};
pub use command::CommandSource;
pub use frame::Frame;
pub use jpeg::JpegSplitter;
pub use pattern::TestPatternSource;
pub use source::{build_source, FrameSource, Interrupter, SourceFactory};
