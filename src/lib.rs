//! camrelay - MJPEG live camera server
//!
//! A single capture thread feeds a latest-frame relay; any number of HTTP
//! clients read from it as a `multipart/x-mixed-replace` stream or as
//! one-off snapshots.

pub mod config;
pub mod error;
pub mod state;
pub mod stream;
pub mod video;
pub mod web;

pub use error::{AppError, Result};
