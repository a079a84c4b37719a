//! Configuration
//!
//! Settings come from an optional TOML file; CLI flags override them in `main`.

mod loader;
mod schema;

pub use loader::{load_config, parse_config, CONFIG_ENV};
pub use schema::{AppConfig, CaptureConfig, SourceKind, StreamConfig, WebConfig, MAX_DIMENSION};
