use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::stream::relay::DEFAULT_MAX_FRAME_BYTES;

/// Largest accepted capture width or height
pub const MAX_DIMENSION: u32 = 8192;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Frame producer settings
    pub capture: CaptureConfig,
    /// Streaming settings
    pub stream: StreamConfig,
}

impl AppConfig {
    /// Check value ranges after loading and CLI overrides
    pub fn validate(&self) -> Result<()> {
        let capture = &self.capture;
        let dimensions = 1..=MAX_DIMENSION;
        if !dimensions.contains(&capture.width) || !dimensions.contains(&capture.height) {
            return Err(AppError::Config(format!(
                "Invalid resolution {}x{} (each side 1-{})",
                capture.width, capture.height, MAX_DIMENSION
            )));
        }
        if !(1..=120).contains(&capture.fps) {
            return Err(AppError::Config(format!(
                "Frame rate must be between 1 and 120, got {}",
                capture.fps
            )));
        }
        if !(1..=100).contains(&capture.quality) {
            return Err(AppError::Config(format!(
                "JPEG quality must be between 1 and 100, got {}",
                capture.quality
            )));
        }
        if self.stream.max_frame_bytes == 0 {
            return Err(AppError::Config("max_frame_bytes must be non-zero".to_string()));
        }
        if self.web.bind_address.trim().is_empty() {
            return Err(AppError::Config("bind_address must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address (all interfaces by default)
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8000,
        }
    }
}

/// Frame source kind
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// External MJPEG encoder writing concatenated JPEGs to stdout
    #[default]
    Command,
    /// Synthetic moving test pattern
    Pattern,
}

impl std::str::FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "command" => Ok(SourceKind::Command),
            "pattern" => Ok(SourceKind::Pattern),
            other => Err(AppError::Config(format!(
                "Unknown source '{}'. Valid sources: command, pattern",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Command => write!(f, "command"),
            SourceKind::Pattern => write!(f, "pattern"),
        }
    }
}

/// Frame producer configuration
///
/// These values are handed to the frame source when it is built; the relay
/// never looks at them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Which frame source to run
    pub source: SourceKind,
    /// Resolution width
    pub width: u32,
    /// Resolution height
    pub height: u32,
    /// Frame rate
    pub fps: u32,
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Encoder program for the command source (default: rpicam-vid)
    pub command: Option<String>,
    /// Encoder arguments; empty means derive them from the settings above
    pub args: Vec<String>,
    /// How long start-up waits for the first frame (0 = do not wait)
    pub startup_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Command,
            // Pi 3 friendly; 1280x720@25 is fine on a Pi 4
            width: 960,
            height: 540,
            fps: 20,
            quality: 50,
            command: None,
            args: Vec::new(),
            startup_timeout_secs: 10,
        }
    }
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Frames larger than this are rejected by the relay
    pub max_frame_bytes: usize,
    /// Snapshot wait limit in seconds (0 = wait until a frame exists)
    pub snapshot_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            snapshot_timeout_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.web.bind_address, "0.0.0.0");
        assert_eq!(config.web.http_port, 8000);
        assert_eq!(config.capture.source, SourceKind::Command);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = AppConfig::default();
        config.capture.fps = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.capture.quality = 101;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.width = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.height = MAX_DIMENSION + 1;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.capture.width = 70_000;
        config.capture.height = 70_000;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.width = MAX_DIMENSION;
        config.capture.height = MAX_DIMENSION;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("Pattern".parse::<SourceKind>().unwrap(), SourceKind::Pattern);
        assert_eq!("command".parse::<SourceKind>().unwrap(), SourceKind::Command);
        assert!("v4l2".parse::<SourceKind>().is_err());
        assert_eq!(SourceKind::Pattern.to_string(), "pattern");
    }
}
