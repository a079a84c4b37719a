//! External encoder frame source
//!
//! Runs an MJPEG encoder process (by default `rpicam-vid`) and splits the
//! JPEG images it writes to stdout.

use bytes::Bytes;
use parking_lot::Mutex;
use std::io::Read;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::jpeg::JpegSplitter;
use super::source::{FrameSource, Interrupter};
use crate::config::CaptureConfig;
use crate::error::{AppError, Result};

/// Encoder used when none is configured
pub const DEFAULT_ENCODER: &str = "rpicam-vid";

const READ_CHUNK: usize = 64 * 1024;

/// Frame source backed by an encoder subprocess
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    child: Arc<Mutex<Option<Child>>>,
    stdout: Option<ChildStdout>,
    splitter: JpegSplitter,
    read_buf: Vec<u8>,
}

impl CommandSource {
    /// Create a source running `program` with `args`
    pub fn new(program: impl Into<String>, args: Vec<String>, max_frame_bytes: usize) -> Self {
        Self {
            program: program.into(),
            args,
            child: Arc::new(Mutex::new(None)),
            stdout: None,
            splitter: JpegSplitter::new(max_frame_bytes),
            read_buf: vec![0u8; READ_CHUNK],
        }
    }

    /// Create a source from capture settings.
    ///
    /// Without explicit arguments the default encoder is asked for an endless
    /// MJPEG stream at the configured resolution, frame rate and quality.
    pub fn from_config(config: &CaptureConfig, max_frame_bytes: usize) -> Self {
        let program = config
            .command
            .clone()
            .unwrap_or_else(|| DEFAULT_ENCODER.to_string());
        let args = if config.args.is_empty() {
            default_encoder_args(config)
        } else {
            config.args.clone()
        };
        Self::new(program, args, max_frame_bytes)
    }
}

/// `rpicam-vid` arguments for an endless MJPEG stream on stdout
pub fn default_encoder_args(config: &CaptureConfig) -> Vec<String> {
    vec![
        "-t".to_string(),
        "0".to_string(),
        "-n".to_string(),
        "--codec".to_string(),
        "mjpeg".to_string(),
        "--width".to_string(),
        config.width.to_string(),
        "--height".to_string(),
        config.height.to_string(),
        "--framerate".to_string(),
        config.fps.to_string(),
        "-q".to_string(),
        config.quality.to_string(),
        "-o".to_string(),
        "-".to_string(),
    ]
}

impl FrameSource for CommandSource {
    fn describe(&self) -> String {
        format!("command '{} {}'", self.program, self.args.join(" "))
    }

    fn open(&mut self) -> Result<()> {
        if self.child.lock().is_some() {
            return Ok(());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| AppError::ProducerStart(format!("Failed to spawn {}: {}", self.program, e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AppError::ProducerStart(format!("No stdout pipe for {}", self.program))
        })?;

        info!("Encoder {} started (pid {})", self.program, child.id());
        self.stdout = Some(stdout);
        *self.child.lock() = Some(child);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.splitter.next_frame() {
                return Ok(Some(frame));
            }

            let stdout = self
                .stdout
                .as_mut()
                .ok_or_else(|| AppError::Source("Encoder not running".to_string()))?;

            let n = match stdout.read(&mut self.read_buf) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                let leftover = self.splitter.pending_bytes();
                if leftover > 0 {
                    debug!("Encoder output ended with {} bytes of partial frame", leftover);
                }
                return Ok(None);
            }
            self.splitter.feed(&self.read_buf[..n]);
        }
    }

    fn close(&mut self) -> Result<()> {
        self.stdout = None;

        let Some(mut child) = self.child.lock().take() else {
            return Ok(());
        };

        // Already exited is fine
        if let Err(e) = child.kill() {
            debug!("Kill {} failed: {}", self.program, e);
        }
        let status = child.wait()?;
        if self.splitter.discarded_bytes() > 0 {
            warn!(
                "Discarded {} bytes of non-JPEG encoder output",
                self.splitter.discarded_bytes()
            );
        }
        info!("Encoder {} exited: {}", self.program, status);
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let child = self.child.clone();
        Some(Arc::new(move || {
            if let Some(child) = child.lock().as_mut() {
                if let Err(e) = child.kill() {
                    debug!("Encoder interrupt failed: {}", e);
                }
            }
        }))
    }
}

impl Drop for CommandSource {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
