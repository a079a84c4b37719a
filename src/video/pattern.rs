//! Synthetic test pattern source
//!
//! Produces a moving colour gradient with a progress bar, JPEG-encoded at the
//! configured quality and paced to the configured frame rate. Useful on
//! machines without a camera and for exercising the stream end to end.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::source::{FrameSource, Interrupter};
use crate::config::{CaptureConfig, MAX_DIMENSION};
use crate::error::{AppError, Result};

/// Longest single sleep while pacing, so an interrupt is noticed quickly
const PACING_SLICE: Duration = Duration::from_millis(50);
/// Height of the progress bar at the top of the image
const BAR_HEIGHT: u32 = 16;

/// Moving gradient generator
pub struct TestPatternSource {
    width: u32,
    height: u32,
    quality: u8,
    interval: Duration,
    frame_index: u64,
    next_due: Option<Instant>,
    stopped: Arc<AtomicBool>,
}

impl TestPatternSource {
    /// Create a generator. Dimensions are clamped to `1..=MAX_DIMENSION`.
    pub fn new(width: u32, height: u32, fps: u32, quality: u8) -> Self {
        Self {
            width: width.clamp(1, MAX_DIMENSION),
            height: height.clamp(1, MAX_DIMENSION),
            quality: quality.clamp(1, 100),
            interval: Duration::from_secs(1) / fps.max(1),
            frame_index: 0,
            next_due: None,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a generator from capture settings
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.width, config.height, config.fps, config.quality)
    }

    /// Render and encode the frame with the given index
    pub fn render(&self, index: u64) -> Result<Bytes> {
        let shift = (index % 256) as u32;
        let bar_len = ((index % 100) as u32 + 1) * self.width / 100;

        let img = RgbImage::from_fn(self.width, self.height, |x, y| {
            if y < BAR_HEIGHT {
                return if x < bar_len {
                    Rgb([240, 240, 240])
                } else {
                    Rgb([24, 24, 24])
                };
            }
            let r = ((x * 255 / self.width) + shift) % 256;
            let g = ((y * 255 / self.height) + shift * 2) % 256;
            Rgb([r as u8, g as u8, 128])
        });

        let mut out = Vec::with_capacity(self.width as usize * self.height as usize / 4);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(img.as_raw(), self.width, self.height, ColorType::Rgb8)
            .map_err(|e| AppError::Source(format!("JPEG encode failed: {}", e)))?;
        Ok(Bytes::from(out))
    }

    /// Sleep until the next frame is due. Returns false if interrupted.
    fn wait_for_slot(&mut self) -> bool {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        while !self.stopped.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= due {
                break;
            }
            std::thread::sleep((due - now).min(PACING_SLICE));
        }
        // Do not try to catch up after a stall
        self.next_due = Some(due.max(now) + self.interval);
        !self.stopped.load(Ordering::Relaxed)
    }
}

impl FrameSource for TestPatternSource {
    fn describe(&self) -> String {
        format!(
            "test pattern {}x{} @ {:.1} fps (quality {})",
            self.width,
            self.height,
            1.0 / self.interval.as_secs_f64(),
            self.quality
        )
    }

    fn open(&mut self) -> Result<()> {
        self.stopped.store(false, Ordering::Relaxed);
        self.next_due = None;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Bytes>> {
        if !self.wait_for_slot() {
            return Ok(None);
        }
        self.frame_index += 1;
        self.render(self.frame_index).map(Some)
    }

    fn close(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupter> {
        let stopped = self.stopped.clone();
        Some(Arc::new(move || stopped.store(true, Ordering::Relaxed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::is_complete_jpeg;

    #[test]
    fn test_render_produces_jpeg() {
        let source = TestPatternSource::new(64, 48, 30, 80);
        let data = source.render(3).unwrap();
        assert!(is_complete_jpeg(&data));
    }

    #[test]
    fn test_dimensions_clamped() {
        let source = TestPatternSource::new(0, u32::MAX, 30, 80);
        assert_eq!(source.width, 1);
        assert_eq!(source.height, MAX_DIMENSION);
    }

    #[test]
    fn test_frames_change_over_time() {
        let source = TestPatternSource::new(64, 48, 30, 80);
        assert_ne!(source.render(1).unwrap(), source.render(2).unwrap());
    }

    #[test]
    fn test_read_paced_and_interruptible() {
        let mut source = TestPatternSource::new(32, 32, 50, 50);
        source.open().unwrap();

        let started = Instant::now();
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_some());
        // Second frame waits one interval (20ms)
        assert!(started.elapsed() >= Duration::from_millis(15));

        let interrupt = source.interrupter().unwrap();
        interrupt();
        assert!(source.read_frame().unwrap().is_none());
    }
}
