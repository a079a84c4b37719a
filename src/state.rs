use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::stream::FrameRelay;
use crate::video::CaptureService;

/// Application-wide state shared across handlers
///
/// Built once in `main` and handed to both the capture service and the
/// router; there is no global camera handle.
pub struct AppState {
    /// Effective configuration (after CLI overrides)
    pub config: AppConfig,
    /// Latest-frame relay between the capture thread and HTTP readers
    pub relay: Arc<FrameRelay>,
    /// Frame producer lifecycle
    pub capture: Arc<CaptureService>,
    /// Cancelled once on shutdown; ends streams and pending snapshots
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: AppConfig,
        relay: Arc<FrameRelay>,
        capture: Arc<CaptureService>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            relay,
            capture,
            shutdown,
        })
    }

    /// Build state from configuration alone
    pub fn from_config(config: AppConfig) -> Arc<Self> {
        let relay = Arc::new(FrameRelay::with_max_frame_bytes(config.stream.max_frame_bytes));
        let capture = Arc::new(CaptureService::new(config.capture.clone(), relay.clone()));
        Self::new(config, relay, capture, CancellationToken::new())
    }

    /// Snapshot wait limit, `None` meaning wait until a frame exists
    pub fn snapshot_timeout(&self) -> Option<Duration> {
        match self.config.stream.snapshot_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Stop the producer first, then end every open stream and pending
    /// snapshot. Safe to call more than once.
    pub async fn begin_shutdown(&self) {
        self.capture.stop().await;
        tracing::info!("Capture stopped");
        self.shutdown.cancel();
    }
}
