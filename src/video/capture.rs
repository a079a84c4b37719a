//! Capture lifecycle
//!
//! Owns the frame source and the dedicated capture thread that forwards every
//! frame into the relay.

use parking_lot::Mutex as ParkingMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::source::{build_source, FrameSource, Interrupter, SourceFactory};
use crate::config::CaptureConfig;
use crate::error::{AppError, Result};
use crate::stream::FrameRelay;

/// Capture thread name
const THREAD_NAME: &str = "camrelay-capture";

/// Capture state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Not started
    Stopped,
    /// Source opened, waiting for the first frame
    Starting,
    /// Frames are flowing
    Running,
    /// Source failed or ended on its own
    Error,
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureState::Stopped => write!(f, "stopped"),
            CaptureState::Starting => write!(f, "starting"),
            CaptureState::Running => write!(f, "running"),
            CaptureState::Error => write!(f, "error"),
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    interrupter: Option<Interrupter>,
}

/// Starts and stops the frame producer
pub struct CaptureService {
    config: CaptureConfig,
    relay: Arc<FrameRelay>,
    factory: SourceFactory,
    state: Arc<watch::Sender<CaptureState>>,
    state_rx: watch::Receiver<CaptureState>,
    stop_flag: Arc<AtomicBool>,
    worker: ParkingMutex<Option<Worker>>,
    start_lock: Mutex<()>,
}

impl CaptureService {
    /// Create a service using the source selected in `config`
    pub fn new(config: CaptureConfig, relay: Arc<FrameRelay>) -> Self {
        let max_frame_bytes = relay.max_frame_bytes();
        Self::with_source_factory(
            config,
            relay,
            Box::new(move |config: &CaptureConfig| build_source(config, max_frame_bytes)),
        )
    }

    /// Create a service with a custom source factory
    pub fn with_source_factory(
        config: CaptureConfig,
        relay: Arc<FrameRelay>,
        factory: SourceFactory,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(CaptureState::Stopped);
        Self {
            config,
            relay,
            factory,
            state: Arc::new(state_tx),
            state_rx,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: ParkingMutex::new(None),
            start_lock: Mutex::new(()),
        }
    }

    /// Get current capture state
    pub fn state(&self) -> CaptureState {
        *self.state_rx.borrow()
    }

    /// Check if the capture thread is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Open the source and start forwarding frames to the relay.
    ///
    /// Calling this while capture is already running is a no-op, so the
    /// camera is never acquired twice. Fails with [`AppError::ProducerStart`]
    /// if the source cannot be opened or no frame arrives within
    /// `startup_timeout_secs`.
    pub async fn start(&self) -> Result<()> {
        let _lock = self.start_lock.lock().await;

        if self.is_running() {
            debug!("Capture already running");
            return Ok(());
        }
        // Reap a thread that ended on its own
        self.join_worker().await;

        let _ = self.state.send(CaptureState::Starting);
        self.stop_flag.store(false, Ordering::SeqCst);

        let mut source = (self.factory)(&self.config);
        let description = source.describe();
        info!("Starting capture from {}", description);

        let opened = tokio::task::spawn_blocking(move || source.open().map(|_| source))
            .await
            .map_err(|e| AppError::Internal(format!("Source open task failed: {}", e)))?;
        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                let _ = self.state.send(CaptureState::Error);
                return Err(match e {
                    AppError::ProducerStart(_) => e,
                    other => AppError::ProducerStart(format!("{}: {}", description, other)),
                });
            }
        };

        let interrupter = source.interrupter();
        let start_sequence = self.relay.sequence();
        let relay = self.relay.clone();
        let state = self.state.clone();
        let stop_flag = self.stop_flag.clone();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || capture_loop(source, relay, state, stop_flag))
            .map_err(|e| {
                let _ = self.state.send(CaptureState::Error);
                AppError::ProducerStart(format!("Failed to spawn capture thread: {}", e))
            })?;

        *self.worker.lock() = Some(Worker {
            handle,
            interrupter,
        });

        if self.config.startup_timeout_secs > 0 {
            let timeout = Duration::from_secs(self.config.startup_timeout_secs);
            if self.relay.next_timeout(start_sequence, timeout).await.is_none() {
                self.stop().await;
                let _ = self.state.send(CaptureState::Error);
                return Err(AppError::ProducerStart(format!(
                    "No frame from {} within {}s",
                    description, self.config.startup_timeout_secs
                )));
            }
        }

        mark_running(&self.state);
        info!("Capture started");
        Ok(())
    }

    /// Stop the producer and release the source.
    ///
    /// Best effort: never fails, and does nothing if capture was never
    /// started or has already been stopped.
    pub async fn stop(&self) {
        let Some(interrupter) = self.signal_stop() else {
            debug!("Capture not running, nothing to stop");
            return;
        };

        info!("Stopping capture");
        if let Some(interrupt) = interrupter {
            interrupt();
        }
        self.join_worker().await;
        let _ = self.state.send(CaptureState::Stopped);
    }

    /// Raise the stop flag; returns the interrupter if a worker exists
    fn signal_stop(&self) -> Option<Option<Interrupter>> {
        let worker = self.worker.lock();
        let worker = worker.as_ref()?;
        self.stop_flag.store(true, Ordering::SeqCst);
        Some(worker.interrupter.clone())
    }

    async fn join_worker(&self) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };

        match tokio::task::spawn_blocking(move || worker.handle.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Capture thread panicked"),
            Err(e) => warn!("Failed to join capture thread: {}", e),
        }
    }
}

/// Move from Starting to Running; later states are left alone
fn mark_running(state: &watch::Sender<CaptureState>) {
    state.send_if_modified(|current| {
        if *current == CaptureState::Starting {
            *current = CaptureState::Running;
            true
        } else {
            false
        }
    });
}

/// Main capture loop (runs on the dedicated capture thread)
fn capture_loop(
    mut source: Box<dyn FrameSource>,
    relay: Arc<FrameRelay>,
    state: Arc<watch::Sender<CaptureState>>,
    stop_flag: Arc<AtomicBool>,
) {
    let mut frames: u64 = 0;
    let mut rejected: u64 = 0;

    let outcome = loop {
        if stop_flag.load(Ordering::Relaxed) {
            break Ok(());
        }

        match source.read_frame() {
            Ok(Some(data)) => match relay.push(data) {
                Ok(sequence) => {
                    frames += 1;
                    if frames == 1 {
                        debug!("First frame received (sequence {})", sequence);
                        mark_running(&state);
                    }
                }
                Err(e) => {
                    rejected += 1;
                    warn!("Dropping frame: {}", e);
                }
            },
            Ok(None) => {
                if !stop_flag.load(Ordering::Relaxed) {
                    warn!("Frame source ended");
                    break Err(AppError::Source("source ended".to_string()));
                }
                break Ok(());
            }
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = source.close() {
        debug!("Error closing frame source: {}", e);
    }

    match outcome {
        Err(e) if !stop_flag.load(Ordering::Relaxed) => {
            error!("Capture error: {}", e);
            let _ = state.send(CaptureState::Error);
        }
        _ => {
            let _ = state.send(CaptureState::Stopped);
        }
    }

    info!("Capture stopped ({} frames, {} rejected)", frames, rejected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    /// Yields the scripted frames, then blocks until interrupted
    struct ScriptedSource {
        frames: Vec<Bytes>,
        fail_open: bool,
        opens: Arc<AtomicUsize>,
        interrupted: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn open(&mut self) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(AppError::Source("camera busy".to_string()));
            }
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<Bytes>> {
            if !self.frames.is_empty() {
                return Ok(Some(self.frames.remove(0)));
            }
            while !self.interrupted.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(None)
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn interrupter(&self) -> Option<Interrupter> {
            let flag = self.interrupted.clone();
            Some(Arc::new(move || flag.store(true, Ordering::SeqCst)))
        }
    }

    fn service(
        frames: Vec<&'static [u8]>,
        fail_open: bool,
        relay: Arc<FrameRelay>,
    ) -> (CaptureService, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let opens_for_factory = opens.clone();
        let config = CaptureConfig {
            startup_timeout_secs: 1,
            ..Default::default()
        };
        let factory: SourceFactory = Box::new(move |_: &CaptureConfig| {
            Box::new(ScriptedSource {
                frames: frames.iter().map(|f| Bytes::from_static(*f)).collect(),
                fail_open,
                opens: opens_for_factory.clone(),
                interrupted: Arc::new(AtomicBool::new(false)),
            }) as Box<dyn FrameSource>
        });
        (
            CaptureService::with_source_factory(config, relay, factory),
            opens,
        )
    }

    #[tokio::test]
    async fn test_start_forwards_frames() {
        let relay = Arc::new(FrameRelay::new());
        let (capture, _) = service(vec![&b"\xff\xd8\xff"[..]], false, relay.clone());

        capture.start().await.unwrap();
        assert!(capture.is_running());
        assert_eq!(capture.state(), CaptureState::Running);
        assert_eq!(relay.latest().unwrap().data(), b"\xff\xd8\xff");

        capture.stop().await;
        assert!(!capture.is_running());
        assert_eq!(capture.state(), CaptureState::Stopped);
    }

    #[tokio::test]
    async fn test_second_start_does_not_reopen() {
        let relay = Arc::new(FrameRelay::new());
        let (capture, opens) = service(vec![&b"a"[..]], false, relay);

        capture.start().await.unwrap();
        capture.start().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        capture.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let relay = Arc::new(FrameRelay::new());
        let (capture, _) = service(vec![&b"a"[..]], false, relay);

        // Never started
        capture.stop().await;
        assert_eq!(capture.state(), CaptureState::Stopped);

        capture.start().await.unwrap();
        capture.stop().await;
        capture.stop().await;
        assert_eq!(capture.state(), CaptureState::Stopped);
    }

    #[tokio::test]
    async fn test_open_failure_is_producer_start() {
        let relay = Arc::new(FrameRelay::new());
        let (capture, _) = service(vec![], true, relay);

        let err = capture.start().await.unwrap_err();
        assert!(matches!(err, AppError::ProducerStart(_)));
        assert_eq!(capture.state(), CaptureState::Error);
        assert!(!capture.is_running());
    }

    #[tokio::test]
    async fn test_no_first_frame_is_producer_start() {
        let relay = Arc::new(FrameRelay::new());
        let (capture, _) = service(vec![], false, relay.clone());

        let err = capture.start().await.unwrap_err();
        assert!(matches!(err, AppError::ProducerStart(_)));
        assert!(!capture.is_running());
        assert!(relay.latest().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_skipped() {
        let relay = Arc::new(FrameRelay::with_max_frame_bytes(4));
        let (capture, _) = service(vec![&b"far too large"[..], &b"ok"[..]], false, relay.clone());

        capture.start().await.unwrap();
        let (frame, sequence) = relay.next(FrameRelay::START).await;
        assert_eq!(frame.data(), b"ok");
        assert_eq!(sequence, 1);

        capture.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let relay = Arc::new(FrameRelay::new());
        let (capture, opens) = service(vec![&b"x"[..]], false, relay.clone());

        capture.start().await.unwrap();
        capture.stop().await;
        capture.start().await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        assert_eq!(relay.sequence(), 2);

        capture.stop().await;
    }
}
