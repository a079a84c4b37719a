//! MJPEG multipart streamer
//!
//! Converts the relay's frame sequence into an unbounded
//! `multipart/x-mixed-replace` body, one part per new frame.

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::relay::FrameRelay;

/// Multipart boundary token (without the leading dashes)
pub const BOUNDARY: &str = "frame";
/// Response content type for the live stream
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
/// Cache suppression used on the stream, its parts and snapshots
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Client ID type (UUID string)
pub type ClientId = String;

/// Per-connection bookkeeping, logged when the connection goes away.
///
/// The guard lives inside the body stream, so it is dropped whenever hyper
/// drops the body (peer disconnect, write failure or shutdown).
pub struct ClientGuard {
    id: ClientId,
    connected_at: Instant,
    frames_sent: u64,
}

impl ClientGuard {
    /// Create a new client guard
    pub fn new(id: ClientId) -> Self {
        info!("Client {} connected to MJPEG stream", id);
        Self {
            id,
            connected_at: Instant::now(),
            frames_sent: 0,
        }
    }

    /// Get client ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Record a frame handed to the HTTP layer
    pub fn record_frame_sent(&mut self) {
        self.frames_sent += 1;
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let duration_secs = self.connected_at.elapsed().as_secs_f32();
        let avg_fps = if duration_secs > 0.1 {
            self.frames_sent as f32 / duration_secs
        } else {
            0.0
        };
        info!(
            "Client {} disconnected after {:.1}s ({} frames, {:.1} avg FPS)",
            self.id, duration_secs, self.frames_sent, avg_fps
        );
    }
}

/// Per-connection streaming loop over a shared relay
pub struct MjpegStreamer {
    relay: Arc<FrameRelay>,
    shutdown: CancellationToken,
}

impl MjpegStreamer {
    /// Create a streamer that ends when `shutdown` is cancelled
    pub fn new(relay: Arc<FrameRelay>, shutdown: CancellationToken) -> Self {
        Self { relay, shutdown }
    }

    /// Build the response body for one client.
    ///
    /// Waiting on the relay is the only suspension point besides hyper's own
    /// backpressure on `yield`. Each sequence number is emitted at most once.
    pub fn into_stream(
        self,
        client_id: ClientId,
    ) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
        let Self { relay, shutdown } = self;

        async_stream::stream! {
            let mut guard = ClientGuard::new(client_id);
            let mut cursor = FrameRelay::START;

            loop {
                let (frame, next) = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!("Ending stream for client {} on shutdown", guard.id());
                        break;
                    }
                    next = relay.next(cursor) => next,
                };
                cursor = next;

                yield Ok::<Bytes, io::Error>(create_mjpeg_part(frame.data()));
                // Record after yield - the part has been taken by hyper
                guard.record_frame_sent();
            }
        }
    }
}

/// Create MJPEG multipart frame bytes
pub fn create_mjpeg_part(jpeg_data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(160 + jpeg_data.len());

    buf.put_slice(b"--");
    buf.put_slice(BOUNDARY.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Content-Type: image/jpeg\r\n");
    buf.put_slice(format!("Cache-Control: {}\r\n", NO_CACHE).as_bytes());
    buf.put_slice(b"Pragma: no-cache\r\n");
    buf.put_slice(format!("Content-Length: {}\r\n", jpeg_data.len()).as_bytes());
    buf.put_slice(b"\r\n");

    buf.put_slice(jpeg_data);
    buf.put_slice(b"\r\n");

    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[test]
    fn test_part_layout() {
        let part = create_mjpeg_part(b"\xff\xd8\xff");
        let expected: &[u8] = b"--frame\r\n\
            Content-Type: image/jpeg\r\n\
            Cache-Control: no-cache, no-store, must-revalidate\r\n\
            Pragma: no-cache\r\n\
            Content-Length: 3\r\n\
            \r\n\
            \xff\xd8\xff\r\n";
        assert_eq!(&part[..], expected);
    }

    #[test]
    fn test_empty_part_has_zero_length() {
        let part = create_mjpeg_part(&[]);
        let text = std::str::from_utf8(&part).unwrap();
        assert!(text.contains("Content-Length: 0\r\n\r\n"));
        assert!(text.ends_with("\r\n\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_stream_emits_each_new_frame_once() {
        let relay = Arc::new(FrameRelay::new());
        let token = CancellationToken::new();
        let stream = MjpegStreamer::new(relay.clone(), token.clone()).into_stream("a".into());
        futures::pin_mut!(stream);

        relay.push(Bytes::from_static(b"one")).unwrap();
        let part = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(part, create_mjpeg_part(b"one"));

        // Nothing new: the stream must stay pending
        assert!(timeout(Duration::from_millis(30), stream.next()).await.is_err());

        relay.push(Bytes::from_static(b"two")).unwrap();
        let part = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(part, create_mjpeg_part(b"two"));
    }

    #[tokio::test]
    async fn test_shutdown_ends_blocked_stream() {
        let relay = Arc::new(FrameRelay::new());
        let token = CancellationToken::new();
        let stream = MjpegStreamer::new(relay, token.clone()).into_stream("b".into());
        futures::pin_mut!(stream);

        assert!(timeout(Duration::from_millis(30), stream.next()).await.is_err());

        token.cancel();
        assert!(timeout(WAIT, stream.next()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_client_does_not_affect_others() {
        let relay = Arc::new(FrameRelay::new());
        let token = CancellationToken::new();

        let mut first =
            Box::pin(MjpegStreamer::new(relay.clone(), token.clone()).into_stream("1".into()));
        let mut second =
            Box::pin(MjpegStreamer::new(relay.clone(), token.clone()).into_stream("2".into()));

        // Both clients take the current frame, then park waiting on the relay
        relay.push(Bytes::from_static(b"shared")).unwrap();
        for stream in [&mut first, &mut second] {
            let part = timeout(WAIT, stream.next()).await.unwrap().unwrap().unwrap();
            assert_eq!(part, create_mjpeg_part(b"shared"));
            assert!(timeout(Duration::from_millis(20), stream.next()).await.is_err());
        }

        // Disconnect one while it is blocked in the relay
        drop(first);

        relay.push(Bytes::from_static(b"x")).unwrap();
        let part = timeout(WAIT, second.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(part, create_mjpeg_part(b"x"));
    }

    #[test]
    fn test_client_guard_counts_frames() {
        let mut guard = ClientGuard::new("c".into());
        guard.record_frame_sent();
        guard.record_frame_sent();
        assert_eq!(guard.frames_sent, 2);
        assert_eq!(guard.id(), "c");
    }
}
