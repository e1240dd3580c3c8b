//! ABOUTME: MJPEG fan-out as multipart/x-mixed-replace HTTP chunks
//! ABOUTME: Pull-mode 10 Hz feed over the stream's current frame

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::StreamManager;

/// Multipart boundary token used on the wire
pub const MJPEG_BOUNDARY: &str = "frame";

/// Interval between polls of the current frame
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Content-Type header value for MJPEG responses
pub fn mjpeg_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", MJPEG_BOUNDARY)
}

/// RAII registration of a viewer.
///
/// Deregisters exactly once when dropped, on any exit path: normal feed end,
/// client disconnect mid-write, or stream deletion.
pub struct ViewerGuard {
    manager: Arc<StreamManager>,
    name: String,
}

impl ViewerGuard {
    pub(crate) fn new(manager: Arc<StreamManager>, name: String) -> Self {
        Self { manager, name }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.manager.viewer_disconnected(&self.name);
    }
}

/// Item type of the fan-out feed, consumable by `HttpResponse::streaming`
pub type MjpegFeed = std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, actix_web::Error>>>>;

/// Build one multipart chunk around a JPEG payload
fn frame_chunk(frame: &Bytes) -> Bytes {
    let mut chunk = BytesMut::with_capacity(frame.len() + 64);
    chunk.put_slice(b"--");
    chunk.put_slice(MJPEG_BOUNDARY.as_bytes());
    chunk.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.put_slice(frame);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

/// Subscribe a viewer to a stream's MJPEG feed.
///
/// Returns `None` when the stream does not exist. The feed yields the
/// latest-available frame every ~100 ms (duplicates permitted between
/// publishes), waits silently while no frame has been published yet, and
/// terminates when the stream is deleted.
pub fn mjpeg_feed(manager: &Arc<StreamManager>, name: &str) -> Option<MjpegFeed> {
    let guard = manager.watch(name)?;
    let manager = Arc::clone(manager);
    let name = name.to_string();

    let feed = async_stream::stream! {
        let _guard = guard;
        loop {
            match manager.current_frame(&name) {
                Some(frame) => yield Ok::<Bytes, actix_web::Error>(frame_chunk(&frame)),
                None => {
                    if !manager.exists(&name) {
                        break;
                    }
                    // Stream exists but has no frame yet
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        info!(stream = %name, "MJPEG feed ended, stream gone");
    };

    Some(Box::pin(feed))
}
