//! ABOUTME: Recording worker: one task per recorded stream
//! ABOUTME: Decodes inbox JPEGs, writes them to the container, finalizes the sidecar

use bytes::Bytes;
use chrono::{DateTime, Local, Utc};
use fc_core::{file_stamp, to_rfc3339, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::encoder::EncoderFactory;

/// Bounded inbox size; newest frames are shed on overflow
const INBOX_CAPACITY: usize = 100;

/// Dequeue timeout so stop requests are noticed while idle
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// How long stop waits for the worker task to finish
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Sidecar metadata written next to every finished recording.
///
/// Field order is the serialized key order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingMeta {
    pub stream_name: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub total_frames: u64,
    pub average_fps: f64,
    pub target_fps: u32,
    pub codec: String,
    pub recording_path: String,
}

/// Handle to the recording task of a single stream
pub struct RecordingWorker {
    stream_name: String,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RecordingWorker {
    /// Start a worker task for `stream_name`, recording under `base_dir`
    pub fn spawn(
        stream_name: &str,
        base_dir: &Path,
        fps: u32,
        codec: &str,
        factory: Arc<dyn EncoderFactory>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let cancel = CancellationToken::new();
        let ctx = WorkerCtx {
            stream_name: stream_name.to_string(),
            base_dir: base_dir.to_path_buf(),
            fps,
            codec: codec.to_string(),
            factory,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run(ctx, rx));
        info!(stream = %stream_name, "Recording worker started");

        Self {
            stream_name: stream_name.to_string(),
            tx,
            cancel,
            handle,
        }
    }

    /// A cloned inbox sender, for enqueueing outside any registry lock
    pub(crate) fn frame_sender(&self) -> mpsc::Sender<Bytes> {
        self.tx.clone()
    }

    /// Non-blocking enqueue; sheds the frame when the inbox is full
    pub fn add_frame(&self, frame: Bytes) {
        enqueue(&self.stream_name, &self.tx, frame);
    }

    /// Stop the worker, waiting up to 5 s for it to finalize
    pub async fn stop(self) {
        self.cancel.cancel();
        if timeout(STOP_TIMEOUT, self.handle).await.is_err() {
            warn!(stream = %self.stream_name, "Recording worker did not stop in time");
        }
        info!(stream = %self.stream_name, "Recording worker stopped");
    }
}

pub(crate) fn enqueue(stream: &str, tx: &mpsc::Sender<Bytes>, frame: Bytes) {
    match tx.try_send(frame) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(stream = %stream, "Recording inbox full, dropping frame");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(stream = %stream, "Recording worker gone, ignoring frame");
        }
    }
}

struct WorkerCtx {
    stream_name: String,
    base_dir: PathBuf,
    fps: u32,
    codec: String,
    factory: Arc<dyn EncoderFactory>,
    cancel: CancellationToken,
}

struct RecordingSession {
    encoder: Box<dyn crate::encoder::VideoEncoder>,
    dimensions: (u32, u32),
    recording_path: PathBuf,
    metadata_path: PathBuf,
    start_time: DateTime<Utc>,
    frame_count: u64,
}

async fn run(ctx: WorkerCtx, mut rx: mpsc::Receiver<Bytes>) {
    debug!(stream = %ctx.stream_name, "Recording worker running");
    let mut session: Option<RecordingSession> = None;

    while !ctx.cancel.is_cancelled() {
        let frame = match timeout(DEQUEUE_TIMEOUT, rx.recv()).await {
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(frame)) => frame,
        };

        let image = match image::load_from_memory(&frame) {
            Ok(decoded) => decoded.into_rgb8(),
            Err(e) => {
                warn!(stream = %ctx.stream_name, error = %e, "Failed to decode frame, skipping");
                continue;
            }
        };
        let dimensions = image.dimensions();

        if session.is_none() {
            session = match RecordingSession::open(&ctx, dimensions).await {
                Ok(opened) => Some(opened),
                Err(e) => {
                    error!(
                        stream = %ctx.stream_name,
                        error = %e,
                        "Failed to open recording container, aborting worker"
                    );
                    return;
                }
            };
        }

        if let Some(current) = session.as_mut() {
            if current.dimensions != dimensions {
                warn!(
                    stream = %ctx.stream_name,
                    expected = ?current.dimensions,
                    got = ?dimensions,
                    "Frame dimensions changed mid-recording, dropping frame"
                );
                continue;
            }
            if let Err(e) = current.encoder.write_frame(image.as_raw()).await {
                error!(
                    stream = %ctx.stream_name,
                    error = %e,
                    "Frame write failed, finalizing recording"
                );
                break;
            }
            current.frame_count += 1;
        }
    }

    if let Some(finished) = session.take() {
        finished.finalize(&ctx).await;
    }
    debug!(stream = %ctx.stream_name, "Recording worker finished");
}

impl RecordingSession {
    async fn open(ctx: &WorkerCtx, (width, height): (u32, u32)) -> Result<Self> {
        let stream_dir = ctx.base_dir.join(&ctx.stream_name);
        tokio::fs::create_dir_all(&stream_dir).await?;

        let stamp = file_stamp(Local::now());
        let recording_path = stream_dir.join(format!("{}_{}.mp4", ctx.stream_name, stamp));
        let metadata_path = stream_dir.join(format!("{}_{}.json", ctx.stream_name, stamp));

        let encoder = ctx
            .factory
            .open(&recording_path, width, height, ctx.fps, &ctx.codec)
            .await?;

        info!(
            stream = %ctx.stream_name,
            path = %recording_path.display(),
            "Recording started"
        );

        Ok(Self {
            encoder,
            dimensions: (width, height),
            recording_path,
            metadata_path,
            start_time: Utc::now(),
            frame_count: 0,
        })
    }

    async fn finalize(mut self, ctx: &WorkerCtx) {
        if let Err(e) = self.encoder.finish().await {
            error!(
                stream = %ctx.stream_name,
                error = %e,
                "Failed to close recording container"
            );
        }

        let end_time = Utc::now();
        let duration = (end_time - self.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        let average_fps = if duration > 0.0 {
            ((self.frame_count as f64 / duration) * 100.0).round() / 100.0
        } else {
            0.0
        };

        let meta = RecordingMeta {
            stream_name: ctx.stream_name.clone(),
            start_time: to_rfc3339(self.start_time),
            end_time: to_rfc3339(end_time),
            duration_seconds: duration,
            total_frames: self.frame_count,
            average_fps,
            target_fps: ctx.fps,
            codec: ctx.codec.clone(),
            recording_path: self.recording_path.display().to_string(),
        };

        match serde_json::to_string_pretty(&meta) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(&self.metadata_path, json).await {
                    error!(
                        stream = %ctx.stream_name,
                        error = %e,
                        "Failed to save metadata"
                    );
                } else {
                    info!(path = %self.metadata_path.display(), "Metadata saved");
                }
            }
            Err(e) => {
                error!(stream = %ctx.stream_name, error = %e, "Failed to serialize metadata");
            }
        }
    }
}
