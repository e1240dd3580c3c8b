//! ABOUTME: Registry of recording workers keyed by stream name
//! ABOUTME: Idempotent start/stop, lock-free frame forwarding, graceful stop-all

use bytes::Bytes;
use fc_core::Result;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{debug, info};

use crate::{
    encoder::{EncoderFactory, FfmpegEncoderFactory},
    worker::{enqueue, RecordingWorker},
};

/// Manages one `RecordingWorker` per recorded stream.
///
/// The mutex guards only the name→worker map; frames are enqueued on a cloned
/// inbox sender after the lock is released so a slow worker cannot stall
/// publishes to other streams.
pub struct RecordingService {
    workers: Mutex<HashMap<String, RecordingWorker>>,
    base_dir: PathBuf,
    fps: u32,
    codec: String,
    factory: Arc<dyn EncoderFactory>,
}

impl RecordingService {
    /// Create a service writing via the ffmpeg encoder
    pub fn new(base_dir: impl Into<PathBuf>, fps: u32, codec: impl Into<String>) -> Result<Self> {
        Self::with_factory(base_dir, fps, codec, Arc::new(FfmpegEncoderFactory))
    }

    /// Create a service with an explicit encoder factory (used by tests)
    pub fn with_factory(
        base_dir: impl Into<PathBuf>,
        fps: u32,
        codec: impl Into<String>,
        factory: Arc<dyn EncoderFactory>,
    ) -> Result<Self> {
        let base_dir = base_dir.into();
        let codec = codec.into();
        std::fs::create_dir_all(&base_dir)?;
        info!(base_dir = %base_dir.display(), fps, codec = %codec, "RecordingService initialized");

        Ok(Self {
            workers: Mutex::new(HashMap::new()),
            base_dir,
            fps,
            codec,
            factory,
        })
    }

    /// Start recording a stream; no-op when a worker already exists
    pub fn start_recording(&self, stream_name: &str) {
        let mut workers = self.workers.lock().expect("worker map poisoned");
        if workers.contains_key(stream_name) {
            debug!(stream = %stream_name, "Recording already active");
            return;
        }
        let worker = RecordingWorker::spawn(
            stream_name,
            &self.base_dir,
            self.fps,
            &self.codec,
            Arc::clone(&self.factory),
        );
        workers.insert(stream_name.to_string(), worker);
        info!(stream = %stream_name, "Recording started for stream");
    }

    /// Stop recording a stream; no-op when no worker exists
    pub async fn stop_recording(&self, stream_name: &str) {
        let worker = {
            let mut workers = self.workers.lock().expect("worker map poisoned");
            workers.remove(stream_name)
        };
        match worker {
            Some(worker) => {
                worker.stop().await;
                info!(stream = %stream_name, "Recording stopped for stream");
            }
            None => debug!(stream = %stream_name, "No active recording"),
        }
    }

    /// Forward a frame to the stream's worker; silently discarded when none
    pub fn add_frame(&self, stream_name: &str, frame: Bytes) {
        let tx = {
            let workers = self.workers.lock().expect("worker map poisoned");
            workers.get(stream_name).map(|w| w.frame_sender())
        };
        match tx {
            Some(tx) => enqueue(stream_name, &tx, frame),
            None => debug!(stream = %stream_name, "No active recording, ignoring frame"),
        }
    }

    /// Stop every worker, waiting for each in turn
    pub async fn stop_all(&self) {
        let names: Vec<String> = {
            let workers = self.workers.lock().expect("worker map poisoned");
            workers.keys().cloned().collect()
        };
        for name in names {
            self.stop_recording(&name).await;
        }
        info!("All recordings stopped");
    }

    /// Names of streams currently being recorded
    pub fn active_recordings(&self) -> Vec<String> {
        let workers = self.workers.lock().expect("worker map poisoned");
        let mut names: Vec<String> = workers.keys().cloned().collect();
        names.sort();
        names
    }
}
