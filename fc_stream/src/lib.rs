//! ABOUTME: Live stream registry and MJPEG fan-out
//! ABOUTME: Thread-safe publish/lookup/delete plus multipart streaming to viewers

use bytes::Bytes;
use chrono::{DateTime, Utc};
use fc_core::{to_rfc3339, Error, Result};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};
use tracing::{debug, info, warn};

mod mjpeg;

pub use mjpeg::{mjpeg_content_type, mjpeg_feed, MjpegFeed, ViewerGuard, MJPEG_BOUNDARY};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid pattern"))
}

/// State of a single live stream
#[derive(Debug)]
struct StreamInfo {
    name: String,
    created_at: DateTime<Utc>,
    last_frame_time: DateTime<Utc>,
    current_frame: Option<Bytes>,
    frame_buffer: VecDeque<Bytes>,
    viewer_count: usize,
    total_frames: u64,
}

impl StreamInfo {
    fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            name,
            created_at: now,
            last_frame_time: now,
            current_frame: None,
            frame_buffer: VecDeque::new(),
            viewer_count: 0,
            total_frames: 0,
        }
    }
}

/// Snapshot of a stream's statistics, as exposed by the API
#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    pub name: String,
    pub created_at: String,
    pub uptime_seconds: f64,
    pub last_frame_time: String,
    pub inactive_seconds: f64,
    pub total_frames: u64,
    pub viewer_count: usize,
    pub buffer_size: usize,
    pub has_current_frame: bool,
}

/// Outcome of a create call; an existing stream is not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Central registry for live streams.
///
/// A single mutex guards the map and every `StreamInfo` field. All operations
/// take the lock briefly and release it before any I/O or await point; the
/// fan-out feed copies the current frame out under the lock and yields it to
/// the transport afterwards.
pub struct StreamManager {
    streams: Mutex<HashMap<String, StreamInfo>>,
    max_concurrent: usize,
    max_buffer_frames: usize,
}

impl StreamManager {
    pub fn new(max_concurrent: usize, max_buffer_frames: usize) -> Self {
        info!(max_concurrent, max_buffer_frames, "StreamManager initialized");
        Self {
            streams: Mutex::new(HashMap::new()),
            max_concurrent,
            max_buffer_frames,
        }
    }

    /// Validate a stream name against the `^[A-Za-z0-9_-]{1,64}$` grammar
    pub fn valid_name(name: &str) -> bool {
        name_pattern().is_match(name)
    }

    /// Create a stream if it does not exist.
    ///
    /// Capacity is enforced only for fresh creations; an existing stream
    /// keeps accepting publishes even at the cap.
    pub fn create(&self, name: &str) -> Result<CreateOutcome> {
        if !Self::valid_name(name) {
            return Err(Error::InvalidName(name.to_string()));
        }

        let mut streams = self.streams.lock().expect("stream map poisoned");
        if streams.contains_key(name) {
            debug!(stream = %name, "Stream already exists");
            return Ok(CreateOutcome::AlreadyExists);
        }
        if streams.len() >= self.max_concurrent {
            return Err(Error::CapacityExceeded(self.max_concurrent));
        }

        streams.insert(name.to_string(), StreamInfo::new(name.to_string()));
        info!(stream = %name, "Stream created");
        Ok(CreateOutcome::Created)
    }

    /// Publish a frame to an existing stream
    pub fn publish(&self, name: &str, frame: Bytes) -> Result<()> {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        let stream = streams.get_mut(name).ok_or_else(|| {
            warn!(stream = %name, "Attempted to publish to non-existent stream");
            Error::NotFound(format!("Stream '{}' not found", name))
        })?;

        if stream.frame_buffer.len() >= self.max_buffer_frames {
            stream.frame_buffer.pop_front();
        }
        stream.frame_buffer.push_back(frame.clone());
        stream.current_frame = Some(frame);
        stream.last_frame_time = Utc::now();
        stream.total_frames += 1;

        debug!(stream = %name, total = stream.total_frames, "Frame published");
        Ok(())
    }

    /// Most recent frame of a stream, if any
    pub fn current_frame(&self, name: &str) -> Option<Bytes> {
        let streams = self.streams.lock().expect("stream map poisoned");
        streams.get(name).and_then(|s| s.current_frame.clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        let streams = self.streams.lock().expect("stream map poisoned");
        streams.contains_key(name)
    }

    /// Delete a stream; returns whether it existed. Viewers observe the
    /// deletion and terminate on their next poll.
    pub fn delete(&self, name: &str) -> bool {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        let removed = streams.remove(name).is_some();
        if removed {
            info!(stream = %name, "Stream deleted");
        }
        removed
    }

    /// Names of streams whose last publish is at least `timeout` ago
    pub fn inactive_streams(&self, timeout: Duration) -> Vec<String> {
        let now = Utc::now();
        let streams = self.streams.lock().expect("stream map poisoned");
        streams
            .values()
            .filter(|s| {
                let elapsed = (now - s.last_frame_time).num_milliseconds().max(0) as u128;
                elapsed >= timeout.as_millis()
            })
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn stats(&self, name: &str) -> Option<StreamStats> {
        let streams = self.streams.lock().expect("stream map poisoned");
        streams.get(name).map(Self::stats_of)
    }

    pub fn all_stats(&self) -> Vec<StreamStats> {
        let streams = self.streams.lock().expect("stream map poisoned");
        let mut stats: Vec<StreamStats> = streams.values().map(Self::stats_of).collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn count(&self) -> usize {
        let streams = self.streams.lock().expect("stream map poisoned");
        streams.len()
    }

    fn stats_of(stream: &StreamInfo) -> StreamStats {
        let now = Utc::now();
        StreamStats {
            name: stream.name.clone(),
            created_at: to_rfc3339(stream.created_at),
            uptime_seconds: (now - stream.created_at).num_milliseconds().max(0) as f64 / 1000.0,
            last_frame_time: to_rfc3339(stream.last_frame_time),
            inactive_seconds: (now - stream.last_frame_time).num_milliseconds().max(0) as f64
                / 1000.0,
            total_frames: stream.total_frames,
            viewer_count: stream.viewer_count,
            buffer_size: stream.frame_buffer.len(),
            has_current_frame: stream.current_frame.is_some(),
        }
    }

    /// Register a viewer; returns a guard that deregisters exactly once on drop
    pub fn watch(self: &Arc<Self>, name: &str) -> Option<ViewerGuard> {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        let stream = streams.get_mut(name)?;
        stream.viewer_count += 1;
        info!(
            stream = %name,
            viewer_count = stream.viewer_count,
            "Viewer connected"
        );
        Some(ViewerGuard::new(Arc::clone(self), name.to_string()))
    }

    pub(crate) fn viewer_disconnected(&self, name: &str) {
        let mut streams = self.streams.lock().expect("stream map poisoned");
        if let Some(stream) = streams.get_mut(name) {
            stream.viewer_count = stream.viewer_count.saturating_sub(1);
            info!(
                stream = %name,
                viewer_count = stream.viewer_count,
                "Viewer disconnected"
            );
        }
    }
}
