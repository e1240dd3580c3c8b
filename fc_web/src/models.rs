//! ABOUTME: Wire models for the HTTP API
//! ABOUTME: Response bodies for publish, listing, deletion, and health

use fc_stream::StreamStats;
use serde::{Deserialize, Serialize};

/// Error body: `{"error": "<message>"}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
    pub stream: String,
    pub frame_size: usize,
}

#[derive(Debug, Serialize)]
pub struct StreamListResponse {
    pub count: usize,
    pub streams: Vec<StreamStats>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_streams: usize,
    pub max_streams: usize,
    pub recording_enabled: bool,
    pub config: HealthConfigInfo,
}

/// Subset of the configuration surfaced by the health endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthConfigInfo {
    pub timeout_seconds: u64,
    pub max_buffer_frames: usize,
    pub retention_days: u32,
}
