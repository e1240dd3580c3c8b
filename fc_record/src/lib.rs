//! ABOUTME: Asynchronous per-stream recording to disk
//! ABOUTME: Bounded JPEG inboxes feeding a black-box video encoder plus JSON sidecars

mod encoder;
mod service;
mod worker;

pub use encoder::{EncoderFactory, FfmpegEncoderFactory, VideoEncoder};
pub use service::RecordingService;
pub use worker::{RecordingMeta, RecordingWorker};
