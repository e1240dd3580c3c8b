//! ABOUTME: Video encoder seam between the recording worker and the container muxer
//! ABOUTME: Production impl pipes raw RGB frames into an ffmpeg child process

use async_trait::async_trait;
use fc_core::{Error, Result};
use std::{path::Path, process::Stdio, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    process::{Child, ChildStdin, Command},
};
use tracing::{debug, info};

/// How long to wait for the muxer to flush and exit after stdin closes
const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// A container writer for a single recording.
///
/// Frame dimensions are fixed at open; the worker never hands an encoder a
/// frame of a different size.
#[async_trait]
pub trait VideoEncoder: Send {
    /// Append one RGB8 frame (`width * height * 3` bytes)
    async fn write_frame(&mut self, rgb: &[u8]) -> Result<()>;

    /// Flush and close the container
    async fn finish(&mut self) -> Result<()>;
}

/// Opens encoders sized to the first decoded frame of a recording
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: &str,
    ) -> Result<Box<dyn VideoEncoder>>;
}

/// Spawns an `ffmpeg` child per recording, feeding raw frames over stdin
pub struct FfmpegEncoderFactory;

/// Map the configured fourcc-style codec name to an ffmpeg encoder name
fn encoder_name(codec: &str) -> &str {
    match codec {
        "mp4v" => "mpeg4",
        "avc1" | "h264" => "libx264",
        other => other,
    }
}

#[async_trait]
impl EncoderFactory for FfmpegEncoderFactory {
    async fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        codec: &str,
    ) -> Result<Box<dyn VideoEncoder>> {
        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-video_size",
                &format!("{}x{}", width, height),
                "-framerate",
                &fps.to_string(),
                "-i",
                "-",
                "-an",
                "-vcodec",
                encoder_name(codec),
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Encoder(format!("failed to spawn ffmpeg: {}", e)))?;

        let stdin = child.stdin.take();
        info!(
            path = %path.display(),
            width,
            height,
            fps,
            codec,
            "Recording container opened"
        );

        Ok(Box::new(FfmpegEncoder { child, stdin }))
    }
}

struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn write_frame(&mut self, rgb: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Encoder("encoder already finished".to_string()))?;
        stdin
            .write_all(rgb)
            .await
            .map_err(|e| Error::Encoder(format!("frame write failed: {}", e)))
    }

    async fn finish(&mut self) -> Result<()> {
        // Closing stdin tells ffmpeg to flush the container and exit
        drop(self.stdin.take());

        let status = tokio::time::timeout(FINISH_TIMEOUT, self.child.wait())
            .await
            .map_err(|_| Error::Encoder("ffmpeg did not exit after stdin close".to_string()))?
            .map_err(|e| Error::Encoder(format!("ffmpeg wait failed: {}", e)))?;

        if !status.success() {
            return Err(Error::Encoder(format!("ffmpeg exited with {}", status)));
        }
        debug!("Recording container closed");
        Ok(())
    }
}
