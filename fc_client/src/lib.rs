//! ABOUTME: Adaptive stream publisher client
//! ABOUTME: Bounded frame queue with a background sender, quality adaptation, load shedding

use fc_core::{Error, Result};
use image::{codecs::jpeg::JpegEncoder, ExtendedColorType, ImageEncoder};
use rand::Rng;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Floor for adaptive JPEG quality
const MIN_QUALITY: u8 = 50;

/// Queue utilization above which proactive skipping starts
const SKIP_THRESHOLD: f64 = 0.7;

/// Quality is re-evaluated every this many dequeued frames
const ADAPT_EVERY: u64 = 30;

/// Send durations averaged for adaptation
const DURATION_WINDOW: usize = 10;

/// Dequeue timeout so stop requests and idle resets are responsive
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Per-request HTTP timeout
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long stop waits for the sender task
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A raw RGB8 frame handed to the publisher by the application
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major RGB
    pub data: Vec<u8>,
}

/// Publisher tuning knobs
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub server_url: String,
    pub stream_name: String,
    /// JPEG quality when the link keeps up
    pub base_quality: u8,
    /// Upper bound on the send rate; 0 disables rate limiting
    pub max_fps: u32,
    /// Backoff after a failed send while the queue has headroom
    pub retry_delay: Duration,
    pub max_queue_size: usize,
    /// Enables proactive skipping and quality adaptation
    pub adaptive: bool,
}

impl PublisherConfig {
    pub fn new(server_url: impl Into<String>, stream_name: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            stream_name: stream_name.into(),
            base_quality: 85,
            max_fps: 30,
            retry_delay: Duration::from_secs(5),
            max_queue_size: 15,
            adaptive: true,
        }
    }
}

/// Point-in-time publisher statistics.
///
/// `skipped` counts proactive shedding upstream of the queue; `dropped`
/// counts involuntary loss at the queue boundary.
#[derive(Debug, Clone)]
pub struct PublisherStats {
    pub stream_name: String,
    pub total_frames: u64,
    pub failed_frames: u64,
    pub skipped_frames: u64,
    pub dropped_frames: u64,
    pub queue_size: usize,
    pub quality: u8,
    pub is_running: bool,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    dropped: AtomicU64,
    quality: AtomicU8,
    running: AtomicBool,
}

/// Publishes frames to a relay server from a background sender task.
///
/// `publish_frame` never blocks: under queue pressure frames are either
/// skipped (adaptive shedding) or dropped (queue full).
pub struct StreamPublisher {
    config: PublisherConfig,
    tx: mpsc::Sender<RawFrame>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamPublisher {
    /// Start the background sender and return the handle
    pub fn start(config: PublisherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_queue_size);
        let counters = Arc::new(Counters::default());
        counters.quality.store(config.base_quality, Ordering::Relaxed);
        counters.running.store(true, Ordering::Relaxed);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sender_loop(
            config.clone(),
            rx,
            tx.clone(),
            Arc::clone(&counters),
            cancel.clone(),
        ));
        info!(
            stream = %config.stream_name,
            server = %config.server_url,
            "Publisher started"
        );

        Self {
            config,
            tx,
            counters,
            cancel,
            handle,
        }
    }

    /// Offer a frame (non-blocking). Returns whether it was queued.
    pub fn publish_frame(&self, frame: RawFrame) -> bool {
        let utilization = self.queue_utilization();

        if self.config.adaptive && utilization > SKIP_THRESHOLD {
            let p = skip_probability(utilization);
            if rand::thread_rng().gen::<f64>() < p {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    stream = %self.config.stream_name,
                    utilization,
                    "Frame skipped under queue pressure"
                );
                return false;
            }
        }

        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(stream = %self.config.stream_name, "Frame queue full, dropping frame");
                false
            }
        }
    }

    /// Stop the sender, waiting up to 5 s
    pub async fn stop(self) {
        self.cancel.cancel();
        if timeout(STOP_TIMEOUT, self.handle).await.is_err() {
            warn!(stream = %self.config.stream_name, "Publisher did not stop in time");
        }
        self.counters.running.store(false, Ordering::Relaxed);
        info!(
            stream = %self.config.stream_name,
            total = self.counters.total.load(Ordering::Relaxed),
            failed = self.counters.failed.load(Ordering::Relaxed),
            "Publisher stopped"
        );
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            stream_name: self.config.stream_name.clone(),
            total_frames: self.counters.total.load(Ordering::Relaxed),
            failed_frames: self.counters.failed.load(Ordering::Relaxed),
            skipped_frames: self.counters.skipped.load(Ordering::Relaxed),
            dropped_frames: self.counters.dropped.load(Ordering::Relaxed),
            queue_size: self.tx.max_capacity() - self.tx.capacity(),
            quality: self.counters.quality.load(Ordering::Relaxed),
            is_running: self.counters.running.load(Ordering::Relaxed),
        }
    }

    fn queue_utilization(&self) -> f64 {
        let capacity = self.tx.max_capacity();
        let used = capacity - self.tx.capacity();
        used as f64 / capacity as f64
    }
}

/// Probability of proactively skipping a frame at the given queue utilization
fn skip_probability(utilization: f64) -> f64 {
    ((utilization - SKIP_THRESHOLD) / (1.0 - SKIP_THRESHOLD)).clamp(0.0, 1.0)
}

/// One adaptation step over the recent send durations and queue utilization
fn adapt_quality(quality: u8, base: u8, durations: &VecDeque<f64>, utilization: f64) -> u8 {
    if durations.is_empty() {
        return quality;
    }
    let avg = durations.iter().sum::<f64>() / durations.len() as f64;

    if avg > 0.5 && utilization > 0.5 {
        quality.saturating_sub(5).max(MIN_QUALITY)
    } else if avg < 0.2 && utilization < 0.3 && quality < base {
        (quality + 5).min(base)
    } else {
        quality
    }
}

fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Vec<u8>> {
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() != expected {
        return Err(Error::Encoder(format!(
            "RGB data size mismatch: expected {}, got {}",
            expected,
            frame.data.len()
        )));
    }

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .write_image(
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::Encoder(format!("JPEG encode failed: {}", e)))?;
    Ok(buf)
}

async fn send_frame(client: &reqwest::Client, url: &str, jpeg: Vec<u8>) -> Result<()> {
    let part = reqwest::multipart::Part::bytes(jpeg)
        .file_name("frame.jpg")
        .mime_str("image/jpeg")
        .map_err(|e| Error::Upload(e.to_string()))?;
    let form = reqwest::multipart::Form::new().part("frame", part);

    let response = client
        .post(url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| Error::Upload(e.to_string()))?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(Error::Upload(format!(
            "server returned status {}",
            response.status()
        )))
    }
}

async fn sender_loop(
    config: PublisherConfig,
    mut rx: mpsc::Receiver<RawFrame>,
    tx_probe: mpsc::Sender<RawFrame>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let client = match reqwest::Client::builder().timeout(SEND_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Failed to build HTTP client, publisher inert");
            counters.running.store(false, Ordering::Relaxed);
            return;
        }
    };
    let publish_url = format!(
        "{}/publish/{}",
        config.server_url.trim_end_matches('/'),
        config.stream_name
    );
    let frame_interval = (config.max_fps > 0)
        .then(|| Duration::from_secs_f64(1.0 / f64::from(config.max_fps)));

    let mut quality = config.base_quality;
    let mut dequeued: u64 = 0;
    let mut durations: VecDeque<f64> = VecDeque::with_capacity(DURATION_WINDOW);
    let mut last_send: Option<Instant> = None;

    let utilization = |probe: &mpsc::Sender<RawFrame>| {
        let capacity = probe.max_capacity();
        (capacity - probe.capacity()) as f64 / capacity as f64
    };

    debug!(stream = %config.stream_name, "Publisher worker running");
    while !cancel.is_cancelled() {
        let frame = match timeout(DEQUEUE_TIMEOUT, rx.recv()).await {
            Err(_) => {
                // Idle: recover quality so the next burst starts clean
                if config.adaptive && quality != config.base_quality {
                    quality = config.base_quality;
                    counters.quality.store(quality, Ordering::Relaxed);
                    debug!(stream = %config.stream_name, "Queue idle, quality reset");
                }
                continue;
            }
            Ok(None) => break,
            Ok(Some(frame)) => frame,
        };
        dequeued += 1;

        if config.adaptive && dequeued % ADAPT_EVERY == 0 {
            let adapted = adapt_quality(
                quality,
                config.base_quality,
                &durations,
                utilization(&tx_probe),
            );
            if adapted != quality {
                debug!(
                    stream = %config.stream_name,
                    from = quality,
                    to = adapted,
                    "Quality adapted"
                );
                quality = adapted;
                counters.quality.store(quality, Ordering::Relaxed);
            }
        }

        if let (Some(interval), Some(last)) = (frame_interval, last_send) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }

        let jpeg = match encode_jpeg(&frame, quality) {
            Ok(jpeg) => jpeg,
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(stream = %config.stream_name, error = %e, "Frame encode failed");
                continue;
            }
        };

        let started = Instant::now();
        match send_frame(&client, &publish_url, jpeg).await {
            Ok(()) => {
                counters.total.fetch_add(1, Ordering::Relaxed);
                last_send = Some(Instant::now());
                if durations.len() == DURATION_WINDOW {
                    durations.pop_front();
                }
                durations.push_back(started.elapsed().as_secs_f64());
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(stream = %config.stream_name, error = %e, "Failed to send frame");
                // Back off only while the queue has headroom to absorb it
                if utilization(&tx_probe) < 0.5 {
                    tokio::time::sleep(config.retry_delay.min(Duration::from_secs(1))).await;
                }
            }
        }
    }

    counters.running.store(false, Ordering::Relaxed);
    debug!(stream = %config.stream_name, "Publisher worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn frame(width: u32, height: u32) -> RawFrame {
        RawFrame {
            width,
            height,
            data: vec![128; (width * height * 3) as usize],
        }
    }

    fn fast_config(server_url: &str) -> PublisherConfig {
        let mut config = PublisherConfig::new(server_url, "cam");
        config.max_fps = 0; // no rate limiting in tests
        config.retry_delay = Duration::from_millis(10);
        config
    }

    #[test]
    fn test_skip_probability_curve() {
        assert_eq!(skip_probability(0.0), 0.0);
        assert_eq!(skip_probability(0.7), 0.0);
        assert!((skip_probability(0.85) - 0.5).abs() < 1e-9);
        assert_eq!(skip_probability(1.0), 1.0);
        assert_eq!(skip_probability(2.0), 1.0);
    }

    #[test]
    fn test_adapt_quality_degrades_under_pressure() {
        let slow: VecDeque<f64> = (0..10).map(|_| 0.8).collect();
        assert_eq!(adapt_quality(85, 85, &slow, 0.9), 80);
        // Floor at 50
        assert_eq!(adapt_quality(50, 85, &slow, 0.9), 50);
        assert_eq!(adapt_quality(52, 85, &slow, 0.9), 50);
    }

    #[test]
    fn test_adapt_quality_recovers_when_healthy() {
        let fast: VecDeque<f64> = (0..10).map(|_| 0.05).collect();
        assert_eq!(adapt_quality(70, 85, &fast, 0.1), 75);
        // Never exceeds base quality
        assert_eq!(adapt_quality(85, 85, &fast, 0.1), 85);
        assert_eq!(adapt_quality(83, 85, &fast, 0.1), 85);
    }

    #[test]
    fn test_adapt_quality_holds_in_between() {
        let medium: VecDeque<f64> = (0..10).map(|_| 0.3).collect();
        assert_eq!(adapt_quality(70, 85, &medium, 0.4), 70);
        let empty = VecDeque::new();
        assert_eq!(adapt_quality(70, 85, &empty, 0.9), 70);
    }

    #[test]
    fn test_encode_jpeg_roundtrip() {
        let jpeg = encode_jpeg(&frame(32, 24), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn test_encode_jpeg_rejects_bad_dimensions() {
        let bad = RawFrame {
            width: 10,
            height: 10,
            data: vec![0; 5],
        };
        assert!(encode_jpeg(&bad, 80).is_err());
    }

    #[tokio::test]
    async fn test_frames_are_delivered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish/cam"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let publisher = StreamPublisher::start(fast_config(&server.uri()));
        for _ in 0..3 {
            publisher.publish_frame(frame(16, 16));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stats = publisher.stats();
        assert_eq!(stats.total_frames, 3);
        assert_eq!(stats.failed_frames, 0);
        assert_eq!(stats.quality, 85);
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_server_errors_count_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/publish/cam"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let publisher = StreamPublisher::start(fast_config(&server.uri()));
        publisher.publish_frame(frame(16, 16));
        tokio::time::sleep(Duration::from_millis(500)).await;

        let stats = publisher.stats();
        assert_eq!(stats.total_frames, 0);
        assert!(stats.failed_frames >= 1);
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_queue_is_bounded_and_accounted() {
        let server = MockServer::start().await;
        // Slow responses force queue pressure
        Mock::given(method("POST"))
            .and(path("/publish/cam"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let mut config = fast_config(&server.uri());
        config.max_queue_size = 5;
        let publisher = StreamPublisher::start(config);

        let offered: u64 = 50;
        let mut queued: u64 = 0;
        for _ in 0..offered {
            if publisher.publish_frame(frame(16, 16)) {
                queued += 1;
            }
        }

        let stats = publisher.stats();
        assert!(stats.queue_size <= 5);
        assert!(stats.skipped_frames + stats.dropped_frames > 0);
        // Every offered frame is either queued, skipped, or dropped
        assert_eq!(
            queued + stats.skipped_frames + stats.dropped_frames,
            offered
        );
        assert!(stats.quality >= MIN_QUALITY && stats.quality <= 85);
        publisher.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let publisher = StreamPublisher::start(fast_config(&server.uri()));
        let started = std::time::Instant::now();
        publisher.stop().await;
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
