//! ABOUTME: Background cleanup manager for inactive streams and old recordings
//! ABOUTME: Interval sweep plus daily cron retention sweep

use chrono::{Local, Offset, Utc};
use fc_core::{Error, Result};
use fc_record::RecordingService;
use fc_stream::StreamManager;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

mod retention;

use retention::{prune_empty_dirs, remove_files_older_than};

const SECONDS_PER_DAY: u64 = 86_400;

/// Tuning knobs for the cleanup jobs
#[derive(Debug, Clone)]
pub struct CleanupSettings {
    /// Inactivity threshold after which a stream is reclaimed
    pub stream_timeout: Duration,
    /// Interval between inactive-stream sweeps
    pub interval: Duration,
    /// Daily retention sweep time, "HH:MM" local
    pub schedule_time: String,
    /// Recording files older than this many days are deleted
    pub retention_days: u32,
    /// Root of the recordings tree
    pub recordings_dir: PathBuf,
}

/// Shared state the sweep jobs operate on
#[derive(Clone)]
struct SweepContext {
    streams: Arc<StreamManager>,
    recordings: Option<Arc<RecordingService>>,
    stream_timeout: Duration,
    retention_days: u32,
    recordings_dir: PathBuf,
}

impl SweepContext {
    /// Reclaim streams whose last publish is older than the timeout.
    ///
    /// The inactive scan returns a name snapshot without holding the stream
    /// lock, so each stop/delete below re-acquires it independently.
    async fn sweep_inactive(&self) {
        let inactive = self.streams.inactive_streams(self.stream_timeout);
        if inactive.is_empty() {
            debug!("No inactive streams to clean up");
            return;
        }

        info!(count = inactive.len(), "Found inactive streams");
        for name in &inactive {
            if let Some(recordings) = &self.recordings {
                recordings.stop_recording(name).await;
            }
            self.streams.delete(name);
            info!(stream = %name, "Cleaned up inactive stream");
        }
        info!(count = inactive.len(), "Inactive stream sweep complete");
    }

    /// Delete recordings past the retention window, then prune empty dirs
    fn sweep_retention(&self) {
        if !self.recordings_dir.exists() {
            debug!("Recordings directory does not exist");
            return;
        }

        let cutoff =
            SystemTime::now() - Duration::from_secs(u64::from(self.retention_days) * SECONDS_PER_DAY);
        info!(
            retention_days = self.retention_days,
            "Starting cleanup of old recordings"
        );

        let (deleted, bytes) = remove_files_older_than(&self.recordings_dir, cutoff);
        prune_empty_dirs(&self.recordings_dir);

        if deleted > 0 {
            info!(
                deleted,
                deleted_mb = format!("{:.2}", bytes as f64 / (1024.0 * 1024.0)),
                "Retention sweep complete"
            );
        } else {
            info!("No old recordings to clean up");
        }
    }
}

/// Runs the two background reclamation jobs.
///
/// Both sweeps are idempotent and safe to overlap with HTTP handlers and with
/// each other; they only take the stream and worker registry locks briefly.
pub struct CleanupManager {
    ctx: SweepContext,
    interval: Duration,
    schedule_time: String,
    scheduler: Mutex<Option<JobScheduler>>,
}

impl CleanupManager {
    pub fn new(
        streams: Arc<StreamManager>,
        recordings: Option<Arc<RecordingService>>,
        settings: CleanupSettings,
    ) -> Self {
        info!("CleanupManager initialized");
        Self {
            ctx: SweepContext {
                streams,
                recordings,
                stream_timeout: settings.stream_timeout,
                retention_days: settings.retention_days,
                recordings_dir: settings.recordings_dir,
            },
            interval: settings.interval,
            schedule_time: settings.schedule_time,
            scheduler: Mutex::new(None),
        }
    }

    /// Start both scheduled jobs. A malformed `schedule_time` skips the
    /// retention job only; the inactive sweep always runs.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_some() {
            warn!("CleanupManager already running");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::Config(format!("Failed to create cleanup scheduler: {}", e)))?;

        let ctx = self.ctx.clone();
        let interval_job = Job::new_repeated_async(self.interval, move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                ctx.sweep_inactive().await;
            })
        })
        .map_err(|e| Error::Config(format!("Failed to create inactive sweep job: {}", e)))?;
        scheduler
            .add(interval_job)
            .await
            .map_err(|e| Error::Config(format!("Failed to schedule inactive sweep: {}", e)))?;
        info!(
            interval_seconds = self.interval.as_secs(),
            "Scheduled inactive stream cleanup"
        );

        match parse_schedule_time(&self.schedule_time) {
            Some((hour, minute)) => {
                let expr = daily_cron_utc(hour, minute);
                let ctx = self.ctx.clone();
                let retention_job = Job::new_async(expr.as_str(), move |_uuid, _lock| {
                    let ctx = ctx.clone();
                    Box::pin(async move {
                        // The walk touches the filesystem; keep it off the
                        // async workers
                        if let Err(e) =
                            tokio::task::spawn_blocking(move || ctx.sweep_retention()).await
                        {
                            error!(error = %e, "Retention sweep task failed");
                        }
                    })
                })
                .map_err(|e| Error::Config(format!("Failed to create retention job: {}", e)))?;
                scheduler.add(retention_job).await.map_err(|e| {
                    Error::Config(format!("Failed to schedule retention sweep: {}", e))
                })?;

                let next_run = cron::Schedule::from_str(&expr)
                    .ok()
                    .and_then(|s| s.upcoming(Utc).next());
                info!(
                    schedule_time = %self.schedule_time,
                    next_run = ?next_run,
                    "Scheduled old recordings cleanup"
                );
            }
            None => {
                error!(
                    schedule_time = %self.schedule_time,
                    "Invalid cleanup schedule time, retention sweep not scheduled"
                );
            }
        }

        scheduler
            .start()
            .await
            .map_err(|e| Error::Config(format!("Failed to start cleanup scheduler: {}", e)))?;
        *guard = Some(scheduler);
        info!("CleanupManager started");
        Ok(())
    }

    /// Stop the scheduler, waiting for in-flight jobs
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.scheduler.lock().await;
        if let Some(mut scheduler) = guard.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| Error::Config(format!("Failed to stop cleanup scheduler: {}", e)))?;
            info!("CleanupManager stopped");
        }
        Ok(())
    }

    /// Run both sweeps synchronously (operator override and tests)
    pub async fn run_now(&self) {
        info!("Manual cleanup triggered");
        self.ctx.sweep_inactive().await;
        self.ctx.sweep_retention();
        info!("Manual cleanup completed");
    }
}

/// Parse "HH:MM" into hour and minute
fn parse_schedule_time(value: &str) -> Option<(u32, u32)> {
    let (hour, minute) = value.split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

/// Six-field cron expression firing daily at the given local wall time.
///
/// The scheduler evaluates cron in UTC, so the local time is shifted by the
/// current offset once at scheduling time; drift across DST transitions is
/// acceptable.
fn daily_cron_utc(hour: u32, minute: u32) -> String {
    let offset_minutes = Local::now().offset().fix().local_minus_utc() / 60;
    let local_minutes = (hour * 60 + minute) as i32;
    let utc_minutes = (local_minutes - offset_minutes).rem_euclid(24 * 60);
    format!("0 {} {} * * *", utc_minutes % 60, utc_minutes / 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use fc_record::{EncoderFactory, VideoEncoder};

    struct StubFactory;
    struct StubEncoder;

    #[async_trait]
    impl EncoderFactory for StubFactory {
        async fn open(
            &self,
            path: &Path,
            _width: u32,
            _height: u32,
            _fps: u32,
            _codec: &str,
        ) -> Result<Box<dyn VideoEncoder>> {
            tokio::fs::write(path, b"container").await?;
            Ok(Box::new(StubEncoder))
        }
    }

    #[async_trait]
    impl VideoEncoder for StubEncoder {
        async fn write_frame(&mut self, _rgb: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn settings(dir: &Path, timeout: Duration) -> CleanupSettings {
        CleanupSettings {
            stream_timeout: timeout,
            interval: Duration::from_secs(1),
            schedule_time: "03:00".to_string(),
            retention_days: 7,
            recordings_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_parse_schedule_time() {
        assert_eq!(parse_schedule_time("03:00"), Some((3, 0)));
        assert_eq!(parse_schedule_time("23:59"), Some((23, 59)));
        assert_eq!(parse_schedule_time("0:5"), Some((0, 5)));
        assert_eq!(parse_schedule_time("24:00"), None);
        assert_eq!(parse_schedule_time("12:60"), None);
        assert_eq!(parse_schedule_time("noon"), None);
        assert_eq!(parse_schedule_time("12-30"), None);
    }

    #[test]
    fn test_daily_cron_is_valid_expression() {
        for (hour, minute) in [(0, 0), (3, 0), (23, 59), (12, 30)] {
            let expr = daily_cron_utc(hour, minute);
            assert!(
                cron::Schedule::from_str(&expr).is_ok(),
                "bad cron expr {:?}",
                expr
            );
        }
    }

    #[tokio::test]
    async fn test_sweep_inactive_reclaims_stale_streams() {
        let dir = tempfile::tempdir().unwrap();
        let streams = Arc::new(StreamManager::new(10, 30));
        streams.create("ghost").unwrap();
        streams
            .publish("ghost", Bytes::from(test_support::test_jpeg(16, 16)))
            .unwrap();

        let manager = CleanupManager::new(
            Arc::clone(&streams),
            None,
            settings(dir.path(), Duration::from_secs(0)),
        );
        manager.run_now().await;

        assert_eq!(streams.count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_inactive_spares_active_streams() {
        let dir = tempfile::tempdir().unwrap();
        let streams = Arc::new(StreamManager::new(10, 30));
        streams.create("live").unwrap();
        streams
            .publish("live", Bytes::from(test_support::test_jpeg(16, 16)))
            .unwrap();

        let manager = CleanupManager::new(
            Arc::clone(&streams),
            None,
            settings(dir.path(), Duration::from_secs(3600)),
        );
        manager.run_now().await;

        assert!(streams.exists("live"));
    }

    #[tokio::test]
    async fn test_sweep_stops_recording_before_delete() {
        let dir = tempfile::tempdir().unwrap();
        let streams = Arc::new(StreamManager::new(10, 30));
        let recordings = Arc::new(
            RecordingService::with_factory(dir.path(), 30, "mp4v", Arc::new(StubFactory)).unwrap(),
        );

        streams.create("ghost").unwrap();
        let jpeg = Bytes::from(test_support::test_jpeg(16, 16));
        streams.publish("ghost", jpeg.clone()).unwrap();
        recordings.start_recording("ghost");
        recordings.add_frame("ghost", jpeg);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let manager = CleanupManager::new(
            Arc::clone(&streams),
            Some(Arc::clone(&recordings)),
            settings(dir.path(), Duration::from_secs(0)),
        );
        manager.run_now().await;

        assert_eq!(streams.count(), 0);
        assert!(recordings.active_recordings().is_empty());
        // The finalized recording and its sidecar survive the sweep
        let stream_dir = dir.path().join("ghost");
        let names: Vec<String> = std::fs::read_dir(&stream_dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.ends_with(".mp4")));
        assert!(names.iter().any(|n| n.ends_with(".json")));
    }

    #[tokio::test]
    async fn test_start_with_bad_schedule_still_starts() {
        let dir = tempfile::tempdir().unwrap();
        let streams = Arc::new(StreamManager::new(10, 30));
        let mut bad = settings(dir.path(), Duration::from_secs(300));
        bad.schedule_time = "not-a-time".to_string();

        let manager = CleanupManager::new(streams, None, bad);
        manager.start().await.unwrap();
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let streams = Arc::new(StreamManager::new(10, 30));
        let manager =
            CleanupManager::new(streams, None, settings(dir.path(), Duration::from_secs(300)));
        manager.stop().await.unwrap();
    }
}
