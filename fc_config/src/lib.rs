//! ABOUTME: Configuration management with validation and environment overrides
//! ABOUTME: Loads tuning knobs from config.yaml and well-known env vars

use config::{Config as ConfigBuilder, File};
use fc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub streams: StreamsConfig,
    #[validate(nested)]
    pub recording: RecordingConfig,
    pub cleanup: CleanupConfig,
    #[validate(nested)]
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Live stream registry limits
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StreamsConfig {
    /// Seconds without a publish before a stream is considered inactive
    #[validate(range(min = 1))]
    pub timeout_seconds: u64,
    /// Maximum number of concurrent live streams
    #[validate(range(min = 1, max = 10000))]
    pub max_concurrent: usize,
    /// Most recent frames retained per stream
    #[validate(range(min = 1, max = 1000))]
    pub max_buffer_frames: usize,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            max_concurrent: 50,
            max_buffer_frames: 30,
        }
    }
}

/// Recording service settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RecordingConfig {
    pub enabled: bool,
    pub codec: String,
    #[validate(range(min = 1, max = 240))]
    pub fps: u32,
    #[validate(range(min = 1, max = 3650))]
    pub retention_days: u32,
    /// Base directory for recording files and sidecars
    pub base_dir: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            codec: "mp4v".to_string(),
            fps: 30,
            retention_days: 7,
            base_dir: "recordings".to_string(),
        }
    }
}

/// Background sweep schedules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    /// Seconds between inactive-stream sweeps
    pub interval_seconds: u64,
    /// Daily retention sweep time, "HH:MM" local. A malformed value is
    /// reported at startup and that job is skipped, so it is not validated
    /// here.
    pub schedule_time: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            schedule_time: "03:00".to_string(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,
    pub debug: bool,
    pub cors_enabled: bool,
    #[validate(range(min = 1, max = 100))]
    pub max_frame_size_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: false,
            cors_enabled: true,
            max_frame_size_mb: 10,
        }
    }
}

/// Log sink settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default `config.yaml` and environment
    pub fn load() -> Result<Self> {
        Self::load_from("config.yaml")
    }

    /// Load configuration from an explicit file path and environment
    pub fn load_from(path: &str) -> Result<Self> {
        let mut builder = ConfigBuilder::builder()
            .set_default("streams.timeout_seconds", 300)?
            .set_default("streams.max_concurrent", 50)?
            .set_default("streams.max_buffer_frames", 30)?
            .set_default("recording.enabled", true)?
            .set_default("recording.codec", "mp4v")?
            .set_default("recording.fps", 30)?
            .set_default("recording.retention_days", 7)?
            .set_default("recording.base_dir", "recordings")?
            .set_default("cleanup.interval_seconds", 60)?
            .set_default("cleanup.schedule_time", "03:00")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.debug", false)?
            .set_default("server.cors_enabled", true)?
            .set_default("server.max_frame_size_mb", 10)?
            .set_default("logging.level", "info")?;

        if std::path::Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        // Well-known environment overrides take precedence over the file
        if let Ok(timeout) = std::env::var("STREAM_TIMEOUT_SECONDS") {
            builder = builder.set_override("streams.timeout_seconds", timeout)?;
        }
        if let Ok(max) = std::env::var("MAX_CONCURRENT_STREAMS") {
            builder = builder.set_override("streams.max_concurrent", max)?;
        }
        if let Ok(days) = std::env::var("RECORDING_RETENTION_DAYS") {
            builder = builder.set_override("recording.retention_days", days)?;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            builder = builder.set_override("logging.level", level)?;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            builder = builder.set_override("server.port", port)?;
        }
        if let Ok(debug) = std::env::var("SERVER_DEBUG") {
            builder = builder.set_override("server.debug", debug.to_lowercase() == "true")?;
        }

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed
            .validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))?;

        Ok(parsed)
    }

    /// Maximum accepted publish body size in bytes
    pub fn max_frame_size_bytes(&self) -> usize {
        self.server.max_frame_size_mb * 1024 * 1024
    }

    /// Inactivity threshold as a Duration
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.streams.timeout_seconds)
    }

    /// Interval between inactive-stream sweeps
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Use a mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 6] = [
        "STREAM_TIMEOUT_SECONDS",
        "MAX_CONCURRENT_STREAMS",
        "RECORDING_RETENTION_DAYS",
        "LOG_LEVEL",
        "SERVER_PORT",
        "SERVER_DEBUG",
    ];

    fn clear_env() {
        for key in ENV_VARS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load_from("does-not-exist.yaml").expect("Should load with defaults");

        assert_eq!(config.streams.timeout_seconds, 300);
        assert_eq!(config.streams.max_concurrent, 50);
        assert_eq!(config.streams.max_buffer_frames, 30);
        assert!(config.recording.enabled);
        assert_eq!(config.recording.codec, "mp4v");
        assert_eq!(config.recording.fps, 30);
        assert_eq!(config.recording.retention_days, 7);
        assert_eq!(config.cleanup.interval_seconds, 60);
        assert_eq!(config.cleanup.schedule_time, "03:00");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert!(config.server.cors_enabled);
        assert_eq!(config.max_frame_size_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("STREAM_TIMEOUT_SECONDS", "30");
        env::set_var("MAX_CONCURRENT_STREAMS", "5");
        env::set_var("RECORDING_RETENTION_DAYS", "2");
        env::set_var("SERVER_PORT", "9000");
        env::set_var("SERVER_DEBUG", "True");

        let config = Config::load_from("does-not-exist.yaml").expect("Should load from env");

        assert_eq!(config.streams.timeout_seconds, 30);
        assert_eq!(config.streams.max_concurrent, 5);
        assert_eq!(config.recording.retention_days, 2);
        assert_eq!(config.server.port, 9000);
        assert!(config.server.debug);

        clear_env();
    }

    #[test]
    fn test_config_validation_failure() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        env::set_var("MAX_CONCURRENT_STREAMS", "0"); // Below minimum

        let result = Config::load_from("does-not-exist.yaml");
        assert!(result.is_err());

        clear_env();
    }

    #[test]
    fn test_duration_helpers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();

        let config = Config::load_from("does-not-exist.yaml").unwrap();
        assert_eq!(config.stream_timeout(), Duration::from_secs(300));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(60));
    }
}
