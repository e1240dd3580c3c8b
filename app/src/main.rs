use clap::Parser;
use fc_config::Config;
use fc_core::telemetry;
use fc_record::RecordingService;
use fc_sched::{CleanupManager, CleanupSettings};
use fc_stream::StreamManager;
use fc_web::AppState;
use std::{process, sync::Arc};

#[derive(Parser)]
#[command(name = "framecast")]
#[command(about = "Multi-tenant MJPEG relay and recording server")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration - exit with non-zero if invalid
    let config = match Config::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let env = if config.server.debug {
        "development"
    } else {
        "production"
    };
    telemetry::init_tracing(env, "framecast", &config.logging.level);
    tracing::debug!(?config, "Configuration loaded successfully");

    tracing::info!("framecast starting");
    if let Err(e) = start_server(config).await {
        tracing::error!("Failed to start server: {}", e);
        process::exit(1);
    }
}

async fn start_server(config: Config) -> fc_core::Result<()> {
    let config = Arc::new(config);

    let streams = Arc::new(StreamManager::new(
        config.streams.max_concurrent,
        config.streams.max_buffer_frames,
    ));

    let recording = if config.recording.enabled {
        let service = RecordingService::new(
            &config.recording.base_dir,
            config.recording.fps,
            config.recording.codec.clone(),
        )?;
        tracing::info!("Recording service initialized");
        Some(Arc::new(service))
    } else {
        tracing::info!("Recording disabled");
        None
    };

    let cleanup = Arc::new(CleanupManager::new(
        Arc::clone(&streams),
        recording.clone(),
        CleanupSettings {
            stream_timeout: config.stream_timeout(),
            interval: config.cleanup_interval(),
            schedule_time: config.cleanup.schedule_time.clone(),
            retention_days: config.recording.retention_days,
            recordings_dir: config.recording.base_dir.clone().into(),
        },
    ));
    cleanup.start().await?;
    tracing::info!("Cleanup manager started");

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        max_concurrent_streams = config.streams.max_concurrent,
        stream_timeout_seconds = config.streams.timeout_seconds,
        recording_enabled = config.recording.enabled,
        codec = %config.recording.codec,
        fps = config.recording.fps,
        retention_days = config.recording.retention_days,
        cors_enabled = config.server.cors_enabled,
        "Application configured and ready"
    );

    let state = AppState {
        config: Arc::clone(&config),
        streams,
        recording: recording.clone(),
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let server = fc_web::build_server(&bind_addr, state)?;
    let handle = server.handle();
    let mut server_task = tokio::spawn(server);

    // Wait for a shutdown signal, or for the server to exit on its own
    let server_result = tokio::select! {
        result = &mut server_task => Some(result),
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            None
        }
    };

    // Teardown order: cleanup jobs, then recording workers, then the listener
    if let Err(e) = cleanup.stop().await {
        tracing::warn!("Cleanup manager shutdown failed: {}", e);
    }
    if let Some(recording) = recording {
        recording.stop_all().await;
    }

    let server_result = match server_result {
        Some(result) => result,
        None => {
            handle.stop(true).await;
            server_task.await
        }
    };
    tracing::info!("Server stopped gracefully");

    match server_result {
        Ok(result) => {
            result.map_err(|e| fc_core::Error::Config(format!("Web server error: {}", e)))
        }
        Err(e) => Err(fc_core::Error::Config(format!(
            "Web server task failed: {}",
            e
        ))),
    }
}

/// Resolve on SIGINT or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for ctrl-c: {}", e);
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
        }
    }
}
