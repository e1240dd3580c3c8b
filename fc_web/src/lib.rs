//! ABOUTME: HTTP surface for publish, view, stats, and health endpoints
//! ABOUTME: actix-web app factory wired to the stream and recording services

use actix_cors::Cors;
use actix_web::{middleware::Condition, web, App, HttpServer};
use fc_config::Config;
use fc_core::Result;
use fc_record::RecordingService;
use fc_stream::StreamManager;
use std::sync::Arc;

pub mod models;
pub mod routes;

#[cfg(test)]
mod tests;

use routes::{health, publish, stream, streams};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub streams: Arc<StreamManager>,
    /// `None` when recording is disabled
    pub recording: Option<Arc<RecordingService>>,
}

/// Create the web application service factory
pub fn create_app(
    state: AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let cors_enabled = state.config.server.cors_enabled;

    App::new()
        .app_data(web::Data::new(state))
        .wrap(actix_web::middleware::Logger::default())
        .wrap(Condition::new(cors_enabled, Cors::permissive()))
        .route("/health", web::get().to(health::health))
        .route("/publish/{name}", web::post().to(publish::publish_frame))
        .route("/stream/{name}", web::get().to(stream::stream_video))
        .service(
            web::scope("/api")
                .route("/streams", web::get().to(streams::list_streams))
                .route(
                    "/streams/{name}/stats",
                    web::get().to(streams::stream_stats),
                )
                .route("/streams/{name}", web::delete().to(streams::delete_stream)),
        )
}

/// Build the web server with actix's own signal handling disabled.
///
/// The caller owns shutdown: keep the returned server's `handle()` and call
/// `stop(true)` once the rest of the application has been torn down.
pub fn build_server(bind_addr: &str, state: AppState) -> Result<actix_web::dev::Server> {
    tracing::info!("Starting web server on {}", bind_addr);

    Ok(HttpServer::new(move || create_app(state.clone()))
        .disable_signals()
        .bind(bind_addr)
        .map_err(|e| fc_core::Error::Config(format!("Failed to bind web server: {}", e)))?
        .run())
}
