//! ABOUTME: Health endpoint with system counters and effective config
//! ABOUTME: Used by load balancers and operators

use actix_web::{web, HttpResponse, Result as ActixResult};

use crate::{
    models::{HealthConfigInfo, HealthResponse},
    AppState,
};

/// GET /health
pub async fn health(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        active_streams: state.streams.count(),
        max_streams: state.config.streams.max_concurrent,
        recording_enabled: state.recording.is_some(),
        config: HealthConfigInfo {
            timeout_seconds: state.config.streams.timeout_seconds,
            max_buffer_frames: state.config.streams.max_buffer_frames,
            retention_days: state.config.recording.retention_days,
        },
    }))
}
