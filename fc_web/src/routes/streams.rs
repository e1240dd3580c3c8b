//! ABOUTME: Stream administration endpoints
//! ABOUTME: Listing, per-stream stats, and manual deletion

use actix_web::{web, HttpResponse, Result as ActixResult};
use tracing::info;

use crate::{
    models::{DeleteResponse, ErrorResponse, StreamListResponse},
    AppState,
};

/// GET /api/streams
pub async fn list_streams(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let streams = state.streams.all_stats();
    Ok(HttpResponse::Ok().json(StreamListResponse {
        count: streams.len(),
        streams,
    }))
}

/// GET /api/streams/{name}/stats
pub async fn stream_stats(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();
    match state.streams.stats(&name) {
        Some(stats) => Ok(HttpResponse::Ok().json(stats)),
        None => Ok(HttpResponse::NotFound()
            .json(ErrorResponse::new(format!("Stream '{}' not found", name)))),
    }
}

/// DELETE /api/streams/{name}
pub async fn delete_stream(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();

    // Stop recording first so the container finalizes before the stream goes
    if let Some(recording) = &state.recording {
        recording.stop_recording(&name).await;
    }

    if !state.streams.delete(&name) {
        return Ok(HttpResponse::NotFound()
            .json(ErrorResponse::new(format!("Stream '{}' not found", name))));
    }

    info!(stream = %name, "Stream deleted via API");
    Ok(HttpResponse::Ok().json(DeleteResponse {
        status: "success".to_string(),
        message: format!("Stream '{}' deleted", name),
    }))
}
