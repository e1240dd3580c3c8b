//! ABOUTME: Viewer endpoint serving live MJPEG over multipart/x-mixed-replace
//! ABOUTME: Each connection gets its own fan-out feed tied to its lifetime

use actix_web::{web, HttpResponse, Result as ActixResult};
use fc_stream::{mjpeg_content_type, mjpeg_feed};
use tracing::info;

use crate::{models::ErrorResponse, AppState};

/// GET /stream/{name}
pub async fn stream_video(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();

    match mjpeg_feed(&state.streams, &name) {
        Some(feed) => {
            info!(stream = %name, "New viewer connected");
            Ok(HttpResponse::Ok()
                .content_type(mjpeg_content_type())
                .insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
                .insert_header(("Pragma", "no-cache"))
                .insert_header(("Connection", "keep-alive"))
                .streaming(feed))
        }
        None => Ok(HttpResponse::NotFound()
            .json(ErrorResponse::new(format!("Stream '{}' not found", name)))),
    }
}
