//! ABOUTME: Publish endpoint: multipart JPEG upload into a named stream
//! ABOUTME: Auto-creates streams on first publish and forwards frames to recording

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Result as ActixResult};
use bytes::BytesMut;
use fc_core::Error;
use fc_stream::CreateOutcome;
use futures_util::StreamExt;
use tracing::{info, warn};

use crate::{
    models::{ErrorResponse, PublishResponse},
    AppState,
};

/// POST /publish/{name}
///
/// Expects a multipart body with a `frame` field holding JPEG bytes.
pub async fn publish_frame(
    path: web::Path<String>,
    mut payload: Multipart,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let name = path.into_inner();
    let max_bytes = state.config.max_frame_size_bytes();

    let mut frame_data: Option<BytesMut> = None;
    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => {
                warn!(stream = %name, error = %e, "Malformed multipart payload");
                return Ok(HttpResponse::BadRequest()
                    .json(ErrorResponse::new(format!("Malformed multipart body: {}", e))));
            }
        };

        let is_frame = field.name() == Some("frame");
        let mut buf = BytesMut::new();
        while let Some(chunk) = field.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(stream = %name, error = %e, "Truncated multipart payload");
                    return Ok(HttpResponse::BadRequest()
                        .json(ErrorResponse::new(format!("Malformed multipart body: {}", e))));
                }
            };
            if is_frame {
                if buf.len() + chunk.len() > max_bytes {
                    return Ok(HttpResponse::BadRequest().json(ErrorResponse::new(format!(
                        "Frame size exceeds maximum ({} bytes)",
                        max_bytes
                    ))));
                }
                buf.extend_from_slice(&chunk);
            }
        }
        if is_frame {
            frame_data = Some(buf);
            break;
        }
    }

    let Some(frame) = frame_data else {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse::new(
            "No frame data provided. Use 'frame' field in multipart/form-data",
        )));
    };
    if frame.is_empty() {
        return Ok(HttpResponse::BadRequest().json(ErrorResponse::new("Empty frame data")));
    }

    if !state.streams.exists(&name) {
        match state.streams.create(&name) {
            Ok(CreateOutcome::Created) => {
                info!(stream = %name, "Auto-created stream");
                if let Some(recording) = &state.recording {
                    recording.start_recording(&name);
                }
            }
            // Lost the creation race to a concurrent publisher
            Ok(CreateOutcome::AlreadyExists) => {}
            Err(e @ Error::InvalidName(_)) => {
                warn!(stream = %name, "Rejected publish with invalid name");
                return Ok(HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string())));
            }
            Err(e @ Error::CapacityExceeded(_)) => {
                return Ok(
                    HttpResponse::ServiceUnavailable().json(ErrorResponse::new(e.to_string()))
                );
            }
            Err(e) => {
                return Ok(
                    HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string()))
                );
            }
        }
    }

    let frame = frame.freeze();
    let frame_size = frame.len();
    if state.streams.publish(&name, frame.clone()).is_err() {
        // Deleted between the existence check and the publish
        return Ok(HttpResponse::BadRequest().json(ErrorResponse::new("Failed to publish frame")));
    }

    if let Some(recording) = &state.recording {
        recording.add_frame(&name, frame);
    }

    Ok(HttpResponse::Ok().json(PublishResponse {
        status: "success".to_string(),
        stream: name,
        frame_size,
    }))
}
