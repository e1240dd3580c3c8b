//! ABOUTME: HTTP surface tests over the in-process actix service
//! ABOUTME: Covers publish validation, capacity, listing, deletion, and health

use crate::{create_app, models::*, AppState};
use actix_web::{http::StatusCode, test};
use fc_config::Config;
use fc_stream::StreamManager;
use std::sync::Arc;

fn test_state(mutate: impl FnOnce(&mut Config)) -> AppState {
    let mut config = Config::default();
    mutate(&mut config);
    let streams = Arc::new(StreamManager::new(
        config.streams.max_concurrent,
        config.streams.max_buffer_frames,
    ));
    AppState {
        config: Arc::new(config),
        streams,
        recording: None,
    }
}

const BOUNDARY: &str = "framecast-test-boundary";

fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
             filename=\"frame.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn publish_request(name: &str, field: &str, data: &[u8]) -> test::TestRequest {
    test::TestRequest::post()
        .uri(&format!("/publish/{}", name))
        .insert_header((
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(multipart_body(field, data))
}

#[actix_web::test]
async fn test_publish_happy_path() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let jpeg = test_support::test_jpeg(32, 24);
    let req = publish_request("cam1", "frame", &jpeg).to_request();
    let resp: PublishResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp.status, "success");
    assert_eq!(resp.stream, "cam1");
    assert_eq!(resp.frame_size, jpeg.len());

    let req = test::TestRequest::get().uri("/api/streams").to_request();
    let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["count"], 1);
    assert_eq!(list["streams"][0]["name"], "cam1");
    assert_eq!(list["streams"][0]["total_frames"], 1);
    assert_eq!(list["streams"][0]["has_current_frame"], true);
}

#[actix_web::test]
async fn test_publish_invalid_name_creates_nothing() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = publish_request("bad..name", "frame", b"jpeg").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/api/streams").to_request();
    let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["count"], 0);
}

#[actix_web::test]
async fn test_publish_capacity_exceeded() {
    let state = test_state(|c| c.streams.max_concurrent = 2);
    let app = test::init_service(create_app(state)).await;

    for (name, expected) in [
        ("a", StatusCode::OK),
        ("b", StatusCode::OK),
        ("c", StatusCode::SERVICE_UNAVAILABLE),
    ] {
        let req = publish_request(name, "frame", b"jpeg").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected, "stream {}", name);
    }

    let req = test::TestRequest::get().uri("/api/streams").to_request();
    let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["count"], 2);
}

#[actix_web::test]
async fn test_publish_missing_frame_field() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = publish_request("cam", "attachment", b"jpeg").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_publish_empty_frame() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = publish_request("cam", "frame", b"").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_publish_oversized_frame() {
    let state = test_state(|c| c.server.max_frame_size_mb = 1);
    let app = test::init_service(create_app(state)).await;

    let oversized = vec![0u8; 1024 * 1024 + 1];
    let req = publish_request("cam", "frame", &oversized).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/api/streams").to_request();
    let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(list["count"], 0);
}

#[actix_web::test]
async fn test_stats_endpoint() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get()
        .uri("/api/streams/nope/stats")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = publish_request("cam", "frame", b"jpeg").to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/api/streams/cam/stats")
        .to_request();
    let stats: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["name"], "cam");
    assert_eq!(stats["total_frames"], 1);
    assert_eq!(stats["viewer_count"], 0);
    assert_eq!(stats["buffer_size"], 1);
}

#[actix_web::test]
async fn test_delete_stream() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = publish_request("cam", "frame", b"jpeg").to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::delete()
        .uri("/api/streams/cam")
        .to_request();
    let resp: DeleteResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(resp.status, "success");
    assert_eq!(resp.message, "Stream 'cam' deleted");

    let req = test::TestRequest::delete()
        .uri("/api/streams/cam")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_view_unknown_stream() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get().uri("/stream/nope").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_view_stream_headers() {
    let state = test_state(|_| {});
    let app = test::init_service(create_app(state)).await;

    let req = publish_request("cam", "frame", b"jpeg").to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/stream/cam").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "multipart/x-mixed-replace; boundary=frame"
    );
}

#[actix_web::test]
async fn test_health_endpoint() {
    let state = test_state(|c| c.streams.max_concurrent = 7);
    let app = test::init_service(create_app(state)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let health: HealthResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_streams, 0);
    assert_eq!(health.max_streams, 7);
    assert!(!health.recording_enabled);
    assert_eq!(health.config.timeout_seconds, 300);
    assert_eq!(health.config.max_buffer_frames, 30);
    assert_eq!(health.config.retention_days, 7);
}
