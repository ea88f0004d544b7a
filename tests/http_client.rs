use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use leafcam::client::{DetectionService, ServiceError};
use leafcam::frame::FrameSample;
use leafcam::{ClientConfig, DetectionController, HttpDetectionClient, PatternCamera, SharedUi};
use serde_json::json;
use std::time::Duration;

/// Serve `router` on an ephemeral port and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn frame() -> FrameSample {
    FrameSample::new(vec![0xFF, 0xD8, 0x01, 0x02, 0x03, 0xFF, 0xD9], 2, 2)
}

/// Whether `body` is a multipart upload with a single JPEG file field
fn is_jpeg_upload(headers: &HeaderMap, body: &[u8], file_name: &str) -> bool {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let text = String::from_utf8_lossy(body).to_lowercase();
    content_type.starts_with("multipart/form-data")
        && text.contains("name=\"file\"")
        && text.contains(&format!("filename=\"{}\"", file_name))
        && text.contains("content-type: image/jpeg")
}

async fn detect_ok(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    if !is_jpeg_upload(&headers, &body, "frame.jpg") {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "bad upload"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "detections": [
                {"class_id": 7, "class_name": "corn_leaf_blight", "confidence": 0.64, "bbox_xyxy": [0.0, 0.0, 2.0, 2.0]}
            ],
            "feedback": {
                "critique": ["⚠️ Image is slightly dark"],
                "suggestions": ["Move closer to the leaf"],
                "disclaimer": "Results are indicative only.",
                "summary": {"detections_count": 1, "unique_diseases": 1, "max_confidence": 0.64, "quality_score": "fair"}
            },
            "annotated_jpeg_base64": "/9j/2Q==",
            "inference_time_ms": 18.2,
            "quality_metrics": {"brightness": 64.0, "blur_metric": 120.5, "width": 2, "height": 2},
            "filtering_stats": {"raw_count": 2, "filtered_count": 1, "removed_count": 1},
            "timestamp": "2025-01-01T12:00:00"
        })),
    )
}

async fn detect_model_error() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "model error"})))
}

async fn detect_plain_error() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream unavailable")
}

async fn capture_ok(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    if !is_jpeg_upload(&headers, &body, "capture.jpg") {
        return (StatusCode::BAD_REQUEST, Json(json!({"detail": "bad upload"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "capture_id": "20250101_120000_123456",
            "files": {
                "original": "captures/20250101_120000_123456_original.jpg",
                "annotated": "captures/20250101_120000_123456_annotated.jpg",
                "data": "captures/20250101_120000_123456_data.json"
            },
            "message": "Capture saved"
        })),
    )
}

async fn capture_error() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "disk full"})))
}

#[tokio::test]
async fn test_detect_posts_multipart_jpeg() {
    let base = serve(Router::new().route("/detect", post(detect_ok))).await;
    let client = HttpDetectionClient::new(base);

    let result = client.detect(frame()).await.unwrap();
    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.detections[0].class_name, "corn_leaf_blight");
    assert_eq!(result.detections[0].class_id, Some(7));
    assert_eq!(result.quality_metrics.unwrap().width, 2);
    assert_eq!(result.filtering_stats.unwrap().removed_count, 1);
    assert_eq!(result.feedback.unwrap().critique.len(), 1);
}

#[tokio::test]
async fn test_detect_error_uses_detail() {
    let base = serve(Router::new().route("/detect", post(detect_model_error))).await;
    let client = HttpDetectionClient::new(base);

    let err = client.detect(frame()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Status { status: 500, .. }));
    assert_eq!(err.to_string(), "model error");
}

#[tokio::test]
async fn test_detect_error_without_detail() {
    let base = serve(Router::new().route("/detect", post(detect_plain_error))).await;
    let client = HttpDetectionClient::new(base);

    let err = client.detect(frame()).await.unwrap_err();
    assert_eq!(err.status(), Some(502));
    assert_eq!(err.to_string(), "Detection failed");
}

#[tokio::test]
async fn test_capture_returns_receipt() {
    let base = serve(Router::new().route("/capture", post(capture_ok))).await;
    let client = HttpDetectionClient::new(base);

    let receipt = client.capture(frame()).await.unwrap();
    assert_eq!(receipt.capture_id, "20250101_120000_123456");
    assert_eq!(
        receipt.files.unwrap().data.as_deref(),
        Some("captures/20250101_120000_123456_data.json")
    );
}

#[tokio::test]
async fn test_capture_error_is_generic() {
    let base = serve(Router::new().route("/capture", post(capture_error))).await;
    let client = HttpDetectionClient::new(base);

    let err = client.capture(frame()).await.unwrap_err();
    assert_eq!(err.to_string(), "Capture failed");
}

#[tokio::test]
async fn test_health_and_model_info() {
    let router = Router::new()
        .route(
            "/health",
            get(|| async { Json(json!({"status": "healthy", "model_loaded": true, "timestamp": "2025-01-01T12:00:00"})) }),
        )
        .route(
            "/model-info",
            get(|| async {
                Json(json!({"loaded": true, "classes": {"1": "corn_rust_leaf", "0": "corn_gray_leaf_spot"}, "num_classes": 2}))
            }),
        );
    let base = serve(router).await;
    let client = HttpDetectionClient::new(base);

    let health = client.health().await.unwrap();
    assert!(health.is_healthy());
    assert!(health.model_loaded);

    let info = client.model_info().await.unwrap();
    assert_eq!(info.class_names(), vec!["corn_gray_leaf_spot", "corn_rust_leaf"]);
}

#[tokio::test]
async fn test_unreachable_service() {
    // Bind and drop a listener to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpDetectionClient::new(format!("http://{}", addr));
    let err = client.detect(frame()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Http(_)));
    assert_eq!(err.status(), None);
}

fn loop_config(server_url: String) -> ClientConfig {
    ClientConfig {
        server_url,
        cycle_interval: Duration::from_millis(20),
        not_ready_retry: Duration::from_millis(10),
        preferred_width: 48,
        preferred_height: 32,
        ..ClientConfig::default()
    }
}

#[tokio::test]
async fn test_loop_renders_results_from_server() {
    let base = serve(Router::new().route("/detect", post(detect_ok)).route("/capture", post(capture_ok))).await;
    let config = loop_config(base.clone());
    let controller = DetectionController::create(
        PatternCamera::new(),
        HttpDetectionClient::new(base),
        config,
        SharedUi::new(),
    );

    controller.start().await.unwrap();
    for _ in 0..500 {
        if controller.ui().lock().capture_enabled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    {
        let ui = controller.ui().lock();
        let view = ui.result.as_ref().expect("a rendered result");
        assert_eq!(view.detections[0].label(), "corn_leaf_blight");
        assert_eq!(view.annotated_jpeg.as_deref(), Some(&[0xFF, 0xD8, 0xFF, 0xD9][..]));
        assert_eq!(view.metrics[0].value, "64/255");
    }

    let receipt = controller.capture().await.unwrap();
    assert_eq!(receipt.capture_id, "20250101_120000_123456");
    controller.dispose().await;
}

#[tokio::test]
async fn test_loop_shows_server_error() {
    let base = serve(Router::new().route("/detect", post(detect_model_error))).await;
    let controller = DetectionController::create(
        PatternCamera::new(),
        HttpDetectionClient::new(base.clone()),
        loop_config(base),
        SharedUi::new(),
    );

    controller.start().await.unwrap();
    for _ in 0..500 {
        if controller.ui().status_text() == "Error: model error" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(controller.ui().status_text(), "Error: model error");
    assert!(controller.is_running());
    assert!(controller.ui().lock().result.is_none());
    controller.dispose().await;
}
