// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// POST /process through the router with stub capability clients

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use historic_overlay_node::analysis::{
    BoundingBox, CapabilityClient, CapabilityError, Landmark, TaskDispatcher, TaskKind,
    TaskOutcome, TaskParams, TaskRegistry,
};
use historic_overlay_node::api::{create_router, AppState};
use historic_overlay_node::vision::DecodedImage;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

/// Echoes its parameters back so tests can see what was resolved
struct EchoClient {
    seen: Arc<Mutex<Vec<TaskParams>>>,
}

#[async_trait]
impl CapabilityClient for EchoClient {
    async fn invoke(
        &self,
        image: &DecodedImage,
        params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError> {
        self.seen.lock().unwrap().push(params.clone());
        Ok(match params {
            TaskParams::Detection { class_label } => TaskOutcome::Detection(vec![BoundingBox::new(
                class_label.clone(),
                0.1,
                0.1,
                1.4,
                0.5,
            )]),
            TaskParams::Question { question } => TaskOutcome::Answer(format!(
                "{} ({}x{})",
                question,
                image.width(),
                image.height()
            )),
            TaskParams::Landmark => TaskOutcome::Landmarks(vec![
                Landmark {
                    name: "Twin Tower".to_string(),
                    latitude: 10.0,
                    longitude: 20.0,
                },
                Landmark {
                    name: "Twin Tower".to_string(),
                    latitude: 11.0,
                    longitude: 21.0,
                },
            ]),
        })
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

struct FailingClient;

#[async_trait]
impl CapabilityClient for FailingClient {
    async fn invoke(
        &self,
        _image: &DecodedImage,
        _params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError> {
        Err(CapabilityError::Transport("connection refused".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct HangingClient;

#[async_trait]
impl CapabilityClient for HangingClient {
    async fn invoke(
        &self,
        _image: &DecodedImage,
        _params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "hanging"
    }
}

fn echo_dispatcher(seen: &Arc<Mutex<Vec<TaskParams>>>) -> TaskDispatcher {
    let mut dispatcher = TaskDispatcher::new(TaskRegistry::new(), Duration::from_secs(5));
    for kind in TaskKind::ALL {
        dispatcher = dispatcher.with_client(
            kind,
            Arc::new(EchoClient {
                seen: Arc::clone(seen),
            }),
        );
    }
    dispatcher
}

fn router(dispatcher: TaskDispatcher) -> Router {
    create_router(
        AppState::new(dispatcher, CancellationToken::new()),
        16 * 1024 * 1024,
    )
}

fn jpeg_base64(width: u32, height: u32) -> String {
    let img = RgbImage::from_pixel(width, height, Rgb([140, 160, 180]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    STANDARD.encode(buf.into_inner())
}

async fn post_process(app: Router, body: String) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::post("/process")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_missing_tasks_is_request_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({"image": jpeg_base64(8, 8)}).to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json, json!({"error": "Missing 'image' or 'tasks'"}));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_image_is_request_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({"tasks": ["vqa"]}).to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing 'image' or 'tasks'");
}

#[tokio::test]
async fn test_corrupt_image_has_no_task_keys() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let corrupt = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01, 0x02, 0x03]);
    let body = json!({"image": corrupt, "tasks": ["object_detection"]}).to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let object = json.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object["error"].as_str().unwrap().starts_with("Invalid image: "));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_base64_is_request_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({"image": "not base64 at all!!", "tasks": ["vqa"]}).to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid image: "));
}

#[tokio::test]
async fn test_malformed_json_is_request_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (status, json) =
        post_process(router(echo_dispatcher(&seen)), "{not json".to_string()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid JSON body"));
}

#[tokio::test]
async fn test_empty_task_list_returns_empty_object() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({"image": jpeg_base64(8, 8), "tasks": []}).to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({}));
}

#[tokio::test]
async fn test_vqa_only_scenario() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({
        "image": jpeg_base64(20, 10),
        "tasks": ["vqa"],
        "question": "What color is the sky?"
    })
    .to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"vqa_answer": "What color is the sky? (20x10)"}));
}

#[tokio::test]
async fn test_unknown_task_ignored() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({"image": jpeg_base64(8, 8), "tasks": ["segmentation", "vqa"]}).to_string();

    let (_, json) = post_process(router(echo_dispatcher(&seen)), body).await;

    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["vqa_answer"]);
}

#[tokio::test]
async fn test_defaults_applied_and_boxes_clamped() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let body = json!({
        "image": jpeg_base64(8, 8),
        "tasks": ["object_detection", "vqa", "landmark_detection"]
    })
    .to_string();

    let (status, json) = post_process(router(echo_dispatcher(&seen)), body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["bounding_boxes"][0]["label"], "object");
    assert_eq!(json["bounding_boxes"][0]["x_max"], 1.0);
    assert_eq!(json["vqa_answer"], "What is in the image? (8x8)");
    // Same name, different coordinates: both kept
    assert_eq!(json["landmarks"].as_array().unwrap().len(), 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert!(seen.contains(&TaskParams::Detection {
        class_label: "object".to_string()
    }));
}

#[tokio::test]
async fn test_failing_backend_reported_beside_successes() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = TaskDispatcher::new(TaskRegistry::new(), Duration::from_secs(5))
        .with_client(TaskKind::ObjectDetection, Arc::new(FailingClient))
        .with_client(
            TaskKind::Vqa,
            Arc::new(EchoClient {
                seen: Arc::clone(&seen),
            }),
        );

    let body = json!({
        "image": jpeg_base64(8, 8),
        "tasks": ["object_detection", "vqa"],
        "detect_class": "church"
    })
    .to_string();

    let (status, json) = post_process(router(dispatcher), body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json,
        json!({
            "detection_error": "backend request failed: connection refused",
            "vqa_answer": "What is in the image? (8x8)"
        })
    );
}

#[tokio::test]
async fn test_shutdown_returns_partial_results() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = TaskDispatcher::new(TaskRegistry::new(), Duration::from_secs(30))
        .with_client(TaskKind::Vqa, Arc::new(HangingClient))
        .with_client(
            TaskKind::LandmarkDetection,
            Arc::new(EchoClient {
                seen: Arc::clone(&seen),
            }),
        );

    let shutdown = CancellationToken::new();
    let app = create_router(AppState::new(dispatcher, shutdown.clone()), 1024 * 1024);

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let body = json!({"image": jpeg_base64(8, 8), "tasks": ["vqa", "landmark_detection"]}).to_string();
    let (status, json) = post_process(app, body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["vqa_error"], "task cancelled before completion");
    assert_eq!(json["landmarks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_repeated_requests_have_same_shape() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = router(echo_dispatcher(&seen));
    let body = json!({"image": jpeg_base64(8, 8), "tasks": ["landmark_detection", "vqa"]}).to_string();

    let (_, first) = post_process(app.clone(), body.clone()).await;
    let (_, second) = post_process(app, body).await;

    let keys = |v: &Value| {
        let mut keys: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    };
    assert_eq!(keys(&first), keys(&second));
}
