// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Dispatcher built from configuration, driving real clients against fake backends

use axum::http::StatusCode;
use historic_overlay_node::analysis::{AnalysisResponse, TaskArguments, TaskDispatcher};
use historic_overlay_node::config::NodeConfig;
use historic_overlay_node::vision::{decode_base64_image, ARTIFACT_FILE_NAME};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::fake_backend::{png_base64, FakeBackend};

const ALL_TASKS: [&str; 3] = ["object_detection", "vqa", "landmark_detection"];

fn config_for(moondream: &FakeBackend, vision: &FakeBackend, output_dir: &Path) -> NodeConfig {
    NodeConfig {
        moondream_endpoint: moondream.base_url.clone(),
        moondream_api_key: Some("md-key".to_string()),
        google_vision_endpoint: vision.base_url.clone(),
        google_vision_api_key: Some("gv-key".to_string()),
        backend_timeout_secs: 5,
        request_timeout_secs: 10,
        debug_output_dir: output_dir.to_path_buf(),
        ..NodeConfig::default()
    }
}

fn artifact_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect()
}

async fn run(dispatcher: &TaskDispatcher, request_id: Uuid) -> serde_json::Value {
    let image = decode_base64_image(&png_base64(64, 48)).unwrap();
    let args = TaskArguments {
        detect_class: Some("chapel"),
        question: Some("What is this building?"),
    };
    let tasks = dispatcher.registry().resolve(&ALL_TASKS, &args);
    let reports = dispatcher
        .dispatch(request_id, Arc::new(image), tasks, &CancellationToken::new())
        .await;
    serde_json::to_value(AnalysisResponse::from_reports(reports)).unwrap()
}

#[tokio::test]
async fn test_all_backends_succeed_and_overlay_written() {
    // One canned body satisfies both /detect and /query
    let moondream = FakeBackend::spawn(
        StatusCode::OK,
        json!({
            "objects": [{"x_min": 0.25, "y_min": 0.25, "x_max": 0.75, "y_max": 1.5}],
            "answer": "A small stone chapel."
        }),
    )
    .await;
    let vision = FakeBackend::spawn(
        StatusCode::OK,
        json!({"responses": [{"landmarkAnnotations": [
            {"description": "Old Chapel", "locations": [{"latLng": {"latitude": 52.2, "longitude": 0.12}}]}
        ]}]}),
    )
    .await;
    let dir = TempDir::new().unwrap();

    let config = config_for(&moondream, &vision, dir.path());
    config.validate().unwrap();
    let dispatcher = TaskDispatcher::from_config(&config).unwrap();
    assert!(dispatcher.backends().iter().all(|b| b.configured));

    let request_id = Uuid::new_v4();
    let json = run(&dispatcher, request_id).await;

    assert_eq!(
        json,
        json!({
            "bounding_boxes": [
                {"label": "chapel", "x_min": 0.25, "y_min": 0.25, "x_max": 0.75, "y_max": 1.0}
            ],
            "vqa_answer": "A small stone chapel.",
            "landmarks": [{"name": "Old Chapel", "latitude": 52.2, "longitude": 0.12}]
        })
    );

    assert_eq!(artifact_names(dir.path()), vec![ARTIFACT_FILE_NAME.to_string()]);

    let moondream_paths: Vec<String> = moondream.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(moondream_paths.len(), 2);
    assert!(moondream_paths.contains(&"/v1/detect".to_string()));
    assert!(moondream_paths.contains(&"/v1/query".to_string()));
}

#[tokio::test]
async fn test_overlay_output_stays_bounded() {
    let moondream = FakeBackend::spawn(
        StatusCode::OK,
        json!({"objects": [{"x_min": 0.1, "y_min": 0.1, "x_max": 0.4, "y_max": 0.4}], "answer": "x"}),
    )
    .await;
    let vision = FakeBackend::spawn(StatusCode::OK, json!({"responses": [{}]})).await;
    let dir = TempDir::new().unwrap();

    let dispatcher =
        TaskDispatcher::from_config(&config_for(&moondream, &vision, dir.path())).unwrap();
    for _ in 0..20 {
        let json = run(&dispatcher, Uuid::new_v4()).await;
        assert_eq!(json["bounding_boxes"].as_array().unwrap().len(), 1);
    }

    assert_eq!(artifact_names(dir.path()), vec![ARTIFACT_FILE_NAME.to_string()]);
}

#[tokio::test]
async fn test_one_backend_down_others_still_answer() {
    let moondream = FakeBackend::spawn(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"error": "model crashed"}),
    )
    .await;
    let vision = FakeBackend::spawn(StatusCode::OK, json!({"responses": [{}]})).await;
    let dir = TempDir::new().unwrap();

    let dispatcher =
        TaskDispatcher::from_config(&config_for(&moondream, &vision, dir.path())).unwrap();
    let json = run(&dispatcher, Uuid::new_v4()).await;

    assert_eq!(
        json,
        json!({
            "detection_error": "backend rejected the request (500): model crashed",
            "vqa_error": "backend rejected the request (500): model crashed",
            "landmarks": []
        })
    );
    // No successful detection, no artifact
    assert!(artifact_names(dir.path()).is_empty());
}

#[tokio::test]
async fn test_overlay_disabled_writes_nothing() {
    let moondream = FakeBackend::spawn(
        StatusCode::OK,
        json!({"objects": [{"x_min": 0.1, "y_min": 0.1, "x_max": 0.2, "y_max": 0.2}], "answer": "x"}),
    )
    .await;
    let vision = FakeBackend::spawn(StatusCode::OK, json!({"responses": [{}]})).await;
    let dir = TempDir::new().unwrap();

    let mut config = config_for(&moondream, &vision, dir.path());
    config.debug_overlay = false;
    let dispatcher = TaskDispatcher::from_config(&config).unwrap();
    assert!(!dispatcher.overlay_enabled());

    let json = run(&dispatcher, Uuid::new_v4()).await;
    assert_eq!(json["bounding_boxes"].as_array().unwrap().len(), 1);
    assert!(artifact_names(dir.path()).is_empty());
}

#[tokio::test]
async fn test_missing_font_path_fails_construction() {
    let moondream = FakeBackend::spawn(StatusCode::OK, json!({})).await;
    let vision = FakeBackend::spawn(StatusCode::OK, json!({})).await;
    let dir = TempDir::new().unwrap();

    let mut config = config_for(&moondream, &vision, dir.path());
    config.overlay_font_path = Some(dir.path().join("missing.ttf"));
    assert!(TaskDispatcher::from_config(&config).is_err());
}
