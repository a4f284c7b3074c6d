// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process endpoint handler

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::request::{ProcessRequest, MISSING_FIELDS_MESSAGE};
use crate::analysis::aggregator::AnalysisResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::image_utils::{decode_base64_image, format_to_extension};

/// POST /process - Run analysis tasks against one image
///
/// # Request
/// - `image`: Base64-encoded image data (required)
/// - `tasks`: List of task kinds: `object_detection`, `vqa`,
///   `landmark_detection` (required, may be empty; unknown kinds are ignored)
/// - `detect_class`: Class to detect - defaults to "object"
/// - `question`: Question to answer - defaults to "What is in the image?"
///
/// # Response
/// One key per requested task kind: `bounding_boxes`, `vqa_answer` and
/// `landmarks` on success, or `detection_error`, `vqa_error` and
/// `landmark_error` on failure. Backend failures never fail the request.
///
/// # Errors
/// - 400 Bad Request: missing `image` or `tasks`, malformed JSON, or an
///   image that cannot be decoded
/// - 413 Payload Too Large: body exceeds the configured limit
pub async fn process_handler(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| {
        warn!("Process request rejected: {}", e.body_text());
        ApiError::from(e)
    })?;

    // 1. Validate request
    if let Err(e) = request.validate() {
        warn!("Process validation failed: {}", e);
        return Err(e);
    }

    let request_id = Uuid::new_v4();
    let started = Instant::now();

    // 2. Decode image
    let image_data = request
        .image
        .as_deref()
        .ok_or_else(|| ApiError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_string()))?;

    let image = decode_base64_image(image_data).map_err(|e| {
        warn!("[{}] Failed to decode image: {}", request_id, e);
        ApiError::InvalidImage(e)
    })?;

    debug!(
        "[{}] Decoded image: {}x{} {}, {} bytes",
        request_id,
        image.width(),
        image.height(),
        format_to_extension(image.format()),
        image.size_bytes()
    );

    // 3. Resolve tasks
    let dispatcher = &state.dispatcher;
    let tasks = dispatcher
        .registry()
        .resolve(request.task_tokens(), &request.arguments());

    if tasks.is_empty() {
        debug!("[{}] No recognized tasks requested", request_id);
    }

    // 4. Dispatch and aggregate
    let reports = dispatcher
        .dispatch(request_id, Arc::new(image), tasks, &state.shutdown)
        .await;
    let response = AnalysisResponse::from_reports(reports);

    info!(
        "[{}] Processed {} tasks ({} failed) in {}ms",
        request_id,
        response.len(),
        response.error_count(),
        started.elapsed().as_millis()
    );

    Ok(Json(response))
}
