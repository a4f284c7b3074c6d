// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Capability client trait definition

use async_trait::async_trait;

use super::types::{CapabilityError, TaskOutcome, TaskParams};
use crate::vision::image_utils::DecodedImage;

/// Uniform call contract for one external analysis backend
///
/// Clients are built once at startup and shared read-only by every request.
/// Every backend failure must come back as a [`CapabilityError`]; a client
/// never panics or leaks a transport error past this boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapabilityClient: Send + Sync {
    /// Run the capability against a decoded image
    async fn invoke(
        &self,
        image: &DecodedImage,
        params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError>;

    /// Backend name for logging and health reporting
    fn name(&self) -> &'static str;

    /// Whether credentials for the backend are present
    fn is_configured(&self) -> bool {
        true
    }
}

/// Longest backend error body quoted back to the caller
const MAX_REJECTION_CHARS: usize = 200;

/// Pull a readable message out of a backend's error body
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`; anything else is quoted verbatim, truncated.
pub(crate) fn rejection_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let message = json["error"]
            .as_str()
            .or_else(|| json["error"]["message"].as_str())
            .or_else(|| json["message"].as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    body.chars().take(MAX_REJECTION_CHARS).collect()
}
