// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Google Cloud Vision landmark recognition

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::client::{rejection_message, CapabilityClient};
use super::types::{CapabilityError, Landmark, TaskOutcome, TaskParams};
use crate::vision::image_utils::DecodedImage;

pub const GOOGLE_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1";

const LANDMARK_FEATURE: &str = "LANDMARK_DETECTION";

// --- Cloud Vision wire types (camelCase) ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    requests: Vec<ImageRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest<'a> {
    image: ImageContent<'a>,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    max_results: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    landmark_annotations: Vec<EntityAnnotation>,
    error: Option<Status>,
}

#[derive(Deserialize)]
struct Status {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityAnnotation {
    #[serde(default)]
    description: String,
    #[serde(default)]
    locations: Vec<LocationInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationInfo {
    lat_lng: Option<LatLng>,
}

// Zero coordinates are omitted from proto3 JSON
#[derive(Deserialize)]
struct LatLng {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

impl EntityAnnotation {
    fn into_landmark(self) -> Result<Landmark, CapabilityError> {
        let lat_lng = self
            .locations
            .into_iter()
            .find_map(|l| l.lat_lng)
            .ok_or_else(|| {
                CapabilityError::MalformedResponse(format!(
                    "landmark '{}' has no location",
                    self.description
                ))
            })?;

        Ok(Landmark {
            name: self.description,
            latitude: lat_lng.latitude,
            longitude: lat_lng.longitude,
        })
    }
}

/// Landmark capability backed by Cloud Vision `images:annotate`
pub struct LandmarkClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: u32,
    timeout: Duration,
}

impl LandmarkClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        max_results: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        info!(
            "Landmark client configured: endpoint={}, max_results={}, api_key={}",
            endpoint,
            max_results,
            if api_key.is_some() { "set" } else { "unset" }
        );

        Ok(Self {
            client,
            endpoint,
            api_key,
            max_results: max_results.max(1),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Recognize landmarks; an image with none yields an empty list
    pub async fn annotate(&self, image: &DecodedImage) -> Result<Vec<Landmark>, CapabilityError> {
        let content = image.to_jpeg_base64()?;
        let body = AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent { content },
                features: vec![Feature {
                    kind: LANDMARK_FEATURE,
                    max_results: self.max_results,
                }],
            }],
        };

        let url = format!("{}/images:annotate", self.endpoint);
        debug!("Landmark request: POST {}", url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&body),
            });
        }

        let parsed: AnnotateResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                CapabilityError::MalformedResponse(format!("JSON parse error: {}", e))
            }
        })?;

        Self::extract_landmarks(parsed)
    }

    fn extract_landmarks(parsed: AnnotateResponse) -> Result<Vec<Landmark>, CapabilityError> {
        let Some(first) = parsed.responses.into_iter().next() else {
            return Err(CapabilityError::MalformedResponse(
                "annotate response has no entries".to_string(),
            ));
        };

        // Per-image failures arrive with HTTP 200
        if let Some(error) = first.error {
            if error.code != 0 {
                return Err(CapabilityError::Rejected {
                    status: error.code.clamp(0, i32::from(u16::MAX)) as u16,
                    message: error.message,
                });
            }
        }

        first
            .landmark_annotations
            .into_iter()
            .map(EntityAnnotation::into_landmark)
            .collect()
    }

    fn transport_error(&self, e: reqwest::Error) -> CapabilityError {
        if e.is_timeout() {
            CapabilityError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            e.into()
        }
    }
}

#[async_trait]
impl CapabilityClient for LandmarkClient {
    async fn invoke(
        &self,
        image: &DecodedImage,
        params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError> {
        if !matches!(params, TaskParams::Landmark) {
            return Err(CapabilityError::InvalidParams(format!(
                "landmark recognition takes no parameters, got {:?}",
                params
            )));
        }

        let landmarks = self.annotate(image).await?;
        Ok(TaskOutcome::Landmarks(landmarks))
    }

    fn name(&self) -> &'static str {
        "google-vision-landmark"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.endpoint != GOOGLE_VISION_ENDPOINT
    }
}
