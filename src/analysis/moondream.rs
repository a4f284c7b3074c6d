// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Moondream backend: object detection and visual question answering
//!
//! Works against the hosted API or a local Moondream Station; both speak
//! the same `/detect` and `/query` JSON endpoints.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::client::{rejection_message, CapabilityClient};
use super::types::{BoundingBox, CapabilityError, TaskOutcome, TaskParams};
use crate::vision::image_utils::DecodedImage;

/// Hosted Moondream API
pub const MOONDREAM_CLOUD_ENDPOINT: &str = "https://api.moondream.ai/v1";

const AUTH_HEADER: &str = "X-Moondream-Auth";

/// How a backend expresses box coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateConvention {
    /// Fractions of the image width/height
    #[default]
    Normalized,
    /// Absolute pixels of the transmitted image
    Pixels,
}

impl FromStr for CoordinateConvention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normalized" | "fraction" | "relative" => Ok(Self::Normalized),
            "pixels" | "pixel" | "absolute" => Ok(Self::Pixels),
            other => Err(format!(
                "unknown coordinate convention '{}', expected 'normalized' or 'pixels'",
                other
            )),
        }
    }
}

// --- Moondream wire types ---

#[derive(Serialize)]
struct DetectRequest<'a> {
    image_url: &'a str,
    object: &'a str,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    image_url: &'a str,
    question: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct DetectResponse {
    #[serde(default)]
    objects: Option<Vec<RawDetection>>,
}

#[derive(Deserialize)]
struct QueryResponse {
    answer: Option<String>,
}

/// A box exactly as the backend reported it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub label: Option<String>,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl RawDetection {
    /// Normalize into a canonical box; a missing label takes `default_label`
    pub fn into_box(
        self,
        default_label: &str,
        convention: CoordinateConvention,
        width: u32,
        height: u32,
    ) -> BoundingBox {
        let label = self
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| default_label.to_string());

        match convention {
            CoordinateConvention::Normalized => {
                BoundingBox::new(label, self.x_min, self.y_min, self.x_max, self.y_max)
            }
            CoordinateConvention::Pixels => BoundingBox::from_pixels(
                label, self.x_min, self.y_min, self.x_max, self.y_max, width, height,
            ),
        }
    }
}

/// HTTP client for a Moondream endpoint, shared by the detection and
/// question-answering capabilities
pub struct MoondreamClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl MoondreamClient {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        info!(
            "Moondream client configured: endpoint={}, api_key={}",
            endpoint,
            if api_key.is_some() { "set" } else { "unset" }
        );

        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The hosted API needs a key; a local station does not
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.endpoint != MOONDREAM_CLOUD_ENDPOINT
    }

    /// Locate every instance of `object` in the image
    pub async fn detect(
        &self,
        image: &DecodedImage,
        object: &str,
    ) -> Result<Vec<RawDetection>, CapabilityError> {
        let image_url = image.to_jpeg_data_url()?;
        let response: DetectResponse = self
            .post_json(
                "detect",
                &DetectRequest {
                    image_url: &image_url,
                    object,
                },
            )
            .await?;

        // No matches may come back as an absent or null list. An error status is
        // never read as zero matches: post_json reports it as Rejected.
        Ok(response.objects.unwrap_or_default())
    }

    /// Ask a free-text question about the image
    pub async fn query(
        &self,
        image: &DecodedImage,
        question: &str,
    ) -> Result<String, CapabilityError> {
        let image_url = image.to_jpeg_data_url()?;
        let response: QueryResponse = self
            .post_json(
                "query",
                &QueryRequest {
                    image_url: &image_url,
                    question,
                    stream: false,
                },
            )
            .await?;

        response.answer.ok_or_else(|| {
            CapabilityError::MalformedResponse("query response has no 'answer'".to_string())
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, CapabilityError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.endpoint, path);
        debug!("Moondream request: POST {}", url);

        let mut request = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.header(AUTH_HEADER, key);
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

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                CapabilityError::MalformedResponse(format!("JSON parse error: {}", e))
            }
        })
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

/// Detection capability backed by Moondream
pub struct DetectionClient {
    backend: Arc<MoondreamClient>,
    convention: CoordinateConvention,
}

impl DetectionClient {
    pub fn new(backend: Arc<MoondreamClient>, convention: CoordinateConvention) -> Self {
        Self {
            backend,
            convention,
        }
    }
}

#[async_trait]
impl CapabilityClient for DetectionClient {
    async fn invoke(
        &self,
        image: &DecodedImage,
        params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError> {
        let TaskParams::Detection { class_label } = params else {
            return Err(CapabilityError::InvalidParams(format!(
                "detection expects a class label, got {:?}",
                params
            )));
        };

        let raw = self.backend.detect(image, class_label).await?;
        let boxes = raw
            .into_iter()
            .map(|d| d.into_box(class_label, self.convention, image.width(), image.height()))
            .collect();

        Ok(TaskOutcome::Detection(boxes))
    }

    fn name(&self) -> &'static str {
        "moondream-detect"
    }

    fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }
}

/// Question-answering capability backed by Moondream
pub struct QuestionAnsweringClient {
    backend: Arc<MoondreamClient>,
}

impl QuestionAnsweringClient {
    pub fn new(backend: Arc<MoondreamClient>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CapabilityClient for QuestionAnsweringClient {
    async fn invoke(
        &self,
        image: &DecodedImage,
        params: &TaskParams,
    ) -> Result<TaskOutcome, CapabilityError> {
        let TaskParams::Question { question } = params else {
            return Err(CapabilityError::InvalidParams(format!(
                "question answering expects a question, got {:?}",
                params
            )));
        };

        let answer = self.backend.query(image, question).await?;
        Ok(TaskOutcome::Answer(answer.trim().to_string()))
    }

    fn name(&self) -> &'static str {
        "moondream-query"
    }

    fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }
}
