// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Core types for multi-task image analysis

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::vision::image_utils::EncodeError;

/// The closed set of analysis tasks a request can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Region detection for a target class
    ObjectDetection,
    /// Visual question answering
    Vqa,
    /// Landmark recognition
    LandmarkDetection,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::ObjectDetection,
        TaskKind::Vqa,
        TaskKind::LandmarkDetection,
    ];

    /// Wire token used in the request's `tasks` list
    pub fn token(&self) -> &'static str {
        match self {
            TaskKind::ObjectDetection => "object_detection",
            TaskKind::Vqa => "vqa",
            TaskKind::LandmarkDetection => "landmark_detection",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.token() == token)
    }

    /// Response key holding this task's payload on success
    pub fn result_key(&self) -> &'static str {
        match self {
            TaskKind::ObjectDetection => "bounding_boxes",
            TaskKind::Vqa => "vqa_answer",
            TaskKind::LandmarkDetection => "landmarks",
        }
    }

    /// Response key holding this task's message on failure
    pub fn error_key(&self) -> &'static str {
        match self {
            TaskKind::ObjectDetection => "detection_error",
            TaskKind::Vqa => "vqa_error",
            TaskKind::LandmarkDetection => "landmark_error",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Resolved, per-task parameters handed to a capability client
#[derive(Debug, Clone, PartialEq)]
pub enum TaskParams {
    Detection { class_label: String },
    Question { question: String },
    Landmark,
}

/// A detected region in fractional image coordinates
///
/// Coordinates are always within [0, 1] with `x_min <= x_max` and
/// `y_min <= y_max` once built through [`BoundingBox::new`] or
/// [`BoundingBox::clamped`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub label: String,
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

impl BoundingBox {
    /// Build a box from fractional coordinates, clamping and ordering them
    pub fn new(label: impl Into<String>, x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            label: label.into(),
            x_min,
            y_min,
            x_max,
            y_max,
        }
        .clamped()
    }

    /// Build a box from pixel coordinates relative to a `width` x `height` image
    pub fn from_pixels(
        label: impl Into<String>,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
        width: u32,
        height: u32,
    ) -> Self {
        let w = f64::from(width.max(1));
        let h = f64::from(height.max(1));
        Self::new(label, x_min / w, y_min / h, x_max / w, y_max / h)
    }

    /// Clamp every coordinate into [0, 1] and swap inverted edges
    pub fn clamped(self) -> Self {
        let (x0, x1) = (clamp_unit(self.x_min), clamp_unit(self.x_max));
        let (y0, y1) = (clamp_unit(self.y_min), clamp_unit(self.y_max));
        Self {
            label: self.label,
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
        }
    }

    pub fn is_normalized(&self) -> bool {
        [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
            && self.x_min <= self.x_max
            && self.y_min <= self.y_max
    }

    /// Pixel rectangle `(x1, y1, x2, y2)` on a `width` x `height` raster,
    /// truncated toward zero and kept inside the raster
    pub fn to_pixel_rect(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let b = self.clone().clamped();
        let max_x = width.saturating_sub(1);
        let max_y = height.saturating_sub(1);
        let px = |v: f64, extent: u32, max: u32| ((v * f64::from(extent)) as u32).min(max);
        (
            px(b.x_min, width, max_x),
            px(b.y_min, height, max_y),
            px(b.x_max, width, max_x),
            px(b.y_max, height, max_y),
        )
    }
}

/// A recognized landmark with its geographic position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// The single outcome of one task kind within one request
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Detection(Vec<BoundingBox>),
    Answer(String),
    Landmarks(Vec<Landmark>),
    Error(String),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskOutcome::Error(_))
    }

    /// Task kind a successful outcome belongs to
    pub fn kind(&self) -> Option<TaskKind> {
        match self {
            TaskOutcome::Detection(_) => Some(TaskKind::ObjectDetection),
            TaskOutcome::Answer(_) => Some(TaskKind::Vqa),
            TaskOutcome::Landmarks(_) => Some(TaskKind::LandmarkDetection),
            TaskOutcome::Error(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            TaskOutcome::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Failure of one backend call, contained to its task
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Network-level failure talking to the backend
    #[error("backend request failed: {0}")]
    Transport(String),

    /// Backend did not answer in time
    #[error("backend timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Backend answered with a non-success status
    #[error("backend rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Backend answered with something we cannot interpret
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// The raster could not be prepared for the backend's transport format
    #[error("could not prepare image for backend: {0}")]
    Encoding(String),

    /// The parameters do not belong to this client
    #[error("invalid task parameters: {0}")]
    InvalidParams(String),

    /// No client is registered for the task
    #[error("no backend configured for {0}")]
    Unavailable(TaskKind),

    /// The request was cancelled before the backend answered
    #[error("task cancelled before completion")]
    Cancelled,
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CapabilityError::Timeout { timeout_ms: 0 }
        } else if e.is_decode() {
            CapabilityError::MalformedResponse(e.to_string())
        } else {
            CapabilityError::Transport(e.to_string())
        }
    }
}

impl From<EncodeError> for CapabilityError {
    fn from(e: EncodeError) -> Self {
        CapabilityError::Encoding(e.to_string())
    }
}
