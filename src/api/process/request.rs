// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Process request type and validation

use serde::{Deserialize, Serialize};

use crate::analysis::registry::TaskArguments;
use crate::api::errors::ApiError;

pub const MISSING_FIELDS_MESSAGE: &str = "Missing 'image' or 'tasks'";

/// Request for multi-task analysis
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Base64-encoded image data, optionally as a data URL
    #[serde(default)]
    pub image: Option<String>,

    /// Task kind tokens; unknown ones are ignored
    #[serde(default)]
    pub tasks: Option<Vec<String>>,

    /// Target class for object detection
    #[serde(default)]
    pub detect_class: Option<String>,

    /// Question for visual question answering
    #[serde(default)]
    pub question: Option<String>,
}

impl ProcessRequest {
    /// Both `image` and `tasks` must be present; an empty task list is valid
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.image.is_none() || self.tasks.is_none() {
            return Err(ApiError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_string()));
        }
        Ok(())
    }

    pub fn task_tokens(&self) -> &[String] {
        self.tasks.as_deref().unwrap_or_default()
    }

    pub fn arguments(&self) -> TaskArguments<'_> {
        TaskArguments {
            detect_class: self.detect_class.as_deref(),
            question: self.question.as_deref(),
        }
    }
}
