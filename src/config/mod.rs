// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration loaded from the environment

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::analysis::landmark::GOOGLE_VISION_ENDPOINT;
use crate::analysis::moondream::{CoordinateConvention, MOONDREAM_CLOUD_ENDPOINT};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("Invalid URL for {var}: {reason}")]
    InvalidUrl { var: &'static str, reason: String },
}

/// Runtime configuration for the analysis node
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body; base64 inflates images by a third
    pub max_body_bytes: usize,
    /// Deadline for all tasks of one request
    pub request_timeout_secs: u64,
    pub moondream_api_key: Option<String>,
    /// Cloud API or a local Moondream Station
    pub moondream_endpoint: String,
    pub moondream_coordinates: CoordinateConvention,
    pub google_vision_api_key: Option<String>,
    pub google_vision_endpoint: String,
    pub landmark_max_results: u32,
    /// HTTP timeout for each backend call
    pub backend_timeout_secs: u64,
    pub debug_overlay: bool,
    pub debug_output_dir: PathBuf,
    pub overlay_font_path: Option<PathBuf>,
    /// Public tunnel URL, only logged
    pub public_url: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_body_bytes: 16 * 1024 * 1024,
            request_timeout_secs: 60,
            moondream_api_key: None,
            moondream_endpoint: MOONDREAM_CLOUD_ENDPOINT.to_string(),
            moondream_coordinates: CoordinateConvention::Normalized,
            google_vision_api_key: None,
            google_vision_endpoint: GOOGLE_VISION_ENDPOINT.to_string(),
            landmark_max_results: 10,
            backend_timeout_secs: 30,
            debug_overlay: true,
            debug_output_dir: PathBuf::from("."),
            overlay_font_path: None,
            public_url: None,
        }
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                var,
                value,
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable source
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            host: lookup("API_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "API_PORT", defaults.port)?,
            max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes)?,
            request_timeout_secs: parse_var(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            moondream_api_key: lookup("MOONDREAM_API_KEY"),
            moondream_endpoint: lookup("MOONDREAM_ENDPOINT")
                .unwrap_or(defaults.moondream_endpoint),
            moondream_coordinates: parse_var(
                &lookup,
                "MOONDREAM_COORDINATES",
                defaults.moondream_coordinates,
            )?,
            google_vision_api_key: lookup("GOOGLE_VISION_API_KEY"),
            google_vision_endpoint: lookup("GOOGLE_VISION_ENDPOINT")
                .unwrap_or(defaults.google_vision_endpoint),
            landmark_max_results: parse_var(
                &lookup,
                "LANDMARK_MAX_RESULTS",
                defaults.landmark_max_results,
            )?,
            backend_timeout_secs: parse_var(
                &lookup,
                "BACKEND_TIMEOUT_SECS",
                defaults.backend_timeout_secs,
            )?,
            debug_overlay: parse_bool(&lookup, "DEBUG_OVERLAY", defaults.debug_overlay)?,
            debug_output_dir: lookup("DEBUG_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.debug_output_dir),
            overlay_font_path: lookup("OVERLAY_FONT_PATH").map(PathBuf::from),
            public_url: lookup("PUBLIC_URL").map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Zero("API_PORT"));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Zero("MAX_BODY_BYTES"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Zero("REQUEST_TIMEOUT_SECS"));
        }
        if self.backend_timeout_secs == 0 {
            return Err(ConfigError::Zero("BACKEND_TIMEOUT_SECS"));
        }
        if self.landmark_max_results == 0 {
            return Err(ConfigError::Zero("LANDMARK_MAX_RESULTS"));
        }

        for (var, value) in [
            ("MOONDREAM_ENDPOINT", &self.moondream_endpoint),
            ("GOOGLE_VISION_ENDPOINT", &self.google_vision_endpoint),
        ] {
            let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
                var,
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl {
                    var,
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
        }

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if any backend credential is present
    pub fn has_any_credentials(&self) -> bool {
        self.moondream_api_key.is_some() || self.google_vision_api_key.is_some()
    }
}
