// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Raster handling for the analysis pipeline
//!
//! This module provides:
//! - Decoding of uploaded images into a normalized RGB raster
//! - Re-encoding for backend transport formats
//! - Debug overlays of detection results and their persistence

pub mod artifact;
pub mod image_utils;
pub mod overlay;

pub use artifact::{ArtifactError, ArtifactSink, FileArtifactSink, ARTIFACT_FILE_NAME};
pub use image_utils::{
    decode_base64_image, decode_image_bytes, detect_format, DecodeError, DecodedImage,
    EncodeError,
};
pub use overlay::{OverlayArtifact, OverlayConfig, OverlayRenderer, RenderError};
