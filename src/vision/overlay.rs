// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Overlay rendering of detection results
//!
//! Draws labeled rectangles onto a copy of the decoded raster. The input
//! image is never modified, so backends see the clean pixels even while an
//! overlay is being produced for the same request.

use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use super::image_utils::{DecodedImage, EncodeError};
use crate::analysis::types::BoundingBox;

/// Outline and label color
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Vertical gap between a label and the top edge of its box
const LABEL_OFFSET: i32 = 10;

const ARTIFACT_JPEG_QUALITY: u8 = 90;

const SYSTEM_FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Cannot render onto an empty image")]
    EmptyImage,

    #[error("Failed to load font {path}: {reason}")]
    FontLoad { path: String, reason: String },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Drawing settings for overlays
pub struct OverlayConfig {
    /// Label font. Without one, only rectangles are drawn.
    pub font: Option<FontVec>,
    pub font_scale: f32,
    /// Outline thickness in pixels, drawn inward from the box edge
    pub thickness: u32,
    pub color: Rgb<u8>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
            thickness: 3,
            color: OVERLAY_COLOR,
        }
    }
}

impl std::fmt::Debug for OverlayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayConfig")
            .field("font", &self.font.is_some())
            .field("font_scale", &self.font_scale)
            .field("thickness", &self.thickness)
            .field("color", &self.color)
            .finish()
    }
}

impl OverlayConfig {
    pub fn with_font_path(font_path: &Path) -> Result<Self, RenderError> {
        let font_load = |reason: String| RenderError::FontLoad {
            path: font_path.display().to_string(),
            reason,
        };

        let font_data = std::fs::read(font_path).map_err(|e| font_load(e.to_string()))?;
        let font = FontVec::try_from_vec(font_data).map_err(|e| font_load(e.to_string()))?;

        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    /// Try common system font locations, falling back to rectangles only
    pub fn with_system_font() -> Self {
        for path in SYSTEM_FONT_PATHS {
            if let Ok(font_data) = std::fs::read(path) {
                if let Ok(font) = FontVec::try_from_vec(font_data) {
                    info!("Loaded overlay font: {}", path);
                    return Self {
                        font: Some(font),
                        ..Self::default()
                    };
                }
            }
        }

        debug!("No system font found, overlay labels will be skipped");
        Self::default()
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

/// A rendered overlay, owned by the request that produced it
#[derive(Debug, Clone)]
pub struct OverlayArtifact {
    pub image: RgbImage,
    pub box_count: usize,
}

impl OverlayArtifact {
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>, RenderError> {
        let mut buf = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, ARTIFACT_JPEG_QUALITY);
        self.image
            .write_with_encoder(encoder)
            .map_err(EncodeError::from)?;
        Ok(buf)
    }
}

#[derive(Debug, Default)]
pub struct OverlayRenderer {
    config: OverlayConfig,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Draw `boxes` onto a copy of `image`
    pub fn render(
        &self,
        image: &DecodedImage,
        boxes: &[BoundingBox],
    ) -> Result<OverlayArtifact, RenderError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyImage);
        }

        let mut canvas = image.pixels().clone();
        for bbox in boxes {
            let rect = bbox.to_pixel_rect(width, height);
            self.draw_box(&mut canvas, rect);
            self.draw_label(&mut canvas, rect, &bbox.label);
        }

        Ok(OverlayArtifact {
            image: canvas,
            box_count: boxes.len(),
        })
    }

    fn draw_box(&self, canvas: &mut RgbImage, (x1, y1, x2, y2): (u32, u32, u32, u32)) {
        let box_w = x2 - x1 + 1;
        let box_h = y2 - y1 + 1;

        for t in 0..self.config.thickness {
            let (w, h) = match (
                box_w.checked_sub(2 * t).filter(|w| *w > 0),
                box_h.checked_sub(2 * t).filter(|h| *h > 0),
            ) {
                (Some(w), Some(h)) => (w, h),
                _ => break,
            };

            let rect = Rect::at((x1 + t) as i32, (y1 + t) as i32).of_size(w, h);
            draw_hollow_rect_mut(canvas, rect, self.config.color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, (x1, y1, _, _): (u32, u32, u32, u32), text: &str) {
        let Some(ref font) = self.config.font else {
            return;
        };
        if text.is_empty() {
            return;
        }

        // Above the box, or just inside it when the box touches the top
        let above = y1 as i32 - LABEL_OFFSET;
        let y = if above >= 0 {
            above
        } else {
            (y1 + self.config.thickness) as i32
        };

        draw_text_mut(
            canvas,
            self.config.color,
            x1 as i32,
            y,
            self.config.font_scale,
            font,
            text,
        );
    }
}
