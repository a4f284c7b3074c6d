// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image decoding and transport encoding
//!
//! Every uploaded image is normalized to 8-bit RGB here, so capability
//! clients and the overlay renderer never branch on the source format.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum decoded payload size (10MB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// JPEG quality used when re-encoding for backend transport
const TRANSPORT_JPEG_QUALITY: u8 = 90;

/// Errors raised while turning an upload into a raster
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Image data is empty")]
    EmptyData,

    #[error("Image has zero size ({0}x{1})")]
    ZeroSize(u32, u32),
}

/// Errors raised while re-encoding a raster for a backend
#[derive(Debug, Error)]
#[error("Failed to encode image: {0}")]
pub struct EncodeError(#[from] image::ImageError);

/// An uploaded image, decoded to RGB8
///
/// Lives only as long as the request that produced it.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbImage,
    format: ImageFormat,
    size_bytes: usize,
    /// Base64 JPEG shared by every backend call on this image
    transport: OnceLock<String>,
}

impl DecodedImage {
    /// Wrap an already-decoded raster
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self {
            pixels,
            format: ImageFormat::Png,
            size_bytes: 0,
            transport: OnceLock::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// The clean raster. Renderers copy it rather than drawing on it.
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Format detected from the upload's magic bytes
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Size of the encoded upload in bytes
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Re-encode as JPEG
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, TRANSPORT_JPEG_QUALITY);
        self.pixels.write_with_encoder(encoder)?;
        Ok(buf)
    }

    /// Base64 JPEG for backend transport, encoded on first use
    pub fn to_jpeg_base64(&self) -> Result<&str, EncodeError> {
        if let Some(encoded) = self.transport.get() {
            return Ok(encoded);
        }
        let encoded = STANDARD.encode(self.to_jpeg_bytes()?);
        Ok(self.transport.get_or_init(|| encoded))
    }

    /// Encode the transport form ahead of any backend call
    pub fn prepare_transport(&self) -> Result<(), EncodeError> {
        self.to_jpeg_base64().map(|_| ())
    }

    pub fn is_transport_ready(&self) -> bool {
        self.transport.get().is_some()
    }

    /// Re-encode as a `data:image/jpeg;base64,...` URL
    pub fn to_jpeg_data_url(&self) -> Result<String, EncodeError> {
        Ok(format!("data:image/jpeg;base64,{}", self.to_jpeg_base64()?))
    }
}

/// Decode a base64-encoded image
///
/// # Example
/// ```ignore
/// let image = decode_base64_image("iVBORw0KGgo...")?;
/// println!("Image size: {}x{}", image.width(), image.height());
/// ```
pub fn decode_base64_image(base64_str: &str) -> Result<DecodedImage, DecodeError> {
    let trimmed = base64_str.trim();
    if trimmed.is_empty() {
        return Err(DecodeError::EmptyData);
    }

    // Accept data URLs as well as bare base64
    let payload = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };

    // Wrapped output from `base64` and similar tools carries line breaks
    let payload: String = payload.split_ascii_whitespace().collect();

    let bytes = STANDARD.decode(payload)?;
    decode_image_bytes(&bytes)
}

/// Decode raw image bytes into an RGB8 raster
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(DecodeError::TooLarge(bytes.len(), MAX_IMAGE_SIZE));
    }

    if bytes.is_empty() {
        return Err(DecodeError::EmptyData);
    }

    let format = detect_format(bytes)?;

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| DecodeError::DecodeFailed(e.to_string()))?;

    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::ZeroSize(img.width(), img.height()));
    }

    Ok(DecodedImage {
        pixels: img.to_rgb8(),
        format,
        size_bytes: bytes.len(),
        transport: OnceLock::new(),
    })
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, DecodeError> {
    if bytes.len() < 4 {
        return Err(DecodeError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II (little-endian) or MM (big-endian)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(DecodeError::UnsupportedFormat),
    }
}

/// Get the format extension as a string
pub fn format_to_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Tiff => "tiff",
        _ => "unknown",
    }
}
