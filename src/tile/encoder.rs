//! Tile encoding.
//!
//! Rendered tiles are RGB buffers; an [`ImageEncoder`] turns them into the
//! bytes served to viewers. [`JpegTileEncoder`] is the shipped
//! implementation and uses a fixed quality chosen at construction time.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::TileError;

/// Default JPEG quality for rendered tiles (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Turns a rendered RGB tile into encoded bytes.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &RgbImage) -> Result<Bytes, TileError>;

    /// MIME type of the encoded output.
    fn content_type(&self) -> &'static str;

    /// File extension used in tile URLs and descriptors.
    fn extension(&self) -> &'static str;
}

// =============================================================================
// JPEG Encoder
// =============================================================================

/// JPEG encoder with a fixed quality.
#[derive(Debug, Clone)]
pub struct JpegTileEncoder {
    quality: u8,
}

impl JpegTileEncoder {
    /// Create an encoder at [`DEFAULT_JPEG_QUALITY`].
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    /// Create an encoder at the given quality, clamped to 1-100.
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegTileEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageEncoder for JpegTileEncoder {
    fn encode(&self, image: &RgbImage) -> Result<Bytes, TileError> {
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);

        encoder
            .encode_image(image)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }

    fn content_type(&self) -> &'static str {
        "image/jpeg"
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
