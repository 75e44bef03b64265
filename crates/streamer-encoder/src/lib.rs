//! Frame rasterisation and JPEG serialisation.
//!
//! This crate turns the latest frame of a capture device into a compressed
//! image payload ready for upload.

mod error;
mod jpeg;

pub use error::EncoderError;
pub use jpeg::FrameEncoder;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// MIME type of the payloads produced by [`FrameEncoder`].
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Frame encoding configuration.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// JPEG quality (1 - 100).
    pub quality: u8,

    /// Raster width when the source does not report its size.
    pub fallback_width: u32,

    /// Raster height when the source does not report its size.
    pub fallback_height: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            fallback_width: 1280,
            fallback_height: 720,
        }
    }
}

impl EncoderConfig {
    /// Check the configuration before building an encoder.
    pub fn validate(&self) -> EncoderResult<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(EncoderError::InvalidConfig(format!(
                "quality {} is outside 1-100",
                self.quality
            )));
        }
        if self.fallback_width == 0 || self.fallback_height == 0 {
            return Err(EncoderError::InvalidConfig(
                "fallback resolution must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// A compressed frame ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Compressed image bytes.
    pub data: Bytes,

    /// Raster width in pixels.
    pub width: u32,

    /// Raster height in pixels.
    pub height: u32,

    /// MIME type of `data`.
    pub content_type: &'static str,

    /// Device frame counter of the source frame.
    pub source_sequence: u64,

    /// When the source frame was captured.
    pub captured_at: DateTime<Utc>,
}
