//! Error types for the encoder module.

use streamer_capture::CaptureError;
use thiserror::Error;

/// Errors that can occur while turning a device frame into an upload payload.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The device could not provide a frame.
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// Invalid encoder configuration.
    #[error("Invalid encoder configuration: {0}")]
    InvalidConfig(String),

    /// The frame does not match its declared dimensions.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// Rendering into the raster buffer failed.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Serialising the raster failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] image::ImageError),
}

impl EncoderError {
    /// Returns true if the failure came from the device rather than the encoder.
    pub fn is_capture(&self) -> bool {
        matches!(self, Self::Capture(_))
    }
}
