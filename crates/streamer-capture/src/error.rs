//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur during capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No capture device is available.
    #[error("Capture device not found: {0}")]
    DeviceNotFound(String),

    /// Access to the device was refused.
    #[error("Permission denied for capture")]
    PermissionDenied,

    /// The device exists but could not be opened.
    #[error("Failed to open capture device: {0}")]
    OpenFailed(String),

    /// The device has been released.
    #[error("Capture device released")]
    Released,

    /// Device track ended during capture.
    #[error("Capture device lost")]
    DeviceLost,

    /// The device has not produced a frame yet.
    #[error("No frame available yet")]
    NoFrame,

    /// Frame conversion error.
    #[error("Frame conversion error: {0}")]
    FrameConversion(String),
}
