//! Error types for the session controller.

use streamer_encoder::EncoderError;
use thiserror::Error;

/// Errors returned to callers of a [`SessionHandle`](crate::SessionHandle).
///
/// Failures of the session itself (device denied, session rejected, ...)
/// are not errors here: they surface as controller state and events.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The controller task has exited.
    #[error("Session controller is no longer running")]
    ControllerClosed,

    /// Frame interval outside the accepted range.
    #[error("Frame interval must be between {min} and {max} seconds, got {secs}")]
    InvalidFrameInterval { secs: u32, min: u32, max: u32 },

    /// The frame encoder could not be configured.
    #[error("Encoder setup failed: {0}")]
    Encoder(#[from] EncoderError),
}
