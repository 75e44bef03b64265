//! Commands sent from the surface to the session controller.

use serde::{Deserialize, Serialize};

use crate::types::CaptureTarget;

/// Commands that a surface can send to the session controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionCommand {
    /// Acquire the device, create a remote session, and start capturing.
    Start { target: CaptureTarget },

    /// Stop the current session and release the device.
    Stop,

    /// Change the frame interval (seconds) without restarting.
    SetFrameInterval(u32),

    /// Tear everything down and stop the controller.
    Shutdown,
}

impl SessionCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Stop => "stop",
            Self::SetFrameInterval(_) => "set_frame_interval",
            Self::Shutdown => "shutdown",
        }
    }
}
