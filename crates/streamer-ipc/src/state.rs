//! Session controller state machine types.

use serde::{Deserialize, Serialize};

/// The current state of the session controller.
///
/// `Idle → Starting → Active ⇄ Reconnecting → Stopping → Idle`, with `Error`
/// reachable from `Starting` or `Active` and left only by a new start or a stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No device held, no session.
    #[default]
    Idle,

    /// Acquiring the device and creating the remote session.
    Starting,

    /// Capturing and submitting frames.
    Active,

    /// The device track ended; waiting to re-acquire it.
    Reconnecting {
        /// The re-acquisition attempt that will run next (1-based).
        attempt: u32,
    },

    /// Tearing down the session.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,
    },

    /// Start failed or reconnection gave up.
    Error {
        /// Error message.
        message: String,
    },
}

impl ConnectionState {
    /// Returns true if the controller is idle.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the controller is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting)
    }

    /// Returns true if frames are being captured.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if the device is being re-acquired.
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting { .. })
    }

    /// Returns true if the controller is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the controller is in the error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns true while a session is being started or is running.
    ///
    /// A start request in any of these states is ignored.
    pub fn is_running(&self) -> bool {
        self.is_starting() || self.is_active() || self.is_reconnecting()
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Stopping { .. } => "stopping",
            Self::Error { .. } => "error",
        }
    }
}

/// Reason for stopping a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// User requested stop.
    UserRequested,

    /// The remote service no longer recognises the session (404/409 on submit).
    SessionInvalidated { status: u16 },

    /// Device re-acquisition failed too many times.
    ReconnectExhausted { attempts: u32 },

    /// The owning surface went away.
    Teardown,
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Stream stopped by user".to_string(),
            Self::SessionInvalidated { status } => format!(
                "Stream session is no longer valid (HTTP {status}); start streaming again"
            ),
            Self::ReconnectExhausted { attempts } => {
                format!("Camera could not be reconnected after {attempts} attempts")
            }
            Self::Teardown => "Stream torn down".to_string(),
        }
    }
}
