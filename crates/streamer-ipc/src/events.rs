//! Events sent from the session controller to the surface.

use serde::{Deserialize, Serialize};

use crate::state::ConnectionState;
use crate::types::{FrameAcknowledgment, SessionInfo, SessionSummary};

/// Events that the session controller publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Controller state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<ConnectionState>,

        /// Current state.
        current: Box<ConnectionState>,
    },

    /// The remote service created a session.
    SessionCreated(SessionInfo),

    /// A frame was acknowledged with its detection count.
    FrameAcknowledged(FrameAcknowledgment),

    /// A capture tick was dropped because a submission was still in flight.
    TickSkipped {
        /// Number of ticks skipped so far in this session.
        total_skipped: u64,
    },

    /// The capture device was re-acquired.
    Reconnected {
        /// Cumulative successful re-acquisitions in this session.
        reconnect_attempts: u32,
    },

    /// The remote session was stopped and reported its final counts.
    SessionStopped(SessionSummary),

    /// Error occurred.
    Error {
        /// Whether the session keeps running after this error.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// Controller has shut down.
    Shutdown,
}
