//! Typed session state, commands, and events for the streamer.
//!
//! This crate defines the vocabulary shared between the session controller
//! and whatever surface drives it (CLI, UI bridge, tests).

mod commands;
mod events;
mod state;
mod types;

pub use commands::SessionCommand;
pub use events::SessionEvent;
pub use state::{ConnectionState, StopReason};
pub use types::{
    AlertLevel, CaptureTarget, FrameAcknowledgment, InvalidTarget, SessionInfo, SessionSnapshot,
    SessionStatus, SessionSummary, StreamConfig, MAX_FRAME_INTERVAL_SECS, MIN_FRAME_INTERVAL_SECS,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (surface → controller).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (controller → surface).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
