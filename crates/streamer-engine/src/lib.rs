//! Session controller for the live capture streamer.
//!
//! This crate composes the capture device, frame encoder, and session
//! transport into one state machine. A [`SessionController`] runs as a single
//! tokio task; surfaces drive it through a [`SessionHandle`] and observe it
//! through [`SessionEvent`](streamer_ipc::SessionEvent)s and snapshots.

mod capture_loop;
mod error;
mod metrics;
mod orchestrator;
mod state;
mod supervisor;

pub use error::EngineError;
pub use metrics::{MetricsCollector, SessionMetrics};
pub use orchestrator::{SessionController, SessionHandle};
pub use state::CancelFlag;
pub use supervisor::{ReconnectPolicy, DEFAULT_RECONNECT_DELAY};

use std::sync::Arc;

use crossbeam_channel::Sender;

use streamer_capture::DeviceProvider;
use streamer_ipc::{SessionEvent, StreamConfig};
use streamer_transport::SessionTransport;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Create a controller wired to `provider` and `transport`.
///
/// Callers keep their own `Arc`s to query the transport or provider after
/// the controller is spawned.
pub fn create_controller<P: DeviceProvider, T: SessionTransport>(
    provider: Arc<P>,
    transport: Arc<T>,
    config: StreamConfig,
    event_tx: Sender<SessionEvent>,
) -> EngineResult<(SessionController<P, T>, SessionHandle)> {
    SessionController::new(provider, transport, config, event_tx)
}
