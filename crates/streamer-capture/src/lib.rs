//! Capture device abstraction for live streaming.
//!
//! The session controller never talks to camera drivers directly. It acquires
//! devices through a [`DeviceProvider`], pulls the latest frame from the
//! [`CaptureDevice`] on each capture tick, and watches the device's
//! [`TrackSignal`] for unexpected termination.

mod error;
mod frame;
mod pattern;
mod track;

pub use error::CaptureError;
pub use frame::CapturedFrame;
pub use pattern::{TestPatternConfig, TestPatternDevice, TestPatternProvider};
pub use track::{TrackSignal, TrackWatcher};

use std::future::Future;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// A live video source held by one session controller.
pub trait CaptureDevice: Send + 'static {
    /// Human-readable device label for logs.
    fn label(&self) -> &str;

    /// Natural dimensions of the source, if the device reports them.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Grab the most recent RGB24 frame.
    fn grab_frame(&mut self) -> CaptureResult<CapturedFrame>;

    /// Watch for the device's track ending.
    fn track_watcher(&self) -> TrackWatcher;

    /// Check if the device is still delivering frames.
    fn is_active(&self) -> bool;

    /// Release the device. Must be safe to call more than once.
    fn release(&mut self);
}

/// Acquires capture devices.
pub trait DeviceProvider: Send + Sync + 'static {
    /// Device type produced by this provider.
    type Device: CaptureDevice;

    /// Request access to the device.
    fn acquire(&self) -> impl Future<Output = CaptureResult<Self::Device>> + Send;
}
