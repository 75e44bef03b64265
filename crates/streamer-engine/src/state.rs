//! Resources held by one session and their release.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use streamer_capture::CaptureDevice;
use streamer_ipc::SessionInfo;

/// "Stopped by user" flag shared with every continuation of one session.
///
/// A fresh flag is handed out per session, so cancelling it never affects a
/// session started afterwards.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the session as stopped.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once the session has been stopped.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Device, remote session, and track watcher owned by the controller.
///
/// Every exit path goes through [`teardown`](Self::teardown), which is
/// synchronous: by the time it returns the device is released and nothing
/// scheduled for this session can act on it.
pub(crate) struct SessionResources<D: CaptureDevice> {
    device: Option<D>,
    session: Option<SessionInfo>,
    watcher: Option<JoinHandle<()>>,
    cancel: CancelFlag,
    epoch: u64,
}

impl<D: CaptureDevice> SessionResources<D> {
    pub(crate) fn new() -> Self {
        let cancel = CancelFlag::new();
        cancel.cancel();
        Self {
            device: None,
            session: None,
            watcher: None,
            cancel,
            epoch: 0,
        }
    }

    /// Open a new session epoch with a fresh cancel flag.
    pub(crate) fn begin(&mut self) -> u64 {
        self.teardown();
        self.epoch += 1;
        self.cancel = CancelFlag::new();
        debug!(epoch = self.epoch, "Session epoch opened");
        self.epoch
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Returns true if a continuation tagged with `epoch` may still act.
    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && !self.cancel.is_cancelled()
    }

    pub(crate) fn install_device(&mut self, device: D, watcher: JoinHandle<()>) {
        self.release_device();
        info!(device = device.label(), "Capture device attached");
        self.device = Some(device);
        self.watcher = Some(watcher);
    }

    pub(crate) fn device_mut(&mut self) -> Option<&mut D> {
        self.device.as_mut()
    }

    #[cfg(test)]
    pub(crate) fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Stop watching and release the device, if one is held.
    pub(crate) fn release_device(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        if let Some(mut device) = self.device.take() {
            device.release();
            debug!(device = device.label(), "Capture device released");
        }
    }

    pub(crate) fn set_session(&mut self, session: SessionInfo) {
        self.session = Some(session);
    }

    pub(crate) fn session(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.device.is_none() && self.session.is_none()
    }

    /// Cancel the session's continuations, release the device, and hand
    /// back the remote session for the caller to stop.
    #[instrument(name = "teardown_session", skip(self), fields(epoch = self.epoch))]
    pub(crate) fn teardown(&mut self) -> Option<SessionInfo> {
        self.cancel.cancel();
        self.release_device();
        self.session.take()
    }
}

impl<D: CaptureDevice> Drop for SessionResources<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
