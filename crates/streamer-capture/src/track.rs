//! Track-ended signalling between a device and its watcher.

use std::sync::Arc;

use tokio::sync::watch;

/// Device-side handle used to announce that the track ended.
#[derive(Debug, Clone)]
pub struct TrackSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl TrackSignal {
    /// Create a signal for a live track.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Mark the track as ended. Later calls are no-ops.
    pub fn end(&self) {
        self.tx.send_if_modified(|ended| {
            let changed = !*ended;
            *ended = true;
            changed
        });
    }

    /// Returns true once the track has ended.
    pub fn is_ended(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a watcher for this track.
    pub fn watcher(&self) -> TrackWatcher {
        TrackWatcher {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for TrackSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Controller-side handle that resolves when the track ends.
#[derive(Debug)]
pub struct TrackWatcher {
    rx: watch::Receiver<bool>,
}

impl TrackWatcher {
    /// Wait for the track to end.
    ///
    /// Returns `false` if the device dropped its signal without ending the
    /// track, which happens on a normal release.
    pub async fn ended(mut self) -> bool {
        self.rx.wait_for(|ended| *ended).await.is_ok()
    }
}
