//! Synthetic test-pattern capture source.
//!
//! Produces a moving colour gradient so a session can be exercised end to end
//! without camera hardware. The track can be configured to end after a fixed
//! time, which drives the controller through its reconnect path.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::error::CaptureError;
use crate::frame::CapturedFrame;
use crate::track::{TrackSignal, TrackWatcher};
use crate::{CaptureDevice, CaptureResult, DeviceProvider};

/// Configuration for the test-pattern source.
#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    /// Device label.
    pub label: String,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Whether the device reports its dimensions.
    pub report_dimensions: bool,

    /// End the track this long after each acquisition.
    pub end_after: Option<Duration>,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            label: "test-pattern".to_string(),
            width: 640,
            height: 480,
            report_dimensions: true,
            end_after: None,
        }
    }
}

/// Provider that hands out [`TestPatternDevice`]s.
pub struct TestPatternProvider {
    config: TestPatternConfig,
    acquisitions: AtomicU64,
    deny_remaining: AtomicU32,
}

impl TestPatternProvider {
    /// Create a new provider.
    pub fn new(config: TestPatternConfig) -> Self {
        Self {
            config,
            acquisitions: AtomicU64::new(0),
            deny_remaining: AtomicU32::new(0),
        }
    }

    /// Refuse the next `count` acquisitions with `PermissionDenied`.
    pub fn deny_next(&self, count: u32) {
        self.deny_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of successful acquisitions so far.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::SeqCst)
    }

    fn take_denial(&self) -> bool {
        self.deny_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for TestPatternProvider {
    fn default() -> Self {
        Self::new(TestPatternConfig::default())
    }
}

impl DeviceProvider for TestPatternProvider {
    type Device = TestPatternDevice;

    #[instrument(name = "pattern_acquire", skip(self), fields(label = %self.config.label))]
    async fn acquire(&self) -> CaptureResult<TestPatternDevice> {
        if self.take_denial() {
            return Err(CaptureError::PermissionDenied);
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(CaptureError::OpenFailed(format!(
                "invalid pattern size {}x{}",
                self.config.width, self.config.height
            )));
        }

        let n = self.acquisitions.fetch_add(1, Ordering::SeqCst) + 1;
        let device = TestPatternDevice::open(self.config.clone());
        info!(acquisition = n, "Test pattern acquired");

        if let Some(after) = self.config.end_after {
            let signal = device.signal.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                debug!("Test pattern track ending");
                signal.end();
            });
        }

        Ok(device)
    }
}

/// A synthetic device producing a moving gradient.
pub struct TestPatternDevice {
    config: TestPatternConfig,
    signal: TrackSignal,
    sequence: u64,
    released: bool,
}

impl TestPatternDevice {
    fn open(config: TestPatternConfig) -> Self {
        Self {
            config,
            signal: TrackSignal::new(),
            sequence: 0,
            released: false,
        }
    }

    /// End the track as if the camera were unplugged.
    pub fn end_track(&self) {
        self.signal.end();
    }

    fn render(&self, shift: u64) -> Vec<u8> {
        let (width, height) = (self.config.width as usize, self.config.height as usize);
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let r = ((x as u64 + shift) % 256) as u8;
                let g = (y * 255 / height.max(1)) as u8;
                let b = ((x + y) as u64 / 2 % 256) as u8;
                data.extend_from_slice(&[r, g, b]);
            }
        }
        data
    }
}

impl CaptureDevice for TestPatternDevice {
    fn label(&self) -> &str {
        &self.config.label
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.config
            .report_dimensions
            .then_some((self.config.width, self.config.height))
    }

    fn grab_frame(&mut self) -> CaptureResult<CapturedFrame> {
        if self.released {
            return Err(CaptureError::Released);
        }
        if self.signal.is_ended() {
            return Err(CaptureError::DeviceLost);
        }

        let captured_at = Utc::now();
        let sequence = self.sequence;
        self.sequence += 1;

        let data = Bytes::from(self.render(sequence * 8));
        Ok(CapturedFrame::new(
            data,
            self.config.width,
            self.config.height,
            captured_at,
            sequence,
        ))
    }

    fn track_watcher(&self) -> TrackWatcher {
        self.signal.watcher()
    }

    fn is_active(&self) -> bool {
        !self.released && !self.signal.is_ended()
    }

    fn release(&mut self) {
        if !self.released {
            debug!(label = %self.config.label, "Test pattern released");
            self.released = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> TestPatternConfig {
        TestPatternConfig {
            width: 8,
            height: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_frames_are_valid_and_sequenced() {
        let provider = TestPatternProvider::new(small());
        let mut device = provider.acquire().await.unwrap();

        let before = Utc::now();
        let first = device.grab_frame().unwrap();
        let second = device.grab_frame().unwrap();

        assert!(first.is_valid());
        assert!(first.captured_at >= before);
        assert!(second.captured_at >= first.captured_at);
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_ne!(first.data, second.data);
        assert_eq!(provider.acquisitions(), 1);
    }

    #[tokio::test]
    async fn test_deny_next_refuses_then_recovers() {
        let provider = TestPatternProvider::new(small());
        provider.deny_next(1);

        assert!(matches!(
            provider.acquire().await,
            Err(CaptureError::PermissionDenied)
        ));
        assert!(provider.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_released_device_refuses_frames() {
        let provider = TestPatternProvider::new(small());
        let mut device = provider.acquire().await.unwrap();

        device.release();
        device.release();

        assert!(!device.is_active());
        assert!(matches!(device.grab_frame(), Err(CaptureError::Released)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_ends_after_configured_time() {
        let provider = TestPatternProvider::new(TestPatternConfig {
            end_after: Some(Duration::from_secs(3)),
            ..small()
        });
        let mut device = provider.acquire().await.unwrap();
        let watcher = device.track_watcher();

        assert!(watcher.ended().await);
        assert!(!device.is_active());
        assert!(matches!(device.grab_frame(), Err(CaptureError::DeviceLost)));
    }

    #[tokio::test]
    async fn test_hidden_dimensions() {
        let provider = TestPatternProvider::new(TestPatternConfig {
            report_dimensions: false,
            ..small()
        });
        let device = provider.acquire().await.unwrap();
        assert_eq!(device.dimensions(), None);
    }
}
