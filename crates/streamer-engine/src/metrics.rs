//! Session counters.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::debug;

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    /// Frames handed to the transport.
    pub frames_attempted: u64,

    /// Frames the service acknowledged.
    pub frames_sent: u64,

    /// Ticks dropped by the in-flight guard.
    pub frames_skipped: u64,

    /// Submissions that failed without invalidating the session.
    pub submit_failures: u64,

    /// Successful device re-acquisitions.
    pub reconnect_attempts: u32,

    /// Failed device re-acquisitions.
    pub reconnect_failures: u32,

    /// Detections summed over all acknowledgments.
    pub detections_total: u64,

    /// Seconds since the session went active.
    pub uptime_seconds: u64,
}

/// Collects counters for the current session.
#[derive(Default)]
pub struct MetricsCollector {
    start_time: RwLock<Option<Instant>>,
    frames_attempted: AtomicU64,
    frames_sent: AtomicU64,
    frames_skipped: AtomicU64,
    submit_failures: AtomicU64,
    reconnect_attempts: AtomicU32,
    reconnect_failures: AtomicU32,
    detections_total: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter and start the uptime clock.
    pub fn start(&self) {
        self.frames_attempted.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_skipped.store(0, Ordering::Relaxed);
        self.submit_failures.store(0, Ordering::Relaxed);
        self.reconnect_attempts.store(0, Ordering::Relaxed);
        self.reconnect_failures.store(0, Ordering::Relaxed);
        self.detections_total.store(0, Ordering::Relaxed);
        *self.start_time.write() = Some(Instant::now());
    }

    /// Stop the uptime clock. Counters keep their values.
    pub fn stop(&self) {
        *self.start_time.write() = None;
    }

    pub fn record_attempt(&self) {
        self.frames_attempted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acknowledged frame and its detections.
    pub fn record_ack(&self, detections: u32) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.detections_total
            .fetch_add(u64::from(detections), Ordering::Relaxed);
    }

    /// Record a skipped tick, returning the new total.
    pub fn record_skip(&self) -> u64 {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_submit_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful re-acquisition, returning the new total.
    pub fn record_reconnect(&self) -> u32 {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_reconnect_failure(&self) {
        self.reconnect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> SessionMetrics {
        let uptime_seconds = self
            .start_time
            .read()
            .map(|s| s.elapsed().as_secs())
            .unwrap_or(0);

        SessionMetrics {
            frames_attempted: self.frames_attempted.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
            detections_total: self.detections_total.load(Ordering::Relaxed),
            uptime_seconds,
        }
    }

    /// Log the counters at the end of a session.
    pub fn log_summary(&self) {
        let m = self.snapshot();
        debug!(
            "Session stats: attempted={}, sent={}, skipped={}, failed={}, reconnects={}, detections={}",
            m.frames_attempted,
            m.frames_sent,
            m.frames_skipped,
            m.submit_failures,
            m.reconnect_attempts,
            m.detections_total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.start();

        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_ack(3);
        metrics.record_ack(0);
        assert_eq!(metrics.record_skip(), 1);
        assert_eq!(metrics.record_skip(), 2);
        assert_eq!(metrics.record_reconnect(), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_attempted, 2);
        assert_eq!(snapshot.frames_sent, 2);
        assert_eq!(snapshot.frames_skipped, 2);
        assert_eq!(snapshot.detections_total, 3);
        assert_eq!(snapshot.reconnect_attempts, 1);
    }

    #[test]
    fn test_start_resets_counters() {
        let metrics = MetricsCollector::new();
        metrics.start();
        metrics.record_attempt();
        metrics.record_ack(5);
        metrics.record_submit_failure();
        metrics.record_reconnect_failure();

        metrics.start();
        assert_eq!(metrics.snapshot(), SessionMetrics::default());
    }

    #[test]
    fn test_uptime_is_zero_when_stopped() {
        let metrics = MetricsCollector::new();
        metrics.start();
        metrics.stop();
        assert_eq!(metrics.snapshot().uptime_seconds, 0);
    }
}
