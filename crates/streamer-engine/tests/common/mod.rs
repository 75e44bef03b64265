//! In-memory device and transport doubles for controller tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use streamer_capture::{
    CaptureDevice, CaptureError, CaptureResult, CapturedFrame, DeviceProvider, TrackSignal,
    TrackWatcher,
};
use streamer_engine::{create_controller, SessionHandle};
use streamer_ipc::{
    CaptureTarget, FrameAcknowledgment, SessionEvent, SessionInfo, SessionStatus, SessionSummary,
    StreamConfig,
};
use streamer_transport::{FrameUpload, SessionTransport, TransportError, TransportResult};

const FRAME_WIDTH: u32 = 4;
const FRAME_HEIGHT: u32 = 4;

/// Capture time the mock device stamps on its `sequence`-th frame.
pub fn capture_time(sequence: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + sequence as i64, 0).unwrap()
}

/// Let spawned tasks and the controller drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn location() -> CaptureTarget {
    CaptureTarget::Location {
        latitude: 35.6812,
        longitude: 139.7671,
    }
}

fn status_error(status: u16) -> TransportError {
    match status {
        404 => TransportError::NotFound("Stream session not found".into()),
        409 => TransportError::Conflict("Stream session already stopped".into()),
        status => TransportError::Status {
            status,
            message: "backend unavailable".into(),
        },
    }
}

/// Device whose track can be ended from the test.
pub struct MockDevice {
    signal: TrackSignal,
    released: Arc<AtomicUsize>,
    corrupt_remaining: Arc<AtomicU32>,
    is_released: bool,
    sequence: u64,
}

impl CaptureDevice for MockDevice {
    fn label(&self) -> &str {
        "mock-camera"
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((FRAME_WIDTH, FRAME_HEIGHT))
    }

    fn grab_frame(&mut self) -> CaptureResult<CapturedFrame> {
        if self.is_released {
            return Err(CaptureError::Released);
        }
        if self.signal.is_ended() {
            return Err(CaptureError::DeviceLost);
        }
        self.sequence += 1;

        let mut size = CapturedFrame::rgb24_buffer_size(FRAME_WIDTH, FRAME_HEIGHT);
        let corrupt = self
            .corrupt_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if corrupt {
            size /= 2;
        }

        Ok(CapturedFrame::new(
            Bytes::from(vec![128u8; size]),
            FRAME_WIDTH,
            FRAME_HEIGHT,
            capture_time(self.sequence),
            self.sequence,
        ))
    }

    fn track_watcher(&self) -> TrackWatcher {
        self.signal.watcher()
    }

    fn is_active(&self) -> bool {
        !self.is_released && !self.signal.is_ended()
    }

    fn release(&mut self) {
        if !self.is_released {
            self.is_released = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Provider that records acquisitions and can refuse or delay them.
#[derive(Default)]
pub struct MockDeviceProvider {
    acquisitions: AtomicUsize,
    released: Arc<AtomicUsize>,
    corrupt_remaining: Arc<AtomicU32>,
    fail_remaining: AtomicU32,
    acquire_delay: Mutex<Option<Duration>>,
    signals: Mutex<Vec<TrackSignal>>,
}

impl MockDeviceProvider {
    /// Refuse the next `count` acquisitions.
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Hand out truncated buffers for the next `count` frames.
    pub fn corrupt_next_frames(&self, count: u32) {
        self.corrupt_remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_acquire_delay(&self, delay: Duration) {
        *self.acquire_delay.lock() = Some(delay);
    }

    /// End the track of the most recently acquired device.
    pub fn end_track(&self) {
        if let Some(signal) = self.signals.lock().last() {
            signal.end();
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Devices handed out and not yet released.
    pub fn live_devices(&self) -> usize {
        self.acquisitions() - self.released()
    }
}

impl DeviceProvider for MockDeviceProvider {
    type Device = MockDevice;

    async fn acquire(&self) -> CaptureResult<MockDevice> {
        let delay = *self.acquire_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let denied = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if denied {
            return Err(CaptureError::PermissionDenied);
        }

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let signal = TrackSignal::new();
        self.signals.lock().push(signal.clone());

        Ok(MockDevice {
            signal,
            released: Arc::clone(&self.released),
            corrupt_remaining: Arc::clone(&self.corrupt_remaining),
            is_released: false,
            sequence: 0,
        })
    }
}

/// Scripted outcome of one frame submission.
#[derive(Debug, Clone, Copy)]
pub enum SubmitOutcome {
    Ack { detections: u32 },
    AckFor { session_id: &'static str },
    Fail { status: u16 },
}

/// Transport that records every call and answers from a script.
pub struct MockTransport {
    reconnect_interval_secs: u64,
    sessions_created: AtomicUsize,
    creates: Mutex<Vec<(CaptureTarget, u32)>>,
    submits: Mutex<Vec<(String, u64)>>,
    captured: Mutex<Vec<DateTime<Utc>>>,
    stops: Mutex<Vec<String>>,
    create_failure: Mutex<Option<u16>>,
    submit_script: Mutex<VecDeque<SubmitOutcome>>,
    submit_delay: Mutex<Option<Duration>>,
    stop_failure: Mutex<Option<u16>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::with_reconnect_interval(5)
    }
}

impl MockTransport {
    pub fn with_reconnect_interval(reconnect_interval_secs: u64) -> Self {
        Self {
            reconnect_interval_secs,
            sessions_created: AtomicUsize::new(0),
            creates: Mutex::new(Vec::new()),
            submits: Mutex::new(Vec::new()),
            captured: Mutex::new(Vec::new()),
            stops: Mutex::new(Vec::new()),
            create_failure: Mutex::new(None),
            submit_script: Mutex::new(VecDeque::new()),
            submit_delay: Mutex::new(None),
            stop_failure: Mutex::new(None),
        }
    }

    pub fn fail_create(&self, status: u16) {
        *self.create_failure.lock() = Some(status);
    }

    /// Outcomes for the next submissions; later ones are acknowledged.
    pub fn script_submits(&self, outcomes: impl IntoIterator<Item = SubmitOutcome>) {
        self.submit_script.lock().extend(outcomes);
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock() = Some(delay);
    }

    pub fn fail_stop(&self, status: u16) {
        *self.stop_failure.lock() = Some(status);
    }

    pub fn creates(&self) -> Vec<(CaptureTarget, u32)> {
        self.creates.lock().clone()
    }

    pub fn submits(&self) -> Vec<(String, u64)> {
        self.submits.lock().clone()
    }

    pub fn frame_numbers(&self) -> Vec<u64> {
        self.submits.lock().iter().map(|(_, n)| *n).collect()
    }

    /// `captured_at` of every upload, in submission order.
    pub fn capture_times(&self) -> Vec<DateTime<Utc>> {
        self.captured.lock().clone()
    }

    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().clone()
    }

    fn summary(&self, session_id: &str) -> SessionSummary {
        let received = self
            .submits
            .lock()
            .iter()
            .filter(|(id, _)| id == session_id)
            .count() as u64;
        SessionSummary {
            session_id: session_id.to_string(),
            upload_id: 1,
            status: SessionStatus::Stopped,
            frame_interval_secs: 5,
            started_at: Utc::now(),
            last_frame_at: None,
            stopped_at: Some(Utc::now()),
            frames_received: received,
            frames_processed: received,
            detections_count: 0,
            reconnect_attempts: 0,
        }
    }
}

impl SessionTransport for MockTransport {
    async fn create_session(
        &self,
        target: &CaptureTarget,
        frame_interval_secs: u32,
    ) -> TransportResult<SessionInfo> {
        self.creates.lock().push((*target, frame_interval_secs));
        if let Some(status) = *self.create_failure.lock() {
            return Err(status_error(status));
        }

        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionInfo {
            session_id: format!("session-{n}"),
            upload_id: n as u64,
            status: SessionStatus::Active,
            frame_interval_secs,
            started_at: Utc::now(),
            reconnect_interval_secs: self.reconnect_interval_secs,
        })
    }

    async fn submit_frame(
        &self,
        session_id: &str,
        frame: FrameUpload,
    ) -> TransportResult<FrameAcknowledgment> {
        self.submits
            .lock()
            .push((session_id.to_string(), frame.frame_number));
        self.captured.lock().push(frame.captured_at);
        let outcome = self.submit_script.lock().pop_front();
        let delay = *self.submit_delay.lock();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let ack = |session_id: &str, detections_count: u32| FrameAcknowledgment {
            session_id: session_id.to_string(),
            upload_id: 1,
            frame_number: frame.frame_number,
            detections_count,
            alert_level: None,
            processed_at: Utc::now(),
        };

        match outcome.unwrap_or(SubmitOutcome::Ack { detections: 1 }) {
            SubmitOutcome::Ack { detections } => Ok(ack(session_id, detections)),
            SubmitOutcome::AckFor { session_id } => Ok(ack(session_id, 1)),
            SubmitOutcome::Fail { status } => Err(status_error(status)),
        }
    }

    async fn stop_session(&self, session_id: &str) -> TransportResult<SessionSummary> {
        self.stops.lock().push(session_id.to_string());
        if let Some(status) = *self.stop_failure.lock() {
            return Err(status_error(status));
        }
        Ok(self.summary(session_id))
    }

    async fn fetch_status(&self, session_id: &str) -> TransportResult<SessionSummary> {
        Ok(self.summary(session_id))
    }
}

/// A running controller plus the doubles behind it.
pub struct Harness {
    pub handle: SessionHandle,
    pub provider: Arc<MockDeviceProvider>,
    pub transport: Arc<MockTransport>,
    pub events: Receiver<SessionEvent>,
    pub task: JoinHandle<()>,
}

impl Harness {
    pub fn new(config: StreamConfig) -> Self {
        Self::with_transport(config, MockTransport::default())
    }

    pub fn with_transport(config: StreamConfig, transport: MockTransport) -> Self {
        let provider = Arc::new(MockDeviceProvider::default());
        let transport = Arc::new(transport);
        let (event_tx, events) = streamer_ipc::event_channel();

        let (controller, handle) = create_controller(
            Arc::clone(&provider),
            Arc::clone(&transport),
            config,
            event_tx,
        )
        .unwrap();

        Self {
            handle,
            provider,
            transport,
            events,
            task: controller.spawn(),
        }
    }

    /// Everything published since the last call.
    pub fn drain_events(&self) -> Vec<SessionEvent> {
        self.events.try_iter().collect()
    }
}
