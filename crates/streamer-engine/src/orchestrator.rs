//! Session controller: the state machine behind start/stop.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

use streamer_capture::{CaptureDevice, CaptureResult, DeviceProvider};
use streamer_encoder::{EncoderConfig, FrameEncoder};
use streamer_ipc::{
    CaptureTarget, ConnectionState, FrameAcknowledgment, SessionCommand, SessionEvent, SessionInfo,
    SessionSnapshot, StopReason, StreamConfig, COMMAND_CHANNEL_CAPACITY, MAX_FRAME_INTERVAL_SECS,
    MIN_FRAME_INTERVAL_SECS,
};
use streamer_transport::{FrameUpload, SessionTransport, TransportError, TransportResult};

use crate::capture_loop::CaptureLoop;
use crate::error::EngineError;
use crate::metrics::{MetricsCollector, SessionMetrics};
use crate::state::SessionResources;
use crate::supervisor::{ReconnectPolicy, ReconnectionSupervisor};
use crate::EngineResult;

/// Everything that can happen to a session besides a command.
///
/// Each variant carries the epoch of the session that scheduled it, so
/// anything resolving after that session ended is dropped.
pub(crate) enum Input<D> {
    /// The capture timer fired.
    Tick { epoch: u64, generation: u64 },

    /// The device's track ended.
    DeviceEnded { epoch: u64 },

    /// A frame submission resolved.
    SubmitFinished {
        epoch: u64,
        frame_number: u64,
        result: TransportResult<FrameAcknowledgment>,
    },

    /// The reconnect delay elapsed.
    ReconnectDue { epoch: u64 },

    /// A re-acquisition attempt resolved.
    ReconnectFinished {
        epoch: u64,
        result: CaptureResult<D>,
    },
}

type Reply = oneshot::Sender<EngineResult<ConnectionState>>;

pub(crate) struct Request {
    command: SessionCommand,
    reply: Reply,
}

/// Cloneable handle for driving a [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Request>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    metrics: Arc<MetricsCollector>,
}

impl SessionHandle {
    /// Acquire the device, create a session for `target`, and start capturing.
    ///
    /// Resolves with the resulting state: `Active` on success, `Error` if the
    /// device or session could not be obtained, or the current state if a
    /// session is already running.
    pub async fn start(&self, target: CaptureTarget) -> EngineResult<ConnectionState> {
        self.send(SessionCommand::Start { target }).await
    }

    /// Stop the session. Always ends in `Idle`.
    pub async fn stop(&self) -> EngineResult<ConnectionState> {
        self.send(SessionCommand::Stop).await
    }

    /// Change the capture interval without restarting.
    pub async fn set_frame_interval(&self, secs: u32) -> EngineResult<ConnectionState> {
        self.send(SessionCommand::SetFrameInterval(secs)).await
    }

    /// Stop the session and the controller task.
    pub async fn shutdown(&self) -> EngineResult<ConnectionState> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Send a raw command.
    pub async fn send(&self, command: SessionCommand) -> EngineResult<ConnectionState> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(Request { command, reply })
            .await
            .map_err(|_| EngineError::ControllerClosed)?;
        response.await.map_err(|_| EngineError::ControllerClosed)?
    }

    /// Current state and counters.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.snapshot.read().state.clone()
    }

    /// Detailed counters for the current (or last) session.
    pub fn metrics(&self) -> SessionMetrics {
        self.metrics.snapshot()
    }
}

/// Owns the device, the remote session, and every timer of one streaming
/// session, and serialises all events that touch them.
pub struct SessionController<P: DeviceProvider, T: SessionTransport> {
    provider: Arc<P>,
    transport: Arc<T>,
    config: StreamConfig,
    encoder: FrameEncoder,
    command_rx: mpsc::Receiver<Request>,
    inbox_tx: mpsc::UnboundedSender<Input<P::Device>>,
    inbox_rx: mpsc::UnboundedReceiver<Input<P::Device>>,
    event_tx: Sender<SessionEvent>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    metrics: Arc<MetricsCollector>,
    resources: SessionResources<P::Device>,
    capture: CaptureLoop,
    supervisor: ReconnectionSupervisor,
}

impl<P: DeviceProvider, T: SessionTransport> SessionController<P, T> {
    /// Create a controller and the handle that drives it.
    pub fn new(
        provider: Arc<P>,
        transport: Arc<T>,
        config: StreamConfig,
        event_tx: Sender<SessionEvent>,
    ) -> EngineResult<(Self, SessionHandle)> {
        validate_frame_interval(config.frame_interval_secs)?;
        let encoder = FrameEncoder::new(EncoderConfig {
            quality: config.jpeg_quality,
            fallback_width: config.fallback_width,
            fallback_height: config.fallback_height,
        })?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::default()));
        let metrics = Arc::new(MetricsCollector::new());

        let handle = SessionHandle {
            command_tx,
            snapshot: Arc::clone(&snapshot),
            metrics: Arc::clone(&metrics),
        };

        let controller = Self {
            provider,
            transport,
            supervisor: ReconnectionSupervisor::new(ReconnectPolicy::for_session(&config, None)),
            config,
            encoder,
            command_rx,
            inbox_tx,
            inbox_rx,
            event_tx,
            snapshot,
            metrics,
            resources: SessionResources::new(),
            capture: CaptureLoop::new(),
        };

        Ok((controller, handle))
    }

    /// Run the controller on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands and session events until shut down or every handle
    /// is dropped.
    #[instrument(name = "session_controller", skip(self))]
    pub async fn run(mut self) {
        info!("Session controller starting");

        loop {
            tokio::select! {
                biased;

                request = self.command_rx.recv() => match request {
                    Some(request) => {
                        if !self.handle_request(request).await {
                            break;
                        }
                    }
                    None => {
                        info!("All session handles dropped, tearing down");
                        self.abandon();
                        break;
                    }
                },
                Some(input) = self.inbox_rx.recv() => self.handle_input(input).await,
            }
        }

        self.send_event(SessionEvent::Shutdown);
        info!("Session controller stopped");
    }

    /// Handle a command. Returns false if the controller should exit.
    async fn handle_request(&mut self, request: Request) -> bool {
        let Request { command, reply } = request;
        debug!(command = command.name(), "Handling command");

        let (result, keep_running) = match command {
            SessionCommand::Start { target } => (Ok(self.start(target).await), true),
            SessionCommand::Stop => (Ok(self.stop(StopReason::UserRequested).await), true),
            SessionCommand::SetFrameInterval(secs) => (self.set_frame_interval(secs), true),
            SessionCommand::Shutdown => (Ok(self.stop(StopReason::UserRequested).await), false),
        };

        let _ = reply.send(result);
        keep_running
    }

    async fn handle_input(&mut self, input: Input<P::Device>) {
        match input {
            Input::Tick { epoch, generation } => self.on_tick(epoch, generation),
            Input::DeviceEnded { epoch } => self.on_device_ended(epoch),
            Input::SubmitFinished {
                epoch,
                frame_number,
                result,
            } => self.on_submit_finished(epoch, frame_number, result),
            Input::ReconnectDue { epoch } => self.on_reconnect_due(epoch),
            Input::ReconnectFinished { epoch, result } => {
                self.on_reconnect_finished(epoch, result).await
            }
        }
    }

    /// Start a session.
    #[instrument(name = "start_session", skip(self))]
    async fn start(&mut self, target: CaptureTarget) -> ConnectionState {
        // Idempotent: ignore if a session is already running
        {
            let snapshot = self.snapshot.read();
            if snapshot.state.is_running() {
                debug!(state = snapshot.state.name(), "Session already running, ignoring start");
                return snapshot.state.clone();
            }
        }

        info!("Starting session");
        let epoch = self.resources.begin();
        self.capture.reset();
        self.supervisor.reset();
        self.metrics.start();
        self.update(|s| {
            s.session = None;
            s.last_ack = None;
            s.error = None;
        });
        self.publish_counters();
        self.transition_to(ConnectionState::Starting);

        if let Err(e) = target.validate() {
            return self.fail_start(format!("Invalid capture target: {e}"));
        }

        let device = match self.provider.acquire().await {
            Ok(device) => device,
            Err(e) => return self.fail_start(format!("Camera unavailable: {e}")),
        };
        self.attach_device(device, epoch);

        let session = match self
            .transport
            .create_session(&target, self.config.frame_interval_secs)
            .await
        {
            Ok(session) => session,
            Err(e) => return self.fail_start(format!("Failed to create stream session: {e}")),
        };

        info!(
            session_id = %session.session_id,
            upload_id = session.upload_id,
            "Stream session created"
        );
        self.supervisor
            .set_policy(ReconnectPolicy::for_session(&self.config, Some(&session)));
        self.resources.set_session(session.clone());
        self.update(|s| s.session = Some(session.clone()));
        self.send_event(SessionEvent::SessionCreated(session));

        self.transition_to(ConnectionState::Active);
        self.capture.arm(
            frame_interval(self.config.frame_interval_secs),
            epoch,
            self.inbox_tx.clone(),
        );

        self.state()
    }

    fn fail_start(&mut self, message: String) -> ConnectionState {
        error!("Session start failed: {}", message);

        self.teardown();
        self.metrics.stop();
        self.update(|s| {
            s.session = None;
            s.error = Some(message.clone());
        });
        self.send_event(SessionEvent::Error {
            recoverable: false,
            message: message.clone(),
        });
        self.transition_to(ConnectionState::Error { message });

        self.state()
    }

    /// Stop the session.
    #[instrument(name = "stop_session", skip(self))]
    async fn stop(&mut self, reason: StopReason) -> ConnectionState {
        // Idempotent: ignore if already idle with nothing held
        if self.state().is_idle() && self.resources.is_empty() {
            debug!("Already idle, ignoring stop");
            return ConnectionState::Idle;
        }

        info!(?reason, "Stopping session");

        // Nothing scheduled before this point may act once the device is gone.
        let session = self.teardown();
        self.update(|s| {
            s.session = None;
            s.error = None;
        });
        self.transition_to(ConnectionState::Stopping {
            reason: reason.clone(),
        });

        if let Some(session) = session {
            match self.transport.stop_session(&session.session_id).await {
                Ok(summary) => {
                    info!(
                        session_id = %summary.session_id,
                        frames_received = summary.frames_received,
                        detections = summary.detections_count,
                        "Stream session stopped"
                    );
                    self.send_event(SessionEvent::SessionStopped(summary));
                }
                Err(e) if e.is_not_found() => {
                    info!(session_id = %session.session_id, "Session already gone on the server");
                }
                Err(e) => {
                    self.surface_error(format!("Failed to stop stream session: {e}"), false);
                }
            }
        }

        self.finish_session();
        self.transition_to(ConnectionState::Idle);
        info!("Session stopped");
        ConnectionState::Idle
    }

    fn set_frame_interval(&mut self, secs: u32) -> EngineResult<ConnectionState> {
        validate_frame_interval(secs)?;

        self.config.frame_interval_secs = secs;
        let state = self.state();
        if state.is_active() || state.is_reconnecting() {
            info!(secs, "Frame interval changed, re-arming capture");
            self.capture
                .arm(frame_interval(secs), self.resources.epoch(), self.inbox_tx.clone());
        } else {
            debug!(secs, "Frame interval set for the next session");
        }

        Ok(state)
    }

    fn on_tick(&mut self, epoch: u64, generation: u64) {
        if !self.resources.is_current(epoch) || !self.capture.is_current(generation) {
            trace!(epoch, generation, "Stale tick dropped");
            return;
        }

        if self.capture.in_flight() {
            let total_skipped = self.metrics.record_skip();
            self.publish_counters();
            debug!(total_skipped, "Submission still in flight, skipping tick");
            self.send_event(SessionEvent::TickSkipped { total_skipped });
            return;
        }

        let Some(session_id) = self.resources.session().map(|s| s.session_id.clone()) else {
            return;
        };
        let Some(device) = self.resources.device_mut().filter(|d| d.is_active()) else {
            trace!("No live capture device, skipping tick");
            return;
        };

        let encoded = match self.encoder.encode(device) {
            Ok(encoded) => encoded,
            Err(e) if e.is_capture() => {
                debug!("No frame available: {}", e);
                return;
            }
            Err(e) => {
                self.surface_error(format!("Frame encoding failed: {e}"), true);
                return;
            }
        };

        let frame_number = self.capture.next_frame_number();
        self.metrics.record_attempt();

        let upload = FrameUpload {
            data: encoded.data,
            content_type: encoded.content_type,
            frame_number,
            captured_at: encoded.captured_at,
        };

        let transport = Arc::clone(&self.transport);
        let inbox = self.inbox_tx.clone();
        let cancel = self.resources.cancel_flag();
        let span = tracing::debug_span!("submit_frame", %session_id, frame_number);

        let task = tokio::spawn(
            async move {
                if cancel.is_cancelled() {
                    return;
                }
                let result = transport.submit_frame(&session_id, upload).await;
                let _ = inbox.send(Input::SubmitFinished {
                    epoch,
                    frame_number,
                    result,
                });
            }
            .instrument(span),
        );
        self.capture.begin_submission(frame_number, task);
    }

    fn on_submit_finished(
        &mut self,
        epoch: u64,
        frame_number: u64,
        result: TransportResult<FrameAcknowledgment>,
    ) {
        if !self.resources.is_current(epoch) {
            debug!(frame_number, "Submission resolved after its session ended");
            return;
        }
        self.capture.finish_submission(frame_number);

        match result {
            Ok(ack) => self.on_ack(ack),
            Err(e) if e.is_session_invalidated() => self.invalidate_session(frame_number, &e),
            Err(e) => {
                self.metrics.record_submit_failure();
                self.surface_error(format!("Frame {frame_number} upload failed: {e}"), true);
            }
        }
    }

    fn on_ack(&mut self, ack: FrameAcknowledgment) {
        let current = self.resources.session().map(|s| s.session_id.as_str());
        if current != Some(ack.session_id.as_str()) {
            warn!(
                session_id = %ack.session_id,
                frame_number = ack.frame_number,
                "Acknowledgment for another session dropped"
            );
            return;
        }

        debug!(
            frame_number = ack.frame_number,
            detections = ack.detections_count,
            alert_level = ?ack.alert_level,
            "Frame acknowledged"
        );
        self.metrics.record_ack(ack.detections_count);
        self.update(|s| s.last_ack = Some(ack.clone()));
        self.publish_counters();
        self.send_event(SessionEvent::FrameAcknowledged(ack));
    }

    /// The server dropped the session: tear down locally without calling stop.
    fn invalidate_session(&mut self, frame_number: u64, cause: &TransportError) {
        let reason = StopReason::SessionInvalidated {
            status: cause.status_code().unwrap_or_default(),
        };
        warn!(frame_number, "Session invalidated by the server: {}", cause);

        self.teardown();
        self.update(|s| s.session = None);
        self.transition_to(ConnectionState::Stopping {
            reason: reason.clone(),
        });

        let message = reason.message();
        self.update(|s| s.error = Some(message.clone()));
        self.send_event(SessionEvent::Error {
            recoverable: false,
            message,
        });

        self.finish_session();
        self.transition_to(ConnectionState::Idle);
    }

    fn on_device_ended(&mut self, epoch: u64) {
        if !self.resources.is_current(epoch) || !self.state().is_active() {
            return;
        }

        warn!("Capture track ended, reconnecting");
        self.resources.release_device();
        self.transition_to(ConnectionState::Reconnecting {
            attempt: self.supervisor.next_attempt(),
        });
        self.supervisor.schedule(epoch, self.inbox_tx.clone());
    }

    fn on_reconnect_due(&mut self, epoch: u64) {
        if !self.resources.is_current(epoch) || !self.state().is_reconnecting() {
            return;
        }

        self.supervisor.attempt(
            Arc::clone(&self.provider),
            epoch,
            self.resources.cancel_flag(),
            self.inbox_tx.clone(),
        );
    }

    #[instrument(name = "reconnect_finished", skip(self, result))]
    async fn on_reconnect_finished(&mut self, epoch: u64, result: CaptureResult<P::Device>) {
        if !self.resources.is_current(epoch) || !self.state().is_reconnecting() {
            if let Ok(mut device) = result {
                debug!("Device re-acquired after its session ended, releasing");
                device.release();
            }
            return;
        }

        match result {
            Ok(device) => {
                self.supervisor.record_success();
                self.attach_device(device, epoch);
                let reconnect_attempts = self.metrics.record_reconnect();
                self.update(|s| s.error = None);
                self.publish_counters();

                info!(reconnect_attempts, "Capture device re-acquired");
                self.transition_to(ConnectionState::Active);
                self.send_event(SessionEvent::Reconnected { reconnect_attempts });
            }
            Err(e) => {
                let failures = self.supervisor.record_failure();
                self.metrics.record_reconnect_failure();

                if self.supervisor.should_retry() {
                    self.surface_error(format!("Camera reconnect attempt {failures} failed: {e}"), true);
                    self.transition_to(ConnectionState::Reconnecting {
                        attempt: self.supervisor.next_attempt(),
                    });
                    self.supervisor.schedule(epoch, self.inbox_tx.clone());
                } else {
                    self.give_up_reconnecting(failures).await;
                }
            }
        }
    }

    /// The reconnect cap was reached: stop the remote session and park in `Error`.
    async fn give_up_reconnecting(&mut self, attempts: u32) {
        let reason = StopReason::ReconnectExhausted { attempts };
        error!(attempts, "Giving up on reconnecting the capture device");

        let session = self.teardown();
        self.update(|s| s.session = None);
        self.transition_to(ConnectionState::Stopping {
            reason: reason.clone(),
        });

        if let Some(session) = session {
            match self.transport.stop_session(&session.session_id).await {
                Ok(summary) => self.send_event(SessionEvent::SessionStopped(summary)),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!("Failed to stop stream session: {}", e),
            }
        }

        let message = reason.message();
        self.finish_session();
        self.update(|s| s.error = Some(message.clone()));
        self.send_event(SessionEvent::Error {
            recoverable: false,
            message: message.clone(),
        });
        self.transition_to(ConnectionState::Error { message });
    }

    /// Local-only teardown for when nobody is left to drive the controller.
    fn abandon(&mut self) {
        let session = self.teardown();
        if self.state().is_idle() {
            return;
        }

        if let Some(session) = session {
            warn!(session_id = %session.session_id, "Abandoning stream session without stopping it");
        }
        self.transition_to(ConnectionState::Stopping {
            reason: StopReason::Teardown,
        });
        self.finish_session();
        self.transition_to(ConnectionState::Idle);
    }

    fn attach_device(&mut self, device: P::Device, epoch: u64) {
        let watcher = device.track_watcher();
        let inbox = self.inbox_tx.clone();
        let task = tokio::spawn(async move {
            if watcher.ended().await {
                let _ = inbox.send(Input::DeviceEnded { epoch });
            }
        });
        self.resources.install_device(device, task);
    }

    /// Synchronous cancellation shared by every exit path: timers, pending
    /// reconnects, and the device are gone when this returns.
    fn teardown(&mut self) -> Option<SessionInfo> {
        self.capture.cancel();
        self.supervisor.cancel();
        self.resources.teardown()
    }

    fn finish_session(&mut self) {
        self.metrics.stop();
        self.metrics.log_summary();
    }

    fn surface_error(&self, message: String, recoverable: bool) {
        warn!("{}", message);
        self.update(|s| s.error = Some(message.clone()));
        self.send_event(SessionEvent::Error {
            recoverable,
            message,
        });
    }

    fn state(&self) -> ConnectionState {
        self.snapshot.read().state.clone()
    }

    fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        f(&mut self.snapshot.write());
    }

    fn publish_counters(&self) {
        let metrics = self.metrics.snapshot();
        self.update(|s| {
            s.frames_sent = metrics.frames_sent;
            s.frames_skipped = metrics.frames_skipped;
            s.reconnect_attempts = metrics.reconnect_attempts;
            s.detections_total = metrics.detections_total;
        });
    }

    fn transition_to(&self, new_state: ConnectionState) {
        let previous = {
            let mut snapshot = self.snapshot.write();
            std::mem::replace(&mut snapshot.state, new_state.clone())
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(SessionEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl<P: DeviceProvider, T: SessionTransport> Drop for SessionController<P, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn validate_frame_interval(secs: u32) -> EngineResult<()> {
    if StreamConfig::is_valid_frame_interval(secs) {
        Ok(())
    } else {
        Err(EngineError::InvalidFrameInterval {
            secs,
            min: MIN_FRAME_INTERVAL_SECS,
            max: MAX_FRAME_INTERVAL_SECS,
        })
    }
}

fn frame_interval(secs: u32) -> Duration {
    Duration::from_secs(u64::from(secs))
}
