//! Device re-acquisition after an unexpected track end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

use streamer_capture::DeviceProvider;
use streamer_ipc::{SessionInfo, StreamConfig};

use crate::orchestrator::Input;
use crate::state::CancelFlag;

/// Default delay before each re-acquisition attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Reconnection policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Fixed delay before every attempt.
    pub delay: Duration,

    /// Failed attempts tolerated per outage. `None` retries until stopped.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Build the policy for a session.
    ///
    /// The server-advised interval only applies when the config opts in and
    /// the server advised a non-zero value.
    pub fn for_session(config: &StreamConfig, session: Option<&SessionInfo>) -> Self {
        let server_secs = session
            .filter(|_| config.use_server_reconnect_interval)
            .map(|s| s.reconnect_interval_secs)
            .filter(|&secs| secs > 0);

        Self {
            delay: Duration::from_secs(server_secs.unwrap_or(config.reconnect_delay_secs)),
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Delay before the given attempt. The backoff is fixed.
    pub fn delay_for_attempt(&self, _attempt: u32) -> Duration {
        self.delay
    }

    /// Check if another attempt is allowed after `failures` failed ones.
    pub fn should_retry(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// Drives re-acquisition for the controller: one delay timer or one
/// acquisition in flight at a time.
pub(crate) struct ReconnectionSupervisor {
    policy: ReconnectPolicy,
    failures: u32,
    timer: Option<JoinHandle<()>>,
    attempt: Option<JoinHandle<()>>,
}

impl ReconnectionSupervisor {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            timer: None,
            attempt: None,
        }
    }

    pub(crate) fn set_policy(&mut self, policy: ReconnectPolicy) {
        self.policy = policy;
    }

    /// Failed attempts in the current outage.
    #[cfg(test)]
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }

    /// Number of the next attempt in the current outage (1-based).
    pub(crate) fn next_attempt(&self) -> u32 {
        self.failures + 1
    }

    /// Arm the delay timer for the next attempt.
    pub(crate) fn schedule<D: Send + 'static>(&mut self, epoch: u64, inbox: UnboundedSender<Input<D>>) {
        self.cancel();

        let attempt = self.next_attempt();
        let delay = self.policy.delay_for_attempt(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbox.send(Input::ReconnectDue { epoch });
        }));
    }

    /// Request a device from `provider` unless the session was stopped first.
    pub(crate) fn attempt<P: DeviceProvider>(
        &mut self,
        provider: Arc<P>,
        epoch: u64,
        cancel: CancelFlag,
        inbox: UnboundedSender<Input<P::Device>>,
    ) {
        self.timer = None;
        let attempt = self.next_attempt();
        info!(attempt, "Attempting to re-acquire capture device");

        let span = tracing::info_span!("reconnect_attempt", attempt);
        self.attempt = Some(tokio::spawn(
            async move {
                if cancel.is_cancelled() {
                    debug!("Session stopped before reconnect, skipping");
                    return;
                }
                let result = provider.acquire().await;
                let _ = inbox.send(Input::ReconnectFinished { epoch, result });
            }
            .instrument(span),
        ));
    }

    /// Record a failed attempt and return the failure count.
    pub(crate) fn record_failure(&mut self) -> u32 {
        self.attempt = None;
        self.failures += 1;
        self.failures
    }

    /// The device is back; the outage is over.
    pub(crate) fn record_success(&mut self) {
        self.attempt = None;
        self.failures = 0;
    }

    pub(crate) fn should_retry(&self) -> bool {
        self.policy.should_retry(self.failures)
    }

    /// Abort any pending delay or acquisition and forget the outage.
    pub(crate) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if let Some(attempt) = self.attempt.take() {
            attempt.abort();
        }
    }

    pub(crate) fn reset(&mut self) {
        self.cancel();
        self.failures = 0;
    }
}

impl Drop for ReconnectionSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use streamer_ipc::SessionStatus;

    use super::*;

    fn session(reconnect_interval_secs: u64) -> SessionInfo {
        SessionInfo {
            session_id: "s".into(),
            upload_id: 1,
            status: SessionStatus::Active,
            frame_interval_secs: 5,
            started_at: Utc::now(),
            reconnect_interval_secs,
        }
    }

    #[test]
    fn test_reconnect_policy_delays() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_reconnect_policy_should_retry() {
        let unbounded = ReconnectPolicy::default();
        assert!(unbounded.should_retry(0));
        assert!(unbounded.should_retry(u32::MAX));

        let capped = ReconnectPolicy {
            max_attempts: Some(3),
            ..Default::default()
        };
        assert!(capped.should_retry(2));
        assert!(!capped.should_retry(3));
    }

    #[test]
    fn test_server_interval_requires_opt_in() {
        let config = StreamConfig {
            reconnect_delay_secs: 7,
            ..Default::default()
        };
        let advised = session(30);

        let policy = ReconnectPolicy::for_session(&config, Some(&advised));
        assert_eq!(policy.delay, Duration::from_secs(7));

        let config = StreamConfig {
            use_server_reconnect_interval: true,
            ..config
        };
        let policy = ReconnectPolicy::for_session(&config, Some(&advised));
        assert_eq!(policy.delay, Duration::from_secs(30));

        let policy = ReconnectPolicy::for_session(&config, Some(&session(0)));
        assert_eq!(policy.delay, Duration::from_secs(7));
    }

    #[test]
    fn test_failures_reset_on_success() {
        let mut supervisor = ReconnectionSupervisor::new(ReconnectPolicy {
            max_attempts: Some(2),
            ..Default::default()
        });

        assert_eq!(supervisor.next_attempt(), 1);
        assert_eq!(supervisor.record_failure(), 1);
        assert!(supervisor.should_retry());
        assert_eq!(supervisor.record_failure(), 2);
        assert!(!supervisor.should_retry());

        supervisor.record_success();
        assert_eq!(supervisor.failures(), 0);
        assert!(supervisor.should_retry());
    }
}
