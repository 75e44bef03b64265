//! Capture pacing: the repeating timer, frame numbering, and the in-flight guard.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::orchestrator::Input;

/// Owns the capture timer and the single outstanding submission of a session.
pub(crate) struct CaptureLoop {
    timer: Option<JoinHandle<()>>,
    generation: u64,
    in_flight: Option<(u64, JoinHandle<()>)>,
    next_frame: u64,
}

impl CaptureLoop {
    pub(crate) fn new() -> Self {
        Self {
            timer: None,
            generation: 0,
            in_flight: None,
            next_frame: 0,
        }
    }

    /// Start numbering from zero for a brand-new session.
    pub(crate) fn reset(&mut self) {
        self.cancel();
        self.next_frame = 0;
    }

    /// Replace any running timer with one ticking every `interval`.
    ///
    /// The first tick fires immediately.
    pub(crate) fn arm<D: Send + 'static>(
        &mut self,
        interval: Duration,
        epoch: u64,
        inbox: UnboundedSender<Input<D>>,
    ) {
        self.stop_timer();
        self.generation += 1;

        let generation = self.generation;
        debug!(interval_ms = interval.as_millis() as u64, generation, "Capture timer armed");

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if inbox.send(Input::Tick { epoch, generation }).is_err() {
                    break;
                }
            }
        }));
    }

    /// Returns true if a tick from timer `generation` is still wanted.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.timer.is_some() && generation == self.generation
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub(crate) fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Claim the next frame number. Numbers are never reused within a session.
    pub(crate) fn next_frame_number(&mut self) -> u64 {
        let number = self.next_frame;
        self.next_frame += 1;
        number
    }

    pub(crate) fn begin_submission(&mut self, frame_number: u64, task: JoinHandle<()>) {
        self.in_flight = Some((frame_number, task));
    }

    /// Release the guard if `frame_number` is the outstanding submission.
    pub(crate) fn finish_submission(&mut self, frame_number: u64) -> bool {
        match &self.in_flight {
            Some((outstanding, _)) if *outstanding == frame_number => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    /// Abort the timer and any outstanding submission.
    pub(crate) fn cancel(&mut self) {
        self.stop_timer();
        if let Some((frame_number, task)) = self.in_flight.take() {
            debug!(frame_number, "Abandoning in-flight submission");
            task.abort();
        }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.cancel();
    }
}
