//! Console commands read from stdin in interactive mode.

use tracing::{debug, instrument};

use streamer_engine::{EngineError, SessionHandle};
use streamer_ipc::CaptureTarget;

/// A command typed at the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Interval(u32),
    Status,
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (Some("start"), None) => Self::Start,
            (Some("stop"), None) => Self::Stop,
            (Some("status"), None) => Self::Status,
            (Some("quit" | "exit"), None) => Self::Quit,
            (Some("interval"), Some(secs)) => Self::Interval(
                secs.parse()
                    .map_err(|_| format!("Not a number of seconds: {secs}"))?,
            ),
            _ => {
                return Err(format!(
                    "Unknown command {:?}; try start, stop, interval <secs>, status, quit",
                    line.trim()
                ))
            }
        };

        if words.next().is_some() {
            return Err(format!("Unexpected arguments in {:?}", line.trim()));
        }
        Ok(command)
    }

    /// Run the command. Returns false when the console should exit.
    #[instrument(skip(handle))]
    pub async fn execute(self, handle: &SessionHandle, target: CaptureTarget) -> anyhow::Result<bool> {
        debug!("console command");

        match self {
            Self::Start => {
                let state = handle.start(target).await?;
                println!("state: {}", state.name());
            }
            Self::Stop => {
                let state = handle.stop().await?;
                println!("state: {}", state.name());
            }
            Self::Interval(secs) => match handle.set_frame_interval(secs).await {
                Ok(_) => println!("frame interval: {secs}s"),
                Err(e @ EngineError::InvalidFrameInterval { .. }) => eprintln!("{e}"),
                Err(e) => return Err(e.into()),
            },
            Self::Status => {
                let snapshot = handle.snapshot();
                println!(
                    "state: {}, session: {}, frames sent: {}, skipped: {}, reconnects: {}, detections: {}",
                    snapshot.state.name(),
                    snapshot
                        .session
                        .as_ref()
                        .map_or("none", |s| s.session_id.as_str()),
                    snapshot.frames_sent,
                    snapshot.frames_skipped,
                    snapshot.reconnect_attempts,
                    snapshot.detections_total
                );
                if let Some(error) = snapshot.error {
                    println!("last error: {error}");
                }
            }
            Self::Quit => return Ok(false),
        }

        Ok(true)
    }
}
