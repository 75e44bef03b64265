//! Streamer command-line application library.

mod commands;

pub use commands::ConsoleCommand;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamer_capture::{TestPatternConfig, TestPatternProvider};
use streamer_engine::{create_controller, SessionHandle};
use streamer_ipc::{event_channel, CaptureTarget, ConnectionState, SessionEvent, SessionSummary, StreamConfig};
use streamer_transport::{HttpTransport, SessionTransport, TransportConfig};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "streamer", version, about = "Stream camera frames to the detection service")]
pub struct Args {
    /// JSON config file with `stream` and `transport` sections.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Detection service base URL.
    #[arg(long, env = "STREAMER_BASE_URL")]
    pub base_url: Option<String>,

    /// Bearer token sent to the service.
    #[arg(long, env = "STREAMER_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Registered camera to attribute detections to.
    #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
    pub camera_id: Option<u64>,

    /// Latitude to attribute detections to.
    #[arg(long, allow_hyphen_values = true, requires = "longitude")]
    pub latitude: Option<f64>,

    /// Longitude to attribute detections to.
    #[arg(long, allow_hyphen_values = true, requires = "latitude")]
    pub longitude: Option<f64>,

    /// Seconds between frames (1-60).
    #[arg(short, long)]
    pub interval: Option<u32>,

    /// Stop after this many seconds.
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// End the synthetic camera track this many seconds after each acquisition.
    #[arg(long)]
    pub end_track_after: Option<u64>,

    /// Synthetic frame width.
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Synthetic frame height.
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Read commands (start, stop, interval N, status, quit) from stdin.
    #[arg(long)]
    pub interactive: bool,
}

impl Args {
    /// The capture target named on the command line.
    pub fn target(&self) -> anyhow::Result<CaptureTarget> {
        CaptureTarget::from_parts(self.camera_id, self.latitude, self.longitude)
            .context("Invalid capture target")
    }
}

/// Settings file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub stream: StreamConfig,
    pub transport: TransportConfig,
}

impl CliConfig {
    /// Read a JSON settings file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Let command-line flags override the file.
    pub fn apply(&mut self, args: &Args) {
        if let Some(base_url) = &args.base_url {
            self.transport.base_url = base_url.clone();
        }
        if let Some(token) = &args.token {
            self.transport.auth_token = Some(token.clone());
        }
        if let Some(interval) = args.interval {
            self.stream.frame_interval_secs = interval;
        }
    }
}

/// Initialize logging.
fn init_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "streamer=debug,streamer_cli=debug,streamer_engine=debug,streamer_capture=debug,streamer_encoder=debug,streamer_transport=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run one streaming session until Ctrl-C, `--duration`, or `quit`.
pub async fn run(args: Args) -> anyhow::Result<()> {
    init_logging();
    info!("Streamer starting");

    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    config.apply(&args);
    let target = args.target()?;

    let provider = TestPatternProvider::new(TestPatternConfig {
        width: args.width,
        height: args.height,
        end_after: args.end_track_after.map(Duration::from_secs),
        ..Default::default()
    });
    let transport = Arc::new(HttpTransport::new(config.transport.clone())?);
    let (event_tx, event_rx) = event_channel();

    let (controller, handle) = create_controller(
        Arc::new(provider),
        Arc::clone(&transport),
        config.stream.clone(),
        event_tx,
    )?;
    let controller_task = controller.spawn();
    let printer = spawn_event_printer(event_rx);

    let outcome = match handle.start(target).await? {
        ConnectionState::Error { message } => Err(anyhow!("Session failed to start: {message}")),
        _ => wait_for_exit(&handle, target, &args).await,
    };

    handle.shutdown().await?;
    controller_task.await.context("Session controller failed")?;
    let last_session = printer
        .join()
        .map_err(|_| anyhow!("Event printer panicked"))?;

    if let Some(session_id) = last_session {
        match transport.fetch_status(&session_id).await {
            Ok(summary) => print_summary(&summary),
            Err(e) => warn!("Could not fetch final session status: {}", e),
        }
    }

    info!("Streamer stopped");
    outcome
}

async fn wait_for_exit(
    handle: &SessionHandle,
    target: CaptureTarget,
    args: &Args,
) -> anyhow::Result<()> {
    let deadline = deadline(args.duration);
    tokio::pin!(deadline);

    if !args.interactive {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = &mut deadline => info!("Duration elapsed"),
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return Ok(result?),
            _ = &mut deadline => {
                info!("Duration elapsed");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                match ConsoleCommand::parse(&line) {
                    Ok(command) => {
                        if !command.execute(handle, target).await? {
                            return Ok(());
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                }
            }
        }
    }
}

async fn deadline(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

/// Print events until the controller shuts down. Returns the last session id.
fn spawn_event_printer(events: Receiver<SessionEvent>) -> thread::JoinHandle<Option<String>> {
    thread::spawn(move || {
        let mut last_session = None;

        while let Ok(event) = events.recv() {
            match event {
                SessionEvent::StateChanged { current, .. } => println!("state: {}", current.name()),
                SessionEvent::SessionCreated(session) => {
                    println!(
                        "session {} created (upload {}, every {}s)",
                        session.session_id, session.upload_id, session.frame_interval_secs
                    );
                    last_session = Some(session.session_id);
                }
                SessionEvent::FrameAcknowledged(ack) => {
                    let alert = ack
                        .alert_level
                        .map(|level| format!(" [{level:?}]"))
                        .unwrap_or_default();
                    println!(
                        "frame {}: {} detections{}",
                        ack.frame_number, ack.detections_count, alert
                    );
                }
                SessionEvent::TickSkipped { total_skipped } => {
                    println!("upload still in flight, tick skipped ({total_skipped} total)")
                }
                SessionEvent::Reconnected { reconnect_attempts } => {
                    println!("camera reconnected ({reconnect_attempts} so far)")
                }
                SessionEvent::SessionStopped(summary) => print_summary(&summary),
                SessionEvent::Error {
                    recoverable,
                    message,
                } => {
                    let kind = if recoverable { "warning" } else { "error" };
                    eprintln!("{kind}: {message}");
                }
                SessionEvent::Shutdown => break,
            }
        }

        last_session
    })
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "session {} {:?}: {} frames received, {} processed, {} detections, {} reconnects",
        summary.session_id,
        summary.status,
        summary.frames_received,
        summary.frames_processed,
        summary.detections_count,
        summary.reconnect_attempts
    );
}
