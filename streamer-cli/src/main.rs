//! Live capture streamer.
//!
//! Runs one streaming session against the detection service using the
//! synthetic test-pattern camera.

use clap::Parser;

use streamer_cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    streamer_cli::run(Args::parse()).await
}
