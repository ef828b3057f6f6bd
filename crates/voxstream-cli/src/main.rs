//! CLI entry point - the composition root.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use voxstream_cli::{Cli, replay};
use voxstream_core::Settings;
use voxstream_session::LogHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before anything reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging: stderr for the operator, the hub for clients
    let log_hub = LogHub::new();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_hub.layer())
        .init();

    let mut settings = Settings::from_env();
    cli.apply_overrides(&mut settings);
    settings.validate()?;

    let audio = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = replay(
        settings,
        &audio,
        &cli.replay_options(),
        cli.forward_logs.then_some(log_hub),
        &mut out,
    )
    .await?;

    tracing::info!(
        events = summary.events,
        finals = summary.final_transcripts,
        replies = summary.replies,
        errors = summary.errors,
        "Replay finished"
    );
    Ok(())
}
