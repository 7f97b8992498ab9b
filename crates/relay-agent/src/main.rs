//! # tx-relay
//!
//! Relay binary: wires settings, logging, the enrichment pipeline and the
//! feed supervisor together, then runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging::{self, LogFormat};
use relay_feed::{SessionConfig, ShutdownCoordinator, Supervisor, WsConnector};
use relay_pipeline::{LookupOptions, Pipeline, RpcRecordSource, WebhookSink};
use relay_settings::{IgnoredOverride, RelaySettings};

/// Subscribe to a Solana logs feed and forward each transaction to a webhook.
#[derive(Parser, Debug)]
#[command(name = "tx-relay", about = "Solana transaction relay")]
struct Cli {
    /// Settings file (defaults to `~/.tx-relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level or `tracing` filter (overrides settings; `RUST_LOG` wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_parser = parse_format)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

fn parse_format(value: &str) -> Result<LogFormat, String> {
    relay_settings::loader::parse_log_format(value)
        .ok_or_else(|| format!("unknown log format '{value}' (expected compact or json)"))
}

/// Lookup source + webhook sink from settings.
fn build_pipeline(settings: &RelaySettings) -> Result<Pipeline> {
    let options = LookupOptions {
        encoding: settings.lookup.encoding.clone(),
        commitment: settings.commitment,
        max_supported_transaction_version: settings.lookup.max_supported_transaction_version,
    };
    let source = RpcRecordSource::new(
        settings.lookup.rpc_url.clone(),
        options,
        Duration::from_millis(settings.lookup.timeout_ms),
    )
    .context("Failed to build lookup HTTP client")?;
    let sink = WebhookSink::new(
        settings.webhook.url.clone(),
        Duration::from_millis(settings.webhook.timeout_ms),
    )
    .context("Failed to build webhook HTTP client")?;
    Ok(Pipeline::new(Arc::new(source), Arc::new(sink)))
}

/// Settings file, then environment overrides, then CLI flags.
///
/// Rejected overrides come back to the caller so they can be logged once the
/// subscriber is installed.
fn load_settings<F>(args: &Cli, var: F) -> Result<(RelaySettings, Vec<IgnoredOverride>)>
where
    F: Fn(&str) -> Option<String>,
{
    let path = args
        .config
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::loader::load_file_layer(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    let ignored = relay_settings::loader::apply_overrides_from(&mut settings, var);
    args.apply(&mut settings);
    Ok((settings, ignored))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // A missing .env is fine; the variables may come from the environment.
    let dotenv = dotenvy::dotenv().ok();

    let (settings, ignored) = load_settings(&args, |name| std::env::var(name).ok())?;

    logging::init_subscriber(&settings.logging.level, settings.logging.format);
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }
    for entry in &ignored {
        entry.log();
    }

    settings.validate().context("Invalid configuration")?;
    let session_config = SessionConfig::from_settings(&settings).context("Invalid configuration")?;

    let pipeline = Arc::new(build_pipeline(&settings)?);
    let connector = Arc::new(WsConnector::new(
        settings.feed.ws_url.clone(),
        Duration::from_millis(settings.feed.connect_timeout_ms),
    ));

    let coordinator = ShutdownCoordinator::new();
    let supervisor = Supervisor::new(
        session_config,
        settings.retry.clone(),
        connector,
        pipeline,
        coordinator.token(),
    );

    tracing::info!(
        feed = %settings.feed.ws_url,
        target = %settings.feed.target,
        commitment = %settings.commitment,
        webhook = %settings.webhook.url,
        "tx-relay starting"
    );
    let handle = tokio::spawn(async move { supervisor.run().await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = coordinator.graceful_shutdown(handle, None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
