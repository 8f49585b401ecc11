//! anynotify - forwards lines from standard input to a notification webhook
//!
//! Each line becomes a log record at `--level`; records that pass the
//! configured minimum severity are delivered through the configured client.

use anyhow::{Context as _, Result};
use anynotify::{
    cli::Cli,
    config::Config,
    integration::{Integration, LogIntegration, TracingIntegration},
    HubHandle, Severity,
};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Target of the records emitted for input lines.
const INPUT_TARGET: &str = "stdin";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).context("Failed to load configuration")?;

    let tracing_capture = Arc::new(TracingIntegration::new());
    let log_capture = Arc::new(LogIntegration::new());

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(tracing_capture.layer())
        .init();
    log_capture.install_global(log::LevelFilter::Warn)?;

    info!(
        worker = %config.worker,
        min_severity = %config.min_severity,
        level = %cli.level,
        "anynotify starting"
    );

    let integrations: Vec<Arc<dyn Integration>> = vec![tracing_capture, log_capture];
    let hub = anynotify::init_from_config(&config, integrations)?;
    info!(hub = ?hub, "Hub configured");

    let level = cli.level;
    let lines = hub
        .scope_async(|handle| async move { forward_stdin(&handle, level).await })
        .await??;

    info!(lines, "Input exhausted, all events delivered");
    Ok(())
}

/// Emits one record per input line, tagging each with its line number.
async fn forward_stdin(hub: &HubHandle, level: Severity) -> Result<u64> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut count = 0u64;
    while let Some(line) = lines.next_line().await? {
        count += 1;
        hub.push_context([("line", count)]);
        emit(level, &line);
    }
    Ok(count)
}

fn emit(level: Severity, line: &str) {
    match level {
        Severity::Debug => tracing::debug!(target: INPUT_TARGET, "{}", line),
        Severity::Info => tracing::info!(target: INPUT_TARGET, "{}", line),
        Severity::Warning => tracing::warn!(target: INPUT_TARGET, "{}", line),
        Severity::Error => tracing::error!(target: INPUT_TARGET, "{}", line),
        Severity::Critical => {
            tracing::error!(target: INPUT_TARGET, severity = "critical", "{}", line)
        }
    }
}
