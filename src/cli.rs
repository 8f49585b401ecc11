//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the `anynotify` binary
//! using the `clap` crate. Flags that correspond to configuration keys are
//! merged on top of the TOML file and environment variables.

use crate::core::Severity;
use crate::worker::WorkerKind;
use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Forwards lines from standard input to a notification webhook.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker used for delivery: immediate, threaded or cooperative.
    #[arg(short, long, value_name = "KIND")]
    pub worker: Option<WorkerKind>,

    /// Lines emitted below this severity are not delivered.
    #[arg(long, value_name = "LEVEL")]
    pub min_severity: Option<Severity>,

    /// Discord webhook URL; overrides the configured one.
    #[arg(long, value_name = "URL")]
    pub discord_webhook: Option<String>,

    /// Severity each input line is emitted at.
    #[arg(short, long, value_name = "LEVEL", default_value = "warning")]
    pub level: Severity,

    /// Filter directive for anynotify's own log output (e.g. "debug").
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(worker) = self.worker {
            dict.insert("worker".into(), Value::from(worker.to_string()));
        }

        if let Some(severity) = self.min_severity {
            dict.insert(
                "min_severity".into(),
                Value::from(severity.as_str().to_ascii_lowercase()),
            );
        }

        // Nested as a table so it merges with, rather than replaces, the
        // configured `[discord]` section.
        if let Some(url) = &self.discord_webhook {
            let mut discord = Dict::new();
            discord.insert("webhook_url".into(), Value::from(url.clone()));
            dict.insert("discord".into(), Value::from(discord));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
