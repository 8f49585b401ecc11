//! Configuration management for anynotify
//!
//! This module defines the `Config` struct used by the `anynotify` binary and
//! by hosts that prefer file-driven setup. It uses the `figment` crate to
//! layer, in order: built-in defaults, an `anynotify.toml` file, environment
//! variables prefixed with `ANYNOTIFY_` (nested keys separated by `__`), and
//! command-line arguments.

use crate::cli::Cli;
use crate::client::discord::http_client_builder;
use crate::client::{DiscordClient, SlackClient};
use crate::core::{Client, Severity};
use crate::rate_limit::RateLimiter;
use crate::worker::WorkerKind;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "anynotify.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown worker kind '{0}' (expected immediate, threaded or cooperative)")]
    UnknownWorker(String),

    #[error("unknown severity '{0}' (expected debug, info, warning, error or critical)")]
    UnknownSeverity(String),

    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("no delivery client configured; set discord.webhook_url or slack.webhook_url")]
    MissingClient,

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to load configuration: {0}")]
    Figment(#[from] figment::Error),
}

/// The main configuration struct.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Filter directive for the binary's own log output.
    pub log_level: String,
    /// Concurrency model used to deliver events.
    pub worker: WorkerKind,
    /// Records below this severity are discarded.
    pub min_severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<WebhookConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack: Option<WebhookConfig>,
}

/// Settings for one webhook-based client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WebhookConfig {
    pub webhook_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Rate limiter parameters for a client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of the trailing window, in seconds.
    pub last_n_seconds: u64,
    /// Grants allowed within one window.
    pub max_requests: usize,
    /// Minimum spacing between two grants, in milliseconds.
    pub min_interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let limiter = RateLimiter::default();
        Self {
            last_n_seconds: limiter.last_n_seconds().as_secs(),
            max_requests: limiter.max_requests(),
            min_interval_ms: limiter.min_interval().as_millis() as u64,
        }
    }
}

impl RateLimitConfig {
    pub fn to_limiter(&self) -> Result<RateLimiter, ConfigError> {
        if self.last_n_seconds == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "last_n_seconds must be at least 1".to_string(),
            ));
        }
        Ok(
            RateLimiter::new(Duration::from_secs(self.last_n_seconds), self.max_requests)?
                .with_min_interval(Duration::from_millis(self.min_interval_ms)),
        )
    }
}

impl WebhookConfig {
    fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        Ok(http_client_builder(Duration::from_millis(self.timeout_ms)).build()?)
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file,
    /// environment variables and the parsed command line.
    ///
    /// A missing default file is not an error; a missing file named with
    /// `--config` is.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let path = match &cli.config {
            Some(path) if !path.exists() => {
                return Err(figment::Error::from(format!(
                    "config file '{}' does not exist",
                    path.display()
                ))
                .into());
            }
            Some(path) => path.clone(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ANYNOTIFY_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }

    /// Builds the configured client. Discord wins if both are configured.
    pub fn build_client(&self) -> Result<Arc<dyn Client>, ConfigError> {
        if let Some(discord) = configured(&self.discord) {
            let client = DiscordClient::new(discord.webhook_url.as_str())
                .with_http_client(discord.http_client()?)
                .with_rate_limiter(discord.rate_limit.to_limiter()?);
            return Ok(Arc::new(client));
        }
        if let Some(slack) = configured(&self.slack) {
            let client = SlackClient::new(slack.webhook_url.as_str())
                .with_http_client(slack.http_client()?)
                .with_rate_limiter(slack.rate_limit.to_limiter()?);
            return Ok(Arc::new(client));
        }
        Err(ConfigError::MissingClient)
    }
}

fn configured(webhook: &Option<WebhookConfig>) -> Option<&WebhookConfig> {
    webhook.as_ref().filter(|w| !w.webhook_url.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker: WorkerKind::default(),
            min_severity: Severity::default(),
            discord: None,
            slack: None,
        }
    }
}
