//! A client for posting events to a Discord webhook.

use crate::client::{DeliveryError, Throttle};
use crate::core::{Client, Event, Pause, Severity};
use crate::formatting::{EventFormatter, MarkdownFormatter};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A client for sending embeds to a Discord webhook.
///
/// Discord answers an accepted webhook post with `204 No Content`; any other
/// status is treated as a failed delivery.
pub struct DiscordClient {
    webhook_url: String,
    http: reqwest::Client,
    formatter: Box<dyn EventFormatter>,
    throttle: Throttle,
    accepted_status: StatusCode,
}

impl DiscordClient {
    /// Creates a new `DiscordClient` with the default rate limiter.
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http: default_http_client(DEFAULT_TIMEOUT),
            formatter: Box::new(MarkdownFormatter::default()),
            throttle: Throttle::default(),
            accepted_status: StatusCode::NO_CONTENT,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.throttle = Throttle::new(limiter);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = default_http_client(timeout);
        self
    }

    /// Uses a caller-built HTTP client, e.g. one with proxy settings.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_formatter(mut self, formatter: Box<dyn EventFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Builds the webhook payload for an event.
    pub fn payload(&self, event: &Event) -> Value {
        json!({
            "embeds": [{
                "title": self.formatter.title(event),
                "description": self.formatter.body(event),
                "color": embed_color(event.severity()),
                "timestamp": event.timestamp().to_rfc3339(),
            }]
        })
    }
}

/// Pooled connections are disabled: the client may be driven by several
/// short-lived runtimes over its lifetime.
pub(crate) fn http_client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(0)
}

pub(crate) fn default_http_client(timeout: Duration) -> reqwest::Client {
    client_or_fallback(http_client_builder(timeout).build())
}

fn client_or_fallback(built: reqwest::Result<reqwest::Client>) -> reqwest::Client {
    built.unwrap_or_else(|e| {
        warn!(
            error = %e,
            "Failed to build the HTTP client; falling back to reqwest defaults without timeout or pooling limits"
        );
        reqwest::Client::default()
    })
}

fn embed_color(severity: Severity) -> u32 {
    match severity {
        Severity::Debug => 0x95a5a6,
        Severity::Info => 0x3498db,
        Severity::Warning => 0xf1c40f,
        Severity::Error => 0xe74c3c,
        Severity::Critical => 0x8e44ad,
    }
}

#[async_trait]
impl Client for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip_all, fields(severity = %event.severity()))]
    async fn send(&self, event: &Event, pause: &dyn Pause) -> Result<(), DeliveryError> {
        let payload = self.payload(event);
        self.throttle.acquire(pause).await;

        let response = self.http.post(&self.webhook_url).json(&payload).send().await?;
        let status = response.status();
        if status == self.accepted_status {
            debug!("Discord accepted the event.");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected { status, body })
        }
    }
}
