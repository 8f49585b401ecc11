//! A client for sending notifications to Slack.

use crate::client::discord::default_http_client;
use crate::client::{DeliveryError, Throttle};
use crate::core::{Client, Event, Pause};
use crate::formatting::{EventFormatter, MarkdownFormatter};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// A client for sending messages to a Slack incoming webhook.
pub struct SlackClient {
    webhook_url: String,
    http: reqwest::Client,
    formatter: Box<dyn EventFormatter>,
    throttle: Throttle,
}

impl SlackClient {
    /// Creates a new `SlackClient`.
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            http: default_http_client(Duration::from_secs(10)),
            formatter: Box::new(MarkdownFormatter::default()),
            throttle: Throttle::default(),
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

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Builds the `{"text": ...}` payload: bold title, then the body.
    pub fn payload(&self, event: &Event) -> Value {
        let title = self.formatter.title(event);
        let body = self.formatter.body(event);
        let text = if body.is_empty() {
            format!("*{}*", title)
        } else {
            format!("*{}*\n{}", title, body)
        };
        json!({ "text": text })
    }
}

#[async_trait]
impl Client for SlackClient {
    fn name(&self) -> &str {
        "slack"
    }

    /// Formats and sends an event to the configured Slack webhook.
    #[instrument(skip_all, fields(severity = %event.severity()))]
    async fn send(&self, event: &Event, pause: &dyn Pause) -> Result<(), DeliveryError> {
        let payload = self.payload(event);
        self.throttle.acquire(pause).await;

        let response = self.http.post(&self.webhook_url).json(&payload).send().await?;
        if response.status().is_success() {
            debug!("Slack accepted the event.");
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, "Slack rejected the event");
            Err(DeliveryError::Rejected { status, body })
        }
    }
}
