//! Core domain types and service traits for anynotify
//!
//! This module defines the values that flow through the dispatch engine
//! (captured records and the events built from them) and the trait contracts
//! that delivery targets and scheduling strategies implement.

use crate::client::DeliveryError;
use crate::config::ConfigError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Key/value metadata attached to an event.
pub type Context = BTreeMap<String, serde_json::Value>;

/// Ordered severity of a captured record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "trace")]
    Debug,
    Info,
    #[default]
    #[serde(alias = "warn")]
    Warning,
    Error,
    #[serde(alias = "fatal")]
    Critical,
}

impl Severity {
    /// Upper-case name used when rendering titles.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" | "fatal" => Ok(Severity::Critical),
            other => Err(ConfigError::UnknownSeverity(other.to_string())),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warning,
            tracing::Level::ERROR => Severity::Error,
        }
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace | log::Level::Debug => Severity::Debug,
            log::Level::Info => Severity::Info,
            log::Level::Warn => Severity::Warning,
            log::Level::Error => Severity::Error,
        }
    }
}

/// A record as handed over by a logging-source integration.
///
/// A record logged while handling a failure carries the formatted trace in
/// `trace`; every other record leaves it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRecord {
    pub severity: Severity,
    pub message: String,
    /// The logging target (module path or explicit target) of the record.
    pub target: String,
    pub trace: Option<String>,
    /// Structured fields attached to the logging call.
    pub fields: Context,
}

impl CapturedRecord {
    /// Creates a plain record without trace text or fields.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            target: String::new(),
            trace: None,
            fields: Context::new(),
        }
    }

    /// Attaches failure trace text to the record.
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// An immutable notification event, fully formed before it is enqueued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    timestamp: DateTime<Utc>,
    severity: Severity,
    message: String,
    exception_text: Option<String>,
    context: Context,
}

impl Event {
    /// Creates an event stamped with the current time.
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        exception_text: Option<String>,
        context: Context,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            exception_text,
            context,
        }
    }

    /// Builds an event from a captured record and a snapshot of the emitting
    /// unit's context. Record fields win over same-named context keys.
    pub fn capture(record: CapturedRecord, mut context: Context) -> Self {
        context.extend(record.fields);
        Self::new(record.severity, record.message, record.trace, context)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exception_text(&self) -> Option<&str> {
        self.exception_text.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Suspends the current unit of execution for a duration.
///
/// Immediate and threaded workers block their OS thread; the cooperative
/// worker yields to the tokio scheduler instead.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Blocks the calling OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingPause;

#[async_trait]
impl Pause for BlockingPause {
    async fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Yields to other tasks on the same runtime while waiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct CooperativePause;

#[async_trait]
impl Pause for CooperativePause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A delivery target for events.
#[async_trait]
pub trait Client: Send + Sync {
    /// A short, descriptive name (e.g. "discord"), used for logging and metrics.
    fn name(&self) -> &str;

    /// Renders and delivers a single event.
    ///
    /// Implementations consult their own rate limiter before sending and use
    /// `pause` for any wait it imposes.
    ///
    /// # Returns
    /// * `Ok(())` if the provider accepted the event
    /// * `Err` on a rejected status or a transport failure; the caller does not retry
    async fn send(&self, event: &Event, pause: &dyn Pause) -> Result<(), DeliveryError>;
}
