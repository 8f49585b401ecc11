//! Captures `tracing` events through a `tracing_subscriber` layer.
//!
//! Register the layer once alongside the host's other layers:
//!
//! ```no_run
//! use anynotify::integration::TracingIntegration;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! let integration = TracingIntegration::new();
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(integration.layer())
//!     .init();
//! ```
//!
//! Field conventions: `message` is the summary, a field named `severity`
//! (e.g. `severity = "critical"`) overrides the level, and `exception` or
//! `trace`, or any field recorded as a `&(dyn Error + 'static)`, becomes the
//! trace text.
//! Every other field is attached to the event's context.

use crate::core::{CapturedRecord, Context, Severity};
use crate::integration::{default_ignored_targets, is_ignored, Integration, IntegrationError, RecordSink, SinkSlot};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context as LayerContext, Layer};

/// Integration for the `tracing` ecosystem.
#[derive(Clone, Debug)]
pub struct TracingIntegration {
    slot: SinkSlot,
    ignored_targets: Arc<Vec<String>>,
}

impl TracingIntegration {
    pub fn new() -> Self {
        Self {
            slot: SinkSlot::default(),
            ignored_targets: Arc::new(default_ignored_targets()),
        }
    }

    /// Adds target prefixes whose events are never captured.
    pub fn ignore_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut ignored = (*self.ignored_targets).clone();
        ignored.extend(targets.into_iter().map(Into::into));
        self.ignored_targets = Arc::new(ignored);
        self
    }

    /// The layer to register with the host's subscriber.
    pub fn layer(&self) -> CaptureLayer {
        CaptureLayer {
            slot: self.slot.clone(),
            ignored_targets: Arc::clone(&self.ignored_targets),
        }
    }
}

impl Default for TracingIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl Integration for TracingIntegration {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn install(&self, sink: Arc<dyn RecordSink>) -> Result<(), IntegrationError> {
        self.slot.install(sink)
    }

    fn uninstall(&self) {
        self.slot.uninstall();
    }
}

/// Forwards events to the hub installed in its [`TracingIntegration`].
#[derive(Clone, Debug)]
pub struct CaptureLayer {
    slot: SinkSlot,
    ignored_targets: Arc<Vec<String>>,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        if is_ignored(metadata.target(), &self.ignored_targets) {
            return;
        }
        let severity = Severity::from(*metadata.level());
        if !self.slot.wants(severity) && metadata.fields().field("severity").is_none() {
            return;
        }
        self.slot.dispatch(|| {
            let mut visitor = RecordVisitor::default();
            event.record(&mut visitor);
            visitor.into_record(severity, metadata.target())
        });
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    severity: Option<Severity>,
    trace: Option<String>,
    fields: Context,
}

impl RecordVisitor {
    fn store(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = Some(value_text(value)),
            "severity" => self.severity = value_text(value).parse().ok(),
            "exception" | "trace" => self.trace = Some(value_text(value)),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }

    fn into_record(self, level_severity: Severity, target: &str) -> CapturedRecord {
        CapturedRecord {
            severity: self.severity.unwrap_or(level_severity),
            message: self.message.unwrap_or_default(),
            target: target.to_string(),
            trace: self.trace,
            fields: self.fields,
        }
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.store(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.store(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.store(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.store(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.store(field, Value::from(value));
    }

    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.trace = Some(render_error_chain(value));
    }
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// The error's message followed by one `Caused by:` line per source.
fn render_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\nCaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
