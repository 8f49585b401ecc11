//! Capture hooks that connect a host logging facility to a hub.
//!
//! The host registers an integration's hook (a `tracing` layer or a `log`
//! logger) once, for the lifetime of the process. The hook stays inert until a
//! hub installs its sink, and goes inert again when the hub uninstalls it, so
//! installation is explicit and scoped even though the logging facility itself
//! is global.
pub mod log_bridge;
pub mod tracing_layer;

pub use log_bridge::LogIntegration;
pub use tracing_layer::TracingIntegration;

use crate::core::{CapturedRecord, Severity};
use crate::hub::HubError;
use crate::internal_metrics;
use arc_swap::ArcSwapOption;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Targets whose records are never captured by default: the engine's own
/// diagnostics and the HTTP stack used for delivery.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    "anynotify",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "native_tls",
    "rustls",
];

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("integration is already installed in another hub")]
    AlreadyInstalled,

    #[error("failed to register global logger: {0}")]
    Logger(#[from] log::SetLoggerError),
}

/// Receives records captured by an integration.
pub trait RecordSink: Send + Sync {
    /// Cheap pre-check so hooks can skip building records nobody wants.
    fn accepts(&self, severity: Severity) -> bool;

    fn handle(&self, record: CapturedRecord) -> Result<(), HubError>;
}

/// A capture-hook installer.
pub trait Integration: Send + Sync {
    fn name(&self) -> &'static str;

    /// Routes captured records to `sink` until [`Integration::uninstall`].
    fn install(&self, sink: Arc<dyn RecordSink>) -> Result<(), IntegrationError>;

    fn uninstall(&self);
}

struct Installed {
    sink: Arc<dyn RecordSink>,
}

/// The swappable connection between a registered hook and a hub.
#[derive(Clone, Default)]
pub struct SinkSlot {
    active: Arc<ArcSwapOption<Installed>>,
}

impl SinkSlot {
    pub fn install(&self, sink: Arc<dyn RecordSink>) -> Result<(), IntegrationError> {
        let installed = Arc::new(Installed { sink });
        let previous = self
            .active
            .compare_and_swap(&None::<Arc<Installed>>, Some(installed));
        if previous.is_some() {
            return Err(IntegrationError::AlreadyInstalled);
        }
        Ok(())
    }

    pub fn uninstall(&self) {
        self.active.store(None);
    }

    pub fn is_installed(&self) -> bool {
        self.active.load().is_some()
    }

    /// Whether a hook should bother building a record of this severity.
    pub fn wants(&self, severity: Severity) -> bool {
        self.active
            .load()
            .as_deref()
            .is_some_and(|installed| installed.sink.accepts(severity))
    }

    /// Builds a record with `build` and hands it to the installed sink.
    ///
    /// Nothing escapes this boundary: a panic while building or handling the
    /// record, or an error from the sink, is logged and the record dropped.
    pub fn dispatch<F>(&self, build: F)
    where
        F: FnOnce() -> CapturedRecord,
    {
        let guard = self.active.load();
        let Some(installed) = guard.as_deref() else {
            return;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| installed.sink.handle(build())));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => HubError::Capture(crate::worker::panic_message(&*panic)),
        };
        warn!(error = %error, "Dropping captured record");
        metrics::counter!(internal_metrics::RECORDS_DROPPED_TOTAL).increment(1);
    }
}

impl std::fmt::Debug for SinkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSlot")
            .field("installed", &self.is_installed())
            .finish()
    }
}

/// Returns true if `target` equals or is nested under one of `prefixes`.
pub(crate) fn is_ignored(target: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        target == prefix
            || target
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with("::"))
    })
}

pub(crate) fn default_ignored_targets() -> Vec<String> {
    DEFAULT_IGNORED_TARGETS.iter().map(|t| t.to_string()).collect()
}
