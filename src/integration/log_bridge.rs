//! Captures records from the `log` facade.

use crate::core::{CapturedRecord, Severity};
use crate::integration::{default_ignored_targets, is_ignored, Integration, IntegrationError, RecordSink, SinkSlot};
use std::sync::Arc;

/// Integration for crates that log through the `log` facade.
///
/// `log` accepts a single global logger per process, so the host either calls
/// [`LogIntegration::install_global`] or wraps [`LogIntegration::logger`] in
/// its own logger.
#[derive(Clone, Debug)]
pub struct LogIntegration {
    slot: SinkSlot,
    ignored_targets: Arc<Vec<String>>,
}

impl LogIntegration {
    pub fn new() -> Self {
        Self {
            slot: SinkSlot::default(),
            ignored_targets: Arc::new(default_ignored_targets()),
        }
    }

    pub fn logger(&self) -> CaptureLogger {
        CaptureLogger {
            slot: self.slot.clone(),
            ignored_targets: Arc::clone(&self.ignored_targets),
        }
    }

    /// Registers [`LogIntegration::logger`] as the process-wide `log` logger.
    ///
    /// # Errors
    /// Fails if another logger has already been registered.
    pub fn install_global(&self, max_level: log::LevelFilter) -> Result<(), IntegrationError> {
        log::set_boxed_logger(Box::new(self.logger()))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Default for LogIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl Integration for LogIntegration {
    fn name(&self) -> &'static str {
        "log"
    }

    fn install(&self, sink: Arc<dyn RecordSink>) -> Result<(), IntegrationError> {
        self.slot.install(sink)
    }

    fn uninstall(&self) {
        self.slot.uninstall();
    }
}

/// A `log::Log` that forwards records to the installed hub.
#[derive(Clone, Debug)]
pub struct CaptureLogger {
    slot: SinkSlot,
    ignored_targets: Arc<Vec<String>>,
}

impl log::Log for CaptureLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        !is_ignored(metadata.target(), &self.ignored_targets)
            && self.slot.wants(Severity::from(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.slot.dispatch(|| {
            CapturedRecord::new(Severity::from(record.level()), record.args().to_string())
                .with_target(record.target())
        });
    }

    fn flush(&self) {}
}
