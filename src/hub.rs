//! The lifecycle coordinator that ties capture hooks, a worker and a client
//! together.
//!
//! A [`Hub`] is built by [`init`] and is inert until entered. [`Hub::enter`]
//! installs every integration's hook and starts the worker, returning an
//! [`ActiveHub`]. Exiting, through [`ActiveHub::exit`], [`ActiveHub::exit_blocking`]
//! or by dropping the active hub, drains the worker, stops it and then removes
//! the hooks. That sequence runs exactly once.
//!
//! ```no_run
//! use anynotify::client::DiscordClient;
//! use anynotify::integration::{Integration, TracingIntegration};
//! use anynotify::worker::WorkerKind;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), anynotify::hub::HubError> {
//! let tracing_hook = Arc::new(TracingIntegration::new());
//! let client = Arc::new(DiscordClient::new("https://discord.com/api/webhooks/1/abc"));
//! let integrations: Vec<Arc<dyn Integration>> = vec![tracing_hook.clone()];
//!
//! anynotify::init(WorkerKind::Threaded, client, integrations)?.scope(|hub| {
//!     hub.push_context([("job", "nightly-export")]);
//!     tracing::error!(target: "export", "export failed");
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Config, ConfigError};
use crate::context::ContextStore;
use crate::core::{CapturedRecord, Client, Event, Severity};
use crate::integration::{Integration, IntegrationError, RecordSink};
use crate::internal_metrics;
use crate::worker::{self, Worker, WorkerError, WorkerKind};
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum HubError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("failed to install integration '{name}': {source}")]
    Integration {
        name: &'static str,
        #[source]
        source: IntegrationError,
    },

    #[error("failed to capture record: {0}")]
    Capture(String),
}

/// Builds a hub from loaded configuration: its client, worker kind and
/// minimum severity.
///
/// # Errors
/// `HubError::Config` if no usable client is configured or a limiter setting
/// is invalid; otherwise as [`init`].
pub fn init_from_config(
    config: &Config,
    integrations: Vec<Arc<dyn Integration>>,
) -> Result<Hub, HubError> {
    let client = config.build_client()?;
    Ok(init(config.worker, client, integrations)?.with_min_severity(config.min_severity))
}

/// Builds a hub around `client`, delivering through a worker of kind `kind`.
///
/// # Errors
/// Fails if the worker cannot be built, e.g. a cooperative worker requested
/// outside a tokio runtime.
pub fn init(
    kind: WorkerKind,
    client: Arc<dyn Client>,
    integrations: Vec<Arc<dyn Integration>>,
) -> Result<Hub, HubError> {
    internal_metrics::describe();
    let client_name = client.name().to_string();
    let worker = worker::build(kind, client)?;
    debug!(worker = %worker.kind(), client = %client_name, "Hub created");
    Ok(Hub {
        worker,
        integrations,
        store: ContextStore::shared(),
        min_severity: Severity::default(),
    })
}

/// A configured hub that has not been entered yet.
pub struct Hub {
    worker: Arc<dyn Worker>,
    integrations: Vec<Arc<dyn Integration>>,
    store: Arc<ContextStore>,
    min_severity: Severity,
}

impl Hub {
    /// Records below `min_severity` are discarded before an event is built.
    pub fn with_min_severity(mut self, min_severity: Severity) -> Self {
        self.min_severity = min_severity;
        self
    }

    /// Uses `store` instead of the process-wide [`ContextStore::shared`].
    pub fn with_context_store(mut self, store: Arc<ContextStore>) -> Self {
        self.store = store;
        self
    }

    pub fn worker_kind(&self) -> WorkerKind {
        self.worker.kind()
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Installs the capture hooks and starts the worker.
    ///
    /// If a hook or the worker fails, everything installed so far is removed
    /// again before the error is returned.
    pub fn enter(self) -> Result<ActiveHub, HubError> {
        let dispatcher = Arc::new(Dispatcher {
            worker: self.worker,
            store: self.store,
            min_severity: self.min_severity,
        });
        let sink: Arc<dyn RecordSink> = dispatcher.clone();

        let mut installed: Vec<Arc<dyn Integration>> = Vec::with_capacity(self.integrations.len());
        for integration in self.integrations {
            if let Err(source) = integration.install(Arc::clone(&sink)) {
                uninstall_all(&installed);
                return Err(HubError::Integration {
                    name: integration.name(),
                    source,
                });
            }
            debug!(integration = integration.name(), "Capture hook installed");
            installed.push(integration);
        }

        if let Err(e) = dispatcher.worker.start() {
            uninstall_all(&installed);
            return Err(e.into());
        }
        debug!(worker = %dispatcher.worker.kind(), "Hub active");

        Ok(ActiveHub {
            dispatcher,
            integrations: installed,
            exited: false,
        })
    }

    /// Runs `f` inside the hub and exits afterwards, even if `f` panics.
    ///
    /// A panic from `f` is re-raised once the hub has been drained.
    pub fn scope<F, R>(self, f: F) -> Result<R, HubError>
    where
        F: FnOnce(&HubHandle) -> R,
    {
        let active = self.enter()?;
        let handle = active.to_handle();
        let outcome = catch_unwind(AssertUnwindSafe(|| f(&handle)));
        active.exit_blocking();
        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Async counterpart of [`Hub::scope`].
    ///
    /// If the returned future is dropped before completion, the active hub's
    /// `Drop` performs the exit.
    pub async fn scope_async<F, Fut, R>(self, f: F) -> Result<R, HubError>
    where
        F: FnOnce(HubHandle) -> Fut,
        Fut: Future<Output = R>,
    {
        let active = self.enter()?;
        let outcome = AssertUnwindSafe(f(active.to_handle())).catch_unwind().await;
        active.exit().await;
        match outcome {
            Ok(value) => Ok(value),
            Err(panic) => resume_unwind(panic),
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("worker", &self.worker.kind())
            .field("integrations", &self.integrations.len())
            .field("min_severity", &self.min_severity)
            .finish()
    }
}

/// An entered hub. Exits on drop if not exited explicitly.
pub struct ActiveHub {
    dispatcher: Arc<Dispatcher>,
    integrations: Vec<Arc<dyn Integration>>,
    exited: bool,
}

impl ActiveHub {
    /// Filters `record` by severity and enqueues the resulting event.
    ///
    /// # Errors
    /// `WorkerError::Stopped` once the worker has been stopped.
    pub fn handle(&self, record: CapturedRecord) -> Result<(), HubError> {
        self.dispatcher.submit(record)
    }

    pub fn capture(&self, severity: Severity, message: impl Into<String>) -> Result<(), HubError> {
        self.handle(CapturedRecord::new(severity, message))
    }

    /// Adds entries to the calling unit's context in this hub's store.
    pub fn push_context<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.dispatcher.store.push_context(pairs);
    }

    /// A cloneable producer handle that can outlive this borrow.
    pub fn to_handle(&self) -> HubHandle {
        HubHandle {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    pub fn worker_kind(&self) -> WorkerKind {
        self.dispatcher.worker.kind()
    }

    /// Drains and stops the worker, then removes the capture hooks.
    pub async fn exit(mut self) {
        self.shutdown().await;
    }

    /// Blocking form of [`ActiveHub::exit`].
    ///
    /// A cooperative consumer needs its runtime to make progress while this
    /// thread waits. On a multi-thread runtime the wait moves off the worker
    /// thread. On a current-thread runtime the hooks are removed at once and
    /// the drain continues on a detached task; prefer `exit().await` there.
    pub fn exit_blocking(mut self) {
        self.shutdown_blocking();
    }

    async fn shutdown(&mut self) {
        if std::mem::replace(&mut self.exited, true) {
            return;
        }
        let worker = &self.dispatcher.worker;
        worker.drain().await;
        worker.stop().await;
        uninstall_all(&self.integrations);
        debug!(worker = %worker.kind(), "Hub stopped");
    }

    /// Blocking exit, shared by `exit_blocking` and `Drop`.
    ///
    /// The cooperative consumer runs on a tokio runtime, so blocking the
    /// thread that owns a current-thread runtime would never finish the drain.
    /// In that case the hooks are removed now and the drain is left to a
    /// detached task on the same runtime.
    fn shutdown_blocking(&mut self) {
        if self.exited {
            return;
        }
        let cooperative_runtime = match self.dispatcher.worker.kind() {
            WorkerKind::Cooperative => Handle::try_current().ok(),
            _ => None,
        };
        let Some(runtime) = cooperative_runtime else {
            futures::executor::block_on(self.shutdown());
            return;
        };
        match runtime.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| futures::executor::block_on(self.shutdown()));
            }
            _ => {
                self.exited = true;
                uninstall_all(&self.integrations);
                let worker = Arc::clone(&self.dispatcher.worker);
                warn!("Blocking hub exit on a current-thread runtime; draining in the background");
                runtime.spawn(async move {
                    worker.drain().await;
                    worker.stop().await;
                });
            }
        }
    }
}

impl Drop for ActiveHub {
    fn drop(&mut self) {
        self.shutdown_blocking();
    }
}

impl std::fmt::Debug for ActiveHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveHub")
            .field("worker", &self.dispatcher.worker.kind())
            .field("integrations", &self.integrations.len())
            .field("exited", &self.exited)
            .finish()
    }
}

/// A cloneable producer handle onto an active hub.
#[derive(Clone)]
pub struct HubHandle {
    dispatcher: Arc<Dispatcher>,
}

impl HubHandle {
    pub fn handle(&self, record: CapturedRecord) -> Result<(), HubError> {
        self.dispatcher.submit(record)
    }

    pub fn capture(&self, severity: Severity, message: impl Into<String>) -> Result<(), HubError> {
        self.handle(CapturedRecord::new(severity, message))
    }

    pub fn push_context<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.dispatcher.store.push_context(pairs);
    }
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("worker", &self.dispatcher.worker.kind())
            .finish()
    }
}

/// The sink every installed hook feeds: severity filter, event build, enqueue.
struct Dispatcher {
    worker: Arc<dyn Worker>,
    store: Arc<ContextStore>,
    min_severity: Severity,
}

impl Dispatcher {
    fn submit(&self, record: CapturedRecord) -> Result<(), HubError> {
        if record.severity < self.min_severity {
            metrics::counter!(internal_metrics::RECORDS_FILTERED_TOTAL).increment(1);
            return Ok(());
        }
        let event = Event::capture(record, self.store.snapshot());
        self.worker.enqueue(event)?;
        metrics::counter!(internal_metrics::EVENTS_ENQUEUED_TOTAL).increment(1);
        Ok(())
    }
}

impl RecordSink for Dispatcher {
    fn accepts(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }

    fn handle(&self, record: CapturedRecord) -> Result<(), HubError> {
        self.submit(record)
    }
}

fn uninstall_all(integrations: &[Arc<dyn Integration>]) {
    for integration in integrations.iter().rev() {
        integration.uninstall();
        debug!(integration = integration.name(), "Capture hook removed");
    }
}
