//! Workers move events from producers to a single consumer that delivers them.
//!
//! Three variants share the [`Worker`] capability set and differ only in how
//! the consumer is scheduled:
//!
//! - **[`ImmediateWorker`]**: `enqueue` delivers synchronously, including any
//!   rate-limit wait, before returning.
//! - **[`ThreadedWorker`]**: a dedicated OS thread runs the consumer loop and
//!   blocks it during rate-limit waits.
//! - **[`CooperativeWorker`]**: the consumer loop is a tokio task and rate-limit
//!   waits yield to other tasks on the runtime.
//!
//! Every variant delivers events in the order they were enqueued.
pub mod cooperative;
pub mod immediate;
pub mod threaded;

pub use cooperative::CooperativeWorker;
pub use immediate::ImmediateWorker;
pub use threaded::ThreadedWorker;

use crate::client::DeliveryError;
use crate::config::ConfigError;
use crate::core::{Client, Event, Pause};
use crate::internal_metrics;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Selects the concurrency model of a hub's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[serde(alias = "sync")]
    Immediate,
    #[default]
    #[serde(alias = "thread")]
    Threaded,
    #[serde(alias = "async")]
    Cooperative,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerKind::Immediate => "immediate",
            WorkerKind::Threaded => "threaded",
            WorkerKind::Cooperative => "cooperative",
        };
        f.write_str(name)
    }
}

impl FromStr for WorkerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "sync" => Ok(WorkerKind::Immediate),
            "threaded" | "thread" => Ok(WorkerKind::Threaded),
            "cooperative" | "async" => Ok(WorkerKind::Cooperative),
            other => Err(ConfigError::UnknownWorker(other.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker has been stopped; event was not enqueued")]
    Stopped,

    #[error("the cooperative worker requires a running tokio runtime")]
    NoRuntime,

    #[error("failed to start worker runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Transports events from producers to a consumer that hands them to a client.
#[async_trait]
pub trait Worker: Send + Sync {
    fn kind(&self) -> WorkerKind;

    /// Begins consuming. Calling it again on a started worker is a no-op.
    fn start(&self) -> Result<(), WorkerError>;

    /// Appends an event to the queue.
    ///
    /// # Errors
    /// Returns `WorkerError::Stopped` once [`Worker::stop`] has been called.
    fn enqueue(&self, event: Event) -> Result<(), WorkerError>;

    /// Resolves once every event enqueued so far has had a delivery attempt,
    /// including any rate-limit wait in progress.
    async fn drain(&self);

    /// Stops the consumer after the queued events have been delivered.
    async fn stop(&self);
}

/// Builds the worker for `kind` around `client`.
///
/// # Errors
/// `WorkerError::NoRuntime` if a cooperative worker is requested outside a
/// tokio runtime, or `WorkerError::Runtime` if a runtime cannot be created.
pub fn build(kind: WorkerKind, client: Arc<dyn Client>) -> Result<Arc<dyn Worker>, WorkerError> {
    let worker: Arc<dyn Worker> = match kind {
        WorkerKind::Immediate => Arc::new(ImmediateWorker::new(client)?),
        WorkerKind::Threaded => Arc::new(ThreadedWorker::new(client)),
        WorkerKind::Cooperative => Arc::new(CooperativeWorker::new(client)?),
    };
    Ok(worker)
}

/// Hands one event to the client and records the outcome.
///
/// Failures, including a panic inside the client, are logged and swallowed so
/// the consumer moves on to the next event.
pub(crate) async fn deliver(client: &dyn Client, event: &Event, pause: &dyn Pause) {
    let attempt = AssertUnwindSafe(client.send(event, pause)).catch_unwind().await;
    let result = attempt.unwrap_or_else(|panic| Err(DeliveryError::Panicked(panic_message(&*panic))));

    match result {
        Ok(()) => {
            debug!(client = client.name(), severity = %event.severity(), "Event delivered");
            metrics::counter!(internal_metrics::DELIVERIES_TOTAL, "outcome" => "success").increment(1);
        }
        Err(e) => {
            warn!(
                client = client.name(),
                severity = %event.severity(),
                event_message = event.message(),
                error = %e,
                "Event delivery failed; dropping event"
            );
            metrics::counter!(internal_metrics::DELIVERIES_TOTAL, "outcome" => "failure").increment(1);
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Counts events that were accepted but have not had a delivery attempt yet.
#[derive(Debug, Clone)]
pub(crate) struct Backlog {
    pending: Arc<watch::Sender<usize>>,
}

impl Backlog {
    pub(crate) fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            pending: Arc::new(pending),
        }
    }

    pub(crate) fn add(&self) {
        self.pending.send_modify(|n| *n += 1);
    }

    pub(crate) fn done(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub(crate) fn len(&self) -> usize {
        *self.pending.borrow()
    }

    pub(crate) async fn wait_empty(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives in `self`, so this only fails if it is dropped mid-wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// The FIFO queue shared by the threaded and cooperative workers.
///
/// The receiving half is handed to the consumer on start; dropping the sending
/// half on stop lets the consumer finish the remaining events and exit.
#[derive(Debug)]
pub(crate) struct Queue {
    tx: Mutex<Option<mpsc::UnboundedSender<Event>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    backlog: Backlog,
}

impl Queue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            backlog: Backlog::new(),
        }
    }

    pub(crate) fn push(&self, event: Event) -> Result<(), WorkerError> {
        let tx = lock(&self.tx);
        let tx = tx.as_ref().ok_or(WorkerError::Stopped)?;
        self.backlog.add();
        if tx.send(event).is_err() {
            self.backlog.done();
            return Err(WorkerError::Stopped);
        }
        Ok(())
    }

    /// Takes the receiving half; `None` if a consumer already owns it.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<Event>> {
        lock(&self.rx).take()
    }

    pub(crate) fn is_consumed(&self) -> bool {
        lock(&self.rx).is_none()
    }

    /// Refuses further events. Returns `false` if already closed.
    pub(crate) fn close(&self) -> bool {
        lock(&self.tx).take().is_some()
    }

    pub(crate) fn backlog(&self) -> &Backlog {
        &self.backlog
    }

    /// Waits for the backlog to empty, unless no consumer was ever started.
    pub(crate) async fn drain(&self) {
        if !self.is_consumed() {
            let pending = self.backlog.len();
            if pending > 0 {
                warn!(pending, "Draining a worker that was never started; queued events stay undelivered");
            }
            return;
        }
        self.backlog.wait_empty().await;
    }
}

/// The consumer loop: delivers events in queue order until the queue closes.
pub(crate) async fn consume(
    mut rx: mpsc::UnboundedReceiver<Event>,
    client: Arc<dyn Client>,
    backlog: Backlog,
    pause: &dyn Pause,
) {
    debug!(client = client.name(), "Worker consumer started");
    while let Some(event) = rx.recv().await {
        deliver(&*client, &event, pause).await;
        backlog.done();
    }
    debug!(client = client.name(), "Worker queue closed, consumer exiting");
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
