//! A worker whose consumer is a tokio task.

use crate::core::{Client, CooperativePause, Event};
use crate::worker::{consume, lock, Queue, Worker, WorkerError, WorkerKind};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Delivers events from a task on a tokio runtime.
///
/// Rate-limit waits suspend only the consumer task, so producers sharing the
/// runtime keep running while a send is held back.
pub struct CooperativeWorker {
    client: Arc<dyn Client>,
    runtime: Handle,
    queue: Queue,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CooperativeWorker {
    /// Creates a worker bound to the current tokio runtime.
    ///
    /// # Errors
    /// Returns `WorkerError::NoRuntime` when called outside a runtime.
    pub fn new(client: Arc<dyn Client>) -> Result<Self, WorkerError> {
        let runtime = Handle::try_current().map_err(|_| WorkerError::NoRuntime)?;
        Ok(Self::with_handle(client, runtime))
    }

    /// Creates a worker that spawns its consumer on `runtime`.
    pub fn with_handle(client: Arc<dyn Client>, runtime: Handle) -> Self {
        Self {
            client,
            runtime,
            queue: Queue::new(),
            task: Mutex::new(None),
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.backlog().len()
    }
}

#[async_trait]
impl Worker for CooperativeWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Cooperative
    }

    fn start(&self) -> Result<(), WorkerError> {
        let mut task = lock(&self.task);
        if task.is_some() {
            return Ok(());
        }
        let Some(rx) = self.queue.take_receiver() else {
            return Ok(());
        };
        let client = Arc::clone(&self.client);
        let backlog = self.queue.backlog().clone();
        *task = Some(
            self.runtime
                .spawn(async move { consume(rx, client, backlog, &CooperativePause).await }),
        );
        debug!("Cooperative worker started");
        Ok(())
    }

    fn enqueue(&self, event: Event) -> Result<(), WorkerError> {
        self.queue.push(event)
    }

    async fn drain(&self) {
        self.queue.drain().await;
    }

    async fn stop(&self) {
        self.queue.drain().await;
        self.queue.close();
        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Cooperative worker consumer failed");
            }
            debug!("Cooperative worker stopped");
        }
    }
}
