//! A worker with a dedicated consumer thread.

use crate::core::{BlockingPause, Client, Event};
use crate::worker::{consume, lock, Queue, Worker, WorkerError, WorkerKind};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Delivers events from a background OS thread.
///
/// `enqueue` only appends to the queue. The consumer thread drives the client
/// on its own single-threaded runtime and blocks during rate-limit waits.
pub struct ThreadedWorker {
    client: Arc<dyn Client>,
    queue: Queue,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadedWorker {
    pub fn new(client: Arc<dyn Client>) -> Self {
        Self {
            client,
            queue: Queue::new(),
            thread: Mutex::new(None),
        }
    }

    /// Number of events accepted but not yet attempted.
    pub fn pending(&self) -> usize {
        self.queue.backlog().len()
    }
}

#[async_trait]
impl Worker for ThreadedWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Threaded
    }

    fn start(&self) -> Result<(), WorkerError> {
        let mut thread = lock(&self.thread);
        if thread.is_some() || self.queue.is_consumed() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let Some(rx) = self.queue.take_receiver() else {
            return Ok(());
        };
        let client = Arc::clone(&self.client);
        let backlog = self.queue.backlog().clone();

        let handle = std::thread::Builder::new()
            .name("anynotify-worker".to_string())
            .spawn(move || {
                runtime.block_on(consume(rx, client, backlog, &BlockingPause));
            })?;
        debug!("Threaded worker started");
        *thread = Some(handle);
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
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Threaded worker consumer panicked");
            }
            debug!("Threaded worker stopped");
        }
    }
}
