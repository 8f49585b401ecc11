//! A worker that delivers inside `enqueue`.

use crate::core::{BlockingPause, Client, Event};
use crate::worker::{deliver, Worker, WorkerError, WorkerKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tracing::debug;

/// Delivers each event synchronously on the caller's thread of control.
///
/// `enqueue` returns only after the send attempt, including any rate-limit
/// wait, has completed. The client is driven on a private single-threaded
/// runtime; when the caller is itself inside a tokio runtime, the attempt runs
/// on a scoped helper thread while the caller blocks.
pub struct ImmediateWorker {
    client: Arc<dyn Client>,
    runtime: Option<Runtime>,
    stopped: AtomicBool,
}

impl ImmediateWorker {
    pub fn new(client: Arc<dyn Client>) -> Result<Self, WorkerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            client,
            runtime: Some(runtime),
            stopped: AtomicBool::new(false),
        })
    }

    fn deliver_now(&self, runtime: &Runtime, event: &Event) {
        let attempt = || runtime.block_on(deliver(&*self.client, event, &BlockingPause));
        if Handle::try_current().is_ok() {
            std::thread::scope(|scope| {
                // `deliver` contains client panics, so the join cannot fail.
                let _ = scope.spawn(attempt).join();
            });
        } else {
            attempt();
        }
    }
}

#[async_trait]
impl Worker for ImmediateWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Immediate
    }

    fn start(&self) -> Result<(), WorkerError> {
        Ok(())
    }

    fn enqueue(&self, event: Event) -> Result<(), WorkerError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(WorkerError::Stopped);
        }
        let runtime = self.runtime.as_ref().ok_or(WorkerError::Stopped)?;
        self.deliver_now(runtime, &event);
        Ok(())
    }

    async fn drain(&self) {}

    async fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("Immediate worker stopped");
        }
    }
}

impl Drop for ImmediateWorker {
    fn drop(&mut self) {
        // Dropping a runtime from inside another runtime's context panics.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
