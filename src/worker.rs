use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::job::EmailJob;
use crate::queue::QueueStore;
use crate::transmit::{DeliveryObserver, LogObserver, Transmitter};
use crate::MailError;

/// How long the worker sleeps after observing an empty queue.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The single background consumer of the queue store. Each tick atomically
/// pops one pending document; on a hit it transmits immediately and loops,
/// on an empty queue it sleeps the poll interval. A popped job is never
/// re-queued — transmission failure is terminal for that job instance and
/// goes to the observer.
pub struct QueueWorker {
    queue: Arc<dyn QueueStore>,
    transmitter: Transmitter,
    interval: Duration,
    observer: Arc<dyn DeliveryObserver>,
}

impl QueueWorker {
    pub fn new(queue: Arc<dyn QueueStore>, transmitter: Transmitter) -> Self {
        Self {
            queue,
            transmitter,
            interval: POLL_INTERVAL,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// One Draining step (plus Sending when a document was popped).
    /// Returns Ok(true) when a document was consumed, Ok(false) on an empty
    /// queue. A document that no longer deserializes is logged and dropped —
    /// it already left the queue when it was popped.
    pub fn process_one(&self) -> Result<bool, MailError> {
        let Some(document) = self.queue.pop_one()? else {
            return Ok(false);
        };

        match EmailJob::from_doc(&document) {
            Ok(job) => match self.transmitter.send(&job) {
                Ok(()) => self.observer.delivered(&job),
                Err(e) => self.observer.failed(&job, &e),
            },
            Err(e) => log::error!("[worker] Dropping malformed job document: {}", e),
        }

        Ok(true)
    }

    /// Drain-and-stop: process until the queue is observed empty, then
    /// return how many documents were consumed.
    pub fn drain(&self) -> Result<usize, MailError> {
        let mut processed = 0;
        while self.process_one()? {
            processed += 1;
        }
        Ok(processed)
    }

    /// Run the loop on a dedicated background task for the lifetime of the
    /// process. The returned handle carries the shutdown signal; dropping it
    /// also stops the worker.
    ///
    /// The SMTP exchange is blocking, as is the queue pop; a hung connection
    /// stalls this one task while enqueued work accumulates, which matches
    /// the single-consumer model.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle { shutdown: shutdown_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        log::info!("[worker] Email queue worker started");
        loop {
            if *shutdown.borrow() {
                log::info!("[worker] Email queue worker stopping");
                break;
            }

            match self.process_one() {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => log::error!("[worker] Queue poll failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    log::info!("[worker] Email queue worker stopping");
                    break;
                }
            }
        }
    }
}

/// Supervision handle for a spawned worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the loop to stop and wait for it to finish its current job.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
