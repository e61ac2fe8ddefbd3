//! Queue-backed email dispatch.
//!
//! Callers hand a template, subject, recipients and a context map to the
//! [`Dispatcher`], which renders the template and either transmits the
//! resulting job immediately (`send_now`) or persists it into a document
//! queue (`enqueue`). A [`QueueWorker`] running on a background tokio task
//! drains that queue and performs the actual SMTP exchange.
//!
//! ```ignore
//! let templates = Arc::new(dispatch::load_templates("templates/emails")?);
//! let queue = Arc::new(MongoQueue::new("mongodb://localhost:27017", "app")?);
//! let default_sender = Sender::from_settings(&config);
//! let transmitter = Transmitter::new(default_sender);
//!
//! let worker = QueueWorker::new(Arc::clone(&queue), transmitter.clone());
//! let handle = worker.spawn();
//!
//! let dispatcher = Dispatcher::new(templates, queue, transmitter);
//! dispatcher.enqueue("welcome.tmpl", "Welcome!", &recipients, &context, None, None)?;
//!
//! // ... on shutdown:
//! handle.shutdown().await;
//! ```
//!
//! The queue store, template engine and configuration source are all
//! collaborators injected at construction: any `QueueStore` with an atomic
//! pop works, any `TemplateEngine` can render, and the default sender comes
//! from a flat key/value settings map (`MAIL_SERVER`, `MAIL_PORT`,
//! `MAIL_USERNAME`, `MAIL_PASSWORD`, `MAIL_USE_TLS`, `MAIL_DEFAULT_SENDER`,
//! `MAIL_DISPLAY_NAME`).

pub mod dispatch;
pub mod job;
pub mod queue;
pub mod sender;
pub mod transmit;
pub mod worker;


pub use dispatch::{Dispatcher, TemplateEngine};
pub use job::EmailJob;
pub use queue::{MemoryQueue, MongoQueue, QueueStore};
pub use sender::Sender;
pub use transmit::{DeliveryObserver, LogObserver, MailTransport, SmtpRelay, Transmitter};
pub use worker::{QueueWorker, WorkerHandle};

use thiserror::Error;

/// Everything that can go wrong between "render this template" and
/// "the mail server accepted the message".
#[derive(Debug, Error)]
pub enum MailError {
    /// The job carries no sender and no process-wide default is configured.
    /// Reportable, never fatal: the job is dropped, the loop keeps running.
    #[error("no sender available: job has none and no default is configured")]
    NoSender,

    /// A mailbox string (sender identity or recipient) failed to parse.
    /// For sender identities this is a data-quality fault in stored sender
    /// data, deliberately distinct from transport failures.
    #[error("invalid mailbox address: {0}")]
    InvalidAddress(String),

    /// The MIME message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(String),

    /// Connection, authentication or send rejection from the mail server.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// Template not found or rendering failed. Surfaces synchronously to
    /// the caller of `enqueue`/`send_now`, never to the worker.
    #[error("template error: {0}")]
    Template(String),

    /// The queue store failed to insert or pop a document.
    #[error("queue error: {0}")]
    Queue(String),

    /// A persisted job or sender document is missing fields or carries the
    /// wrong types. The document is already off the queue when this is
    /// detected, so it is logged and dropped.
    #[error("malformed document: {0}")]
    Doc(String),
}
