use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tera::Tera;

use crate::job::EmailJob;
use crate::queue::QueueStore;
use crate::sender::Sender;
use crate::transmit::{DeliveryObserver, LogObserver, Transmitter};
use crate::MailError;

/// Rendering collaborator: template identifier plus a context mapping in,
/// rendered text out. An unresolvable identifier is a caller-time error.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, context: &HashMap<String, Value>) -> Result<String, MailError>;
}

impl TemplateEngine for Tera {
    fn render(&self, template: &str, context: &HashMap<String, Value>) -> Result<String, MailError> {
        let mut ctx = tera::Context::new();
        for (key, value) in context {
            ctx.insert(key.as_str(), value);
        }
        Tera::render(self, template, &ctx).map_err(|e| MailError::Template(e.to_string()))
    }
}

/// Load every template under a directory, e.g. `templates/emails`.
pub fn load_templates(dir: &str) -> Result<Tera, MailError> {
    Tera::new(&format!("{}/**/*", dir)).map_err(|e| MailError::Template(e.to_string()))
}

/// The two public entry points: enqueue-for-later and send-immediately.
/// Both render the template once and use the output as both the plain body
/// and the HTML part.
pub struct Dispatcher {
    templates: Arc<dyn TemplateEngine>,
    queue: Arc<dyn QueueStore>,
    transmitter: Transmitter,
    observer: Arc<dyn DeliveryObserver>,
}

impl Dispatcher {
    pub fn new(
        templates: Arc<dyn TemplateEngine>,
        queue: Arc<dyn QueueStore>,
        transmitter: Transmitter,
    ) -> Self {
        Self {
            templates,
            queue,
            transmitter,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Render and persist a job for the background worker. Rendering and
    /// queue-insert failures propagate synchronously; nothing has been
    /// persisted when this returns an error.
    pub fn enqueue(
        &self,
        template: &str,
        subject: &str,
        recipients: &[String],
        context: &HashMap<String, Value>,
        sender: Option<Sender>,
        extra_headers: Option<Vec<(String, String)>>,
    ) -> Result<(), MailError> {
        let job = self.build_job(template, subject, recipients, context, sender, extra_headers)?;
        self.queue.insert(job.to_doc())?;
        log::debug!("[mail] Queued \"{}\" for {}", job.subject, job.recipients.join(", "));
        Ok(())
    }

    /// Render and transmit right now, bypassing the queue. Blocks the caller
    /// for the SMTP exchange. Callers only observe rendering errors; the
    /// transmission outcome goes to the observer — once the job is handed to
    /// the transmitter it is fire-and-forget, same as a queued job.
    pub fn send_now(
        &self,
        template: &str,
        subject: &str,
        recipients: &[String],
        context: &HashMap<String, Value>,
        sender: Option<Sender>,
        extra_headers: Option<Vec<(String, String)>>,
    ) -> Result<(), MailError> {
        let job = self.build_job(template, subject, recipients, context, sender, extra_headers)?;
        match self.transmitter.send(&job) {
            Ok(()) => self.observer.delivered(&job),
            Err(e) => self.observer.failed(&job, &e),
        }
        Ok(())
    }

    fn build_job(
        &self,
        template: &str,
        subject: &str,
        recipients: &[String],
        context: &HashMap<String, Value>,
        sender: Option<Sender>,
        extra_headers: Option<Vec<(String, String)>>,
    ) -> Result<EmailJob, MailError> {
        let rendered = self.templates.render(template, context)?;
        Ok(EmailJob {
            subject: subject.to_string(),
            recipients: recipients.to_vec(),
            body: Some(rendered.clone()),
            html: Some(rendered),
            sender,
            extra_headers,
        })
    }
}
