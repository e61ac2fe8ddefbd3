use std::path::PathBuf;
use std::sync::Arc;

use lettre::message::header::{HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::job::EmailJob;
use crate::sender::Sender;
use crate::MailError;

/// Headers owned by the transmitter; extra headers may augment them but
/// never override them.
const RESERVED_HEADERS: [&str; 3] = ["Subject", "From", "To"];

/// The wire seam: hand a finished message plus the connection parameters to
/// whatever actually talks to a mail server. Production uses [`SmtpRelay`];
/// tests record instead of sending.
pub trait MailTransport: Send + Sync {
    fn transmit(&self, sender: &Sender, message: &Message) -> Result<(), MailError>;
}

/// Connects to the resolved sender's server per message: STARTTLS when the
/// sender's TLS flag is set, plain connection otherwise, credentials only
/// when a username is configured. Timeouts are left to the transport layer.
pub struct SmtpRelay;

impl MailTransport for SmtpRelay {
    fn transmit(&self, sender: &Sender, message: &Message) -> Result<(), MailError> {
        let mut builder = if sender.use_tls {
            SmtpTransport::starttls_relay(&sender.email_server)
                .map_err(|e| MailError::Smtp(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&sender.email_server)
        };

        builder = builder.port(sender.email_port);

        if !sender.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                sender.username.clone(),
                sender.password.clone(),
            ));
        }

        builder
            .build()
            .send(message)
            .map_err(|e| MailError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// Sink for transmission outcomes. The worker loop and `send_now` never let
/// a transport failure escape; they report it here instead, so failures stay
/// inspectable without ever crashing the loop.
pub trait DeliveryObserver: Send + Sync {
    fn delivered(&self, job: &EmailJob);
    fn failed(&self, job: &EmailJob, error: &MailError);
}

/// Default observer: log and move on.
pub struct LogObserver;

impl DeliveryObserver for LogObserver {
    fn delivered(&self, job: &EmailJob) {
        log::info!(
            "[mail] Sent \"{}\" to {}",
            job.subject,
            job.recipients.join(", ")
        );
    }

    fn failed(&self, job: &EmailJob, error: &MailError) {
        log::error!(
            "[mail] Failed to send \"{}\" to {}: {}",
            job.subject,
            job.recipients.join(", "),
            error
        );
    }
}

/// The transmission path: resolves the effective sender, builds the MIME
/// message, and hands it to the transport. Cheap to clone so the dispatcher
/// and the worker can share one.
#[derive(Clone)]
pub struct Transmitter {
    default_sender: Option<Sender>,
    transport: Arc<dyn MailTransport>,
    debug_dump: Option<PathBuf>,
}

impl Transmitter {
    /// The default sender is an explicit constructor argument, typically
    /// `Sender::from_settings(&config)` — there is no global fallback.
    pub fn new(default_sender: Option<Sender>) -> Self {
        Self::with_transport(default_sender, Arc::new(SmtpRelay))
    }

    pub fn with_transport(
        default_sender: Option<Sender>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            default_sender,
            transport,
            debug_dump: None,
        }
    }

    /// Dump every composed message to the given file before sending.
    /// Diagnostic side effect only; the file holds the last message.
    pub fn debug_dump(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_dump = Some(path.into());
        self
    }

    /// Send one job. The job-level sender wins over the default; with
    /// neither, this reports `NoSender` and the job is dropped. All failures
    /// come back as values — callers decide whether to observe or propagate.
    pub fn send(&self, job: &EmailJob) -> Result<(), MailError> {
        let sender = job
            .sender
            .as_ref()
            .or(self.default_sender.as_ref())
            .ok_or(MailError::NoSender)?;

        let message = build_message(job, sender)?;

        if let Some(path) = &self.debug_dump {
            if let Err(e) = std::fs::write(path, message.formatted()) {
                log::warn!("[mail] Failed to write debug dump to {}: {}", path.display(), e);
            }
        }

        self.transport.transmit(sender, &message)
    }
}

/// Assemble the multipart/alternative message for a job.
///
/// The From header is the sender's formatted identity parsed into a lettre
/// [`Mailbox`]; lettre re-encodes the display name (RFC 2047) when the
/// message is formatted, so names with non-ASCII or special characters
/// survive intact. An identity that fails to parse is a data-quality fault
/// in stored sender data and fails loudly, distinct from transport errors.
pub(crate) fn build_message(job: &EmailJob, sender: &Sender) -> Result<Message, MailError> {
    let from: Mailbox = sender
        .address()
        .parse()
        .map_err(|_| MailError::InvalidAddress(sender.address()))?;

    let mut builder = Message::builder().from(from).subject(job.subject.clone());

    // Recipients keep their original order; lettre joins them with commas
    // into a single To header.
    for recipient in &job.recipients {
        let mailbox: Mailbox = recipient
            .parse()
            .map_err(|_| MailError::InvalidAddress(recipient.clone()))?;
        builder = builder.to(mailbox);
    }

    // Plain before HTML: multipart/alternative, last part most preferred.
    // With neither present the message goes out with an empty text body.
    let mut message = match (&job.body, &job.html) {
        (Some(text), Some(html)) => builder.multipart(MultiPart::alternative_plain_html(
            text.clone(),
            html.clone(),
        )),
        (Some(text), None) => builder.singlepart(SinglePart::plain(text.clone())),
        (None, Some(html)) => builder.singlepart(SinglePart::html(html.clone())),
        (None, None) => builder.singlepart(SinglePart::plain(String::new())),
    }
    .map_err(|e| MailError::Build(e.to_string()))?;

    if let Some(headers) = &job.extra_headers {
        for (name, value) in headers {
            if RESERVED_HEADERS.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                log::warn!("[mail] Skipping extra header {} (reserved)", name);
                continue;
            }
            let header_name = HeaderName::new_from_ascii(name.clone())
                .map_err(|_| MailError::Build(format!("invalid header name: {}", name)))?;
            message
                .headers_mut()
                .insert_raw(HeaderValue::new(header_name, value.clone()));
        }
    }

    Ok(message)
}
