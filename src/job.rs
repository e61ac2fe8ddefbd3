use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::sender::Sender;
use crate::MailError;

/// One unit of outgoing email work. Created by the dispatcher, persisted as
/// a flat document when queued, reconstructed by the worker, and discarded
/// after a single transmission attempt — a job leaves the queue the moment
/// it is popped, before the outcome of the send is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailJob {
    pub subject: String,
    /// Ordered, non-empty. Serialized as an array of strings so the order
    /// and the individual addresses survive persistence.
    pub recipients: Vec<String>,
    pub body: Option<String>,
    pub html: Option<String>,
    /// Per-job sender override; the transmitter falls back to its default
    /// sender when absent.
    pub sender: Option<Sender>,
    /// Literal header name/value pairs, applied in insertion order.
    pub extra_headers: Option<Vec<(String, String)>>,
}

impl EmailJob {
    pub fn new(subject: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            recipients,
            body: None,
            html: None,
            sender: None,
            extra_headers: None,
        }
    }

    /// Serialize to the persisted document shape:
    /// `{subject, recipients: [string], body, html, sender, extra_headers}`
    /// with nulls for the absent optionals.
    pub fn to_doc(&self) -> Document {
        doc! {
            "subject": self.subject.as_str(),
            "recipients": self.recipients.clone(),
            "body": self.body.clone(),
            "html": self.html.clone(),
            "sender": self.sender.as_ref().map(Sender::to_doc),
            "extra_headers": self.extra_headers.as_ref().map(|headers| {
                let mut d = Document::new();
                for (name, value) in headers {
                    d.insert(name.as_str(), value.as_str());
                }
                d
            }),
        }
    }

    /// Reconstruct a job from a persisted document. This is the validation
    /// boundary: missing or mis-typed required fields, an empty recipient
    /// list, or a partial nested sender all fail loudly.
    pub fn from_doc(doc: &Document) -> Result<Self, MailError> {
        let subject = doc
            .get_str("subject")
            .map_err(|_| MailError::Doc("job missing subject".into()))?
            .to_string();

        let recipients = doc
            .get_array("recipients")
            .map_err(|_| MailError::Doc("job missing recipients".into()))?
            .iter()
            .map(|b| {
                b.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| MailError::Doc("recipient is not a string".into()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(MailError::Doc("job has no recipients".into()));
        }

        let sender = match doc.get("sender") {
            Some(Bson::Document(d)) => Some(Sender::from_doc(d)?),
            _ => None,
        };

        let extra_headers = match doc.get("extra_headers") {
            Some(Bson::Document(d)) => {
                let mut headers = Vec::with_capacity(d.len());
                for (name, value) in d {
                    let value = value.as_str().ok_or_else(|| {
                        MailError::Doc(format!("header {} is not a string", name))
                    })?;
                    headers.push((name.clone(), value.to_string()));
                }
                Some(headers)
            }
            _ => None,
        };

        Ok(Self {
            subject,
            recipients,
            body: opt_str(doc, "body"),
            html: opt_str(doc, "html"),
            sender,
            extra_headers,
        })
    }
}

fn opt_str(doc: &Document, key: &str) -> Option<String> {
    doc.get_str(key).ok().map(str::to_string)
}
