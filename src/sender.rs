use std::collections::HashMap;

use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

use crate::MailError;

/// SMTP connection parameters and the outgoing identity. Immutable once
/// constructed; owned by the job that carries it or by the transmitter's
/// default-sender slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub email_server: String,
    pub email_port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub email_address: String,
    pub display_name: Option<String>,
}

impl Sender {
    pub fn new(
        email_server: impl Into<String>,
        email_port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
        use_tls: bool,
        email_address: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            email_server: email_server.into(),
            email_port,
            username: username.into(),
            password: password.into(),
            use_tls,
            email_address: email_address.into(),
            display_name,
        }
    }

    /// The formatted identity: `"Display Name <addr>"` when a display name
    /// is set, otherwise the bare address.
    pub fn address(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.email_address),
            _ => self.email_address.clone(),
        }
    }

    /// Build the process-wide default sender from a flat settings map.
    ///
    /// Keys: `MAIL_SERVER`, `MAIL_PORT` (default 587), `MAIL_USERNAME`,
    /// `MAIL_PASSWORD`, `MAIL_USE_TLS` (default true), `MAIL_DEFAULT_SENDER`,
    /// `MAIL_DISPLAY_NAME` (optional). Returns None when the server or the
    /// default address is missing. No further validation — malformed values
    /// surface when a connection is attempted.
    pub fn from_settings(settings: &HashMap<String, String>) -> Option<Self> {
        let email_server = settings.get("MAIL_SERVER").cloned().filter(|s| !s.is_empty())?;
        let email_address = settings
            .get("MAIL_DEFAULT_SENDER")
            .cloned()
            .filter(|s| !s.is_empty())?;
        let email_port = settings
            .get("MAIL_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(587);
        let username = settings.get("MAIL_USERNAME").cloned().unwrap_or_default();
        let password = settings.get("MAIL_PASSWORD").cloned().unwrap_or_default();
        let use_tls = settings
            .get("MAIL_USE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);
        let display_name = settings
            .get("MAIL_DISPLAY_NAME")
            .cloned()
            .filter(|s| !s.is_empty());

        Some(Self {
            email_server,
            email_port,
            username,
            password,
            use_tls,
            email_address,
            display_name,
        })
    }

    /// Serialize for persistence inside a job document. The password goes in
    /// verbatim — queued jobs are fully self-contained, so whoever can read
    /// the queue collection can read the credentials.
    pub fn to_doc(&self) -> Document {
        doc! {
            "email_server": self.email_server.as_str(),
            "email_port": self.email_port as i32,
            "username": self.username.as_str(),
            "password": self.password.as_str(),
            "use_tls": self.use_tls,
            "email_address": self.email_address.as_str(),
            "display_name": self.display_name.clone(),
        }
    }

    /// Reconstruct a full sender from a persisted document. Every required
    /// field must be present with the right type; a partial sender is an
    /// error, not a sender with defaults.
    pub fn from_doc(doc: &Document) -> Result<Self, MailError> {
        let email_server = get_str(doc, "email_server")?;
        let email_port = match doc.get("email_port") {
            Some(Bson::Int32(p)) => *p as u16,
            Some(Bson::Int64(p)) => *p as u16,
            _ => return Err(MailError::Doc("sender missing email_port".into())),
        };
        let username = get_str(doc, "username")?;
        let password = get_str(doc, "password")?;
        let use_tls = doc
            .get_bool("use_tls")
            .map_err(|_| MailError::Doc("sender missing use_tls".into()))?;
        let email_address = get_str(doc, "email_address")?;
        let display_name = match doc.get("display_name") {
            Some(Bson::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        };

        Ok(Self {
            email_server,
            email_port,
            username,
            password,
            use_tls,
            email_address,
            display_name,
        })
    }
}

fn get_str(doc: &Document, key: &str) -> Result<String, MailError> {
    doc.get_str(key)
        .map(str::to_string)
        .map_err(|_| MailError::Doc(format!("sender missing {}", key)))
}
