// packages/mockserver/src/lifecycle/mail.rs
//! SMTP message capture
//!
//! Each complete message accepted by the SMTP transport is parsed and merged
//! into the state store as `peer`, `mailfrom`, `recipients`, `message_data`
//! and `message`, then appended to the history. There are no hooks and no
//! scriptable replies on this path.

use crate::lifecycle::resolver::keys;
use crate::observability::SMTP_MESSAGES_TOTAL;
use crate::state::store::StateStore;
use crate::state::value::Snapshot;
use crate::utils::errors::Result;
use bytes::Bytes;
use mailparse::ParsedMail;
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{debug, info};

/// Parsed mail message: headers, decoded body and MIME subparts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MailMessage {
    headers: Vec<(String, String)>,
    body: String,
    parts: Vec<MailMessage>,
}

impl MailMessage {
    /// Parse RFC 5322 message data
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw)?;
        Self::from_parsed(&parsed)
    }

    /// Parse, treating unparseable data as a headerless body
    pub fn parse_lenient(raw: &[u8]) -> Self {
        Self::parse(raw).unwrap_or_else(|e| {
            debug!("Message is not RFC 5322, keeping it as plain body: {}", e);
            Self {
                headers: Vec::new(),
                body: String::from_utf8_lossy(raw).into_owned(),
                parts: Vec::new(),
            }
        })
    }

    fn from_parsed(parsed: &ParsedMail<'_>) -> Result<Self> {
        Ok(Self {
            headers: parsed
                .headers
                .iter()
                .map(|header| (header.get_key(), header.get_value()))
                .collect(),
            body: parsed.get_body()?,
            parts: parsed
                .subparts
                .iter()
                .map(Self::from_parsed)
                .collect::<Result<_>>()?,
        })
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header with `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn subject(&self) -> Option<&str> {
        self.header("Subject")
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn parts(&self) -> &[MailMessage] {
        &self.parts
    }

    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }
}

/// One message as handed over by the SMTP transport
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub peer: SocketAddr,
    pub mailfrom: String,
    pub recipients: Vec<String>,

    /// Message data without the terminating `.` line
    pub data: Bytes,
}

/// Records received messages into a state store
#[derive(Clone)]
pub struct MailRecorder {
    store: StateStore,
}

impl MailRecorder {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Merge the message into the live state and append it to the history
    pub fn record(&self, envelope: Envelope) -> Snapshot {
        info!(
            "Received message from {} for {} recipient(s), {} bytes",
            envelope.mailfrom,
            envelope.recipients.len(),
            envelope.data.len()
        );

        let message = MailMessage::parse_lenient(&envelope.data);

        let mut fields = Snapshot::new();
        fields.insert(keys::PEER, envelope.peer);
        fields.insert(keys::MAILFROM, envelope.mailfrom);
        fields.insert(keys::RECIPIENTS, envelope.recipients);
        fields.insert(keys::MESSAGE_DATA, envelope.data);
        fields.insert(keys::MESSAGE, message);

        let snapshot = self.store.save_history(fields, &[]);
        metrics::counter!(SMTP_MESSAGES_TOTAL).increment(1);

        snapshot
    }
}
