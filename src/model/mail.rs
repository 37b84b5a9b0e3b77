//! Stored mails and their listing summaries.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A captured message as kept by a [`MailStore`](crate::store::MailStore).
///
/// Immutable once saved; the only way to get rid of it is a purge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredMessage {
    /// Identity assigned by the store on save (`0` until saved).
    pub id: u64,

    /// Raw RFC 5322 source.
    pub source: Vec<u8>,

    /// Precomputed HTML part, if the message has one.
    pub html: Option<String>,

    /// Decoded `Subject:`.
    pub subject: String,

    /// First `From:` address, formatted for display.
    pub from: String,

    /// `To:` addresses, formatted for display.
    pub to: Vec<String>,

    /// Parsed `Date:` header.
    pub date: Option<DateTime<Utc>>,

    /// Number of attachments found at ingest time.
    pub attachment_count: usize,

    /// When the sink received the message.
    pub received_at: DateTime<Utc>,
}

impl StoredMessage {
    /// A message carrying only its raw source; nothing is precomputed.
    pub fn new(source: impl Into<Vec<u8>>) -> Self {
        Self {
            source: source.into(),
            received_at: Utc::now(),
            ..Self::default()
        }
    }

    /// Set the precomputed HTML part.
    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// The raw source as text (lossy for non UTF-8 bytes).
    pub fn source_text(&self) -> String {
        String::from_utf8_lossy(&self.source).into_owned()
    }

    /// Listing view of this message.
    pub fn summary(&self) -> MailSummary {
        MailSummary {
            id: self.id,
            subject: self.subject.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            date: self.date,
            received_at: self.received_at,
            has_html: self.html.as_deref().is_some_and(|h| !h.is_empty()),
            attachment_count: self.attachment_count,
            size: self.source.len() as u64,
        }
    }
}

/// Compact description of a stored mail for listings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MailSummary {
    pub id: u64,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub has_html: bool,
    pub attachment_count: usize,
    /// Raw source size in bytes.
    pub size: u64,
}
