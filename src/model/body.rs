//! Flattened view of a message body.

use super::attachment::Attachment;

/// Plain-text part, HTML part and attachments of one message.
///
/// Derived from the raw source on every request and never mutated after
/// construction. Absent parts are empty strings, never `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    /// Concatenation of every inline `text/plain` part, in document order.
    pub plain_text: String,

    /// Concatenation of every inline `text/html` part, in document order.
    pub html: String,

    /// Attachments in document order.
    pub attachments: Vec<Attachment>,
}

impl MessageBody {
    /// Find the attachment whose Content-ID matches `content_id`.
    pub fn find_by_content_id(&self, content_id: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| a.matches_content_id(content_id))
    }

    pub fn has_html(&self) -> bool {
        !self.html.is_empty()
    }
}
