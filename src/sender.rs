//! Message sender used by the demo flow.
//!
//! The sink has no outbound transport: the default [`LoopbackSender`] formats
//! the message with `lettre` and captures it straight into the store, exactly
//! as if it had arrived from outside.

use std::sync::Arc;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::Message;
use tracing::info;

use crate::error::{MailsinkError, Result};
use crate::parser::envelope;
use crate::store::MailStore;

/// A plain-text message with a single body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

impl SimpleMessage {
    /// The message `POST /createMail` sends: from and to `address`.
    pub fn demo(address: &str) -> Self {
        Self {
            from: address.to_string(),
            to: vec![address.to_string()],
            subject: "Subject".to_string(),
            text: "mail body".to_string(),
        }
    }

    /// Format as an RFC 5322 message.
    pub fn to_rfc822(&self) -> Result<Vec<u8>> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| MailsinkError::Send(format!("invalid from address '{}': {e}", self.from)))?;

        let mut builder = Message::builder().from(from);
        for recipient in &self.to {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                MailsinkError::Send(format!("invalid to address '{recipient}': {e}"))
            })?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .subject(&self.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(self.text.clone())
            .map_err(|e| MailsinkError::Send(format!("failed to build message: {e}")))?;

        Ok(message.formatted())
    }
}

/// Delivers a [`SimpleMessage`].
pub trait MessageSender: Send + Sync {
    fn send(&self, message: &SimpleMessage) -> Result<()>;
}

/// Delivers into a [`MailStore`].
pub struct LoopbackSender {
    store: Arc<dyn MailStore>,
}

impl LoopbackSender {
    pub fn new(store: Arc<dyn MailStore>) -> Self {
        Self { store }
    }
}

impl MessageSender for LoopbackSender {
    fn send(&self, message: &SimpleMessage) -> Result<()> {
        let raw = message.to_rfc822()?;
        let stored = self.store.save(envelope::capture(&raw)?)?;
        info!(id = stored.id, subject = %stored.subject, "Delivered message locally");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::body::parse_message_body;
    use crate::store::MemoryStore;

    #[test]
    fn test_demo_message() {
        let msg = SimpleMessage::demo("root@localhost");
        assert_eq!(msg.from, "root@localhost");
        assert_eq!(msg.to, vec!["root@localhost"]);
        assert_eq!(msg.subject, "Subject");
        assert_eq!(msg.text, "mail body");
    }

    #[test]
    fn test_formatted_message_parses_back() {
        let raw = SimpleMessage::demo("root@localhost").to_rfc822().unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("Subject: Subject"));
        let body = parse_message_body(&raw).unwrap();
        assert_eq!(body.plain_text.trim_end(), "mail body");
        assert!(body.attachments.is_empty());
    }

    #[test]
    fn test_invalid_address() {
        let mut msg = SimpleMessage::demo("root@localhost");
        msg.to = vec!["not an address".into()];
        assert!(matches!(msg.to_rfc822(), Err(MailsinkError::Send(_))));
    }

    #[test]
    fn test_loopback_saves_into_store() {
        let store = Arc::new(MemoryStore::new());
        let sender = LoopbackSender::new(store.clone());
        sender.send(&SimpleMessage::demo("root@localhost")).unwrap();

        let all = store.find_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].subject, "Subject");
        assert_eq!(all[0].from, "root@localhost");
    }
}
