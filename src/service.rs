//! Mailbox operations shared by the HTTP layer and the CLI.
//!
//! Every read goes back to the stored raw source: bodies, attachments and
//! query results are derived on each call and never cached.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{MailsinkError, Result};
use crate::html;
use crate::model::attachment::{Attachment, AttachmentInfo};
use crate::model::body::MessageBody;
use crate::model::html::HtmlNode;
use crate::model::mail::{MailSummary, StoredMessage};
use crate::parser::{body, envelope};
use crate::sanitizer;
use crate::sender::{MessageSender, SimpleMessage};
use crate::store::MailStore;

pub struct Mailbox {
    store: Arc<dyn MailStore>,
    sender: Arc<dyn MessageSender>,
    demo_address: String,
}

impl Mailbox {
    pub fn new(
        store: Arc<dyn MailStore>,
        sender: Arc<dyn MessageSender>,
        demo_address: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sender,
            demo_address: demo_address.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.store
    }

    fn mail(&self, id: u64) -> Result<StoredMessage> {
        self.store
            .find_by_id(id)?
            .ok_or_else(|| MailsinkError::mail_not_found(id))
    }

    fn body(&self, id: u64) -> Result<MessageBody> {
        body::parse_message_body(&self.mail(id)?.source)
    }

    pub fn list(&self) -> Result<Vec<MailSummary>> {
        Ok(self.store.find_all()?.iter().map(StoredMessage::summary).collect())
    }

    pub fn summary(&self, id: u64) -> Result<MailSummary> {
        Ok(self.mail(id)?.summary())
    }

    /// Raw source as text.
    pub fn source(&self, id: u64) -> Result<String> {
        Ok(self.mail(id)?.source_text())
    }

    pub fn text(&self, id: u64) -> Result<String> {
        Ok(self.body(id)?.plain_text)
    }

    /// The HTML part with every resolvable `cid:` reference pointing at
    /// `base_url`. Empty when the mail has no HTML part.
    pub fn html(&self, id: u64, base_url: &str) -> Result<String> {
        let body = self.body(id)?;
        Ok(sanitizer::sanitize_html(&body.html, &body, base_url, id))
    }

    /// The attachment of mail `id` with the given Content-ID.
    pub fn content(&self, id: u64, content_id: &str) -> Result<Attachment> {
        let body = self.body(id)?;
        sanitizer::find_by_content_id(&body, content_id).cloned()
    }

    pub fn attachments(&self, id: u64) -> Result<Vec<AttachmentInfo>> {
        Ok(self
            .body(id)?
            .attachments
            .iter()
            .enumerate()
            .map(|(index, att)| att.info(index))
            .collect())
    }

    pub fn attachment(&self, id: u64, index: usize) -> Result<Attachment> {
        let mut body = self.body(id)?;
        if index >= body.attachments.len() {
            return Err(MailsinkError::NotFound(format!(
                "attachment {index} of mail {id}"
            )));
        }
        Ok(body.attachments.swap_remove(index))
    }

    /// Evaluate `xpath` against the stored HTML part of mail `id`.
    ///
    /// The query is validated before the mail is looked up, so an empty
    /// query is a bad request even for unknown ids.
    pub fn query(&self, id: u64, xpath: &str) -> Result<Vec<HtmlNode>> {
        if xpath.trim().is_empty() {
            return Err(MailsinkError::InvalidQuery("xpath must not be empty".into()));
        }
        let mail = self.mail(id)?;
        html::query_html(mail.html.as_deref().unwrap_or_default(), xpath)
    }

    /// Capture a raw message into the store. Returns the new id.
    pub fn ingest(&self, raw: &[u8]) -> Result<u64> {
        let stored = self.store.save(envelope::capture(raw)?)?;
        info!(id = stored.id, subject = %stored.subject, size = raw.len(), "Received mail");
        Ok(stored.id)
    }

    pub fn purge(&self) -> Result<()> {
        self.store.delete_all()?;
        info!("Purged all mails");
        Ok(())
    }

    /// Send the fixed demo message through the configured sender.
    pub fn create_demo_mail(&self) -> Result<()> {
        debug!(address = %self.demo_address, "Sending demo mail");
        self.sender.send(&SimpleMessage::demo(&self.demo_address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::LoopbackSender;
    use crate::store::MemoryStore;

    const RELATED: &str = concat!(
        "Subject: related\n",
        "Content-Type: multipart/related; boundary=\"r\"\n",
        "\n",
        "--r\n",
        "Content-Type: text/html\n",
        "\n",
        "<p><img src=\"cid:img@x\"><img src=\"cid:other@x\"></p>\n",
        "--r\n",
        "Content-Type: image/png\n",
        "Content-Disposition: inline; filename=\"bg1.png\"\n",
        "Content-ID: <img@x>\n",
        "\n",
        "a\n",
        "--r--\n",
    );

    fn mailbox() -> Mailbox {
        let store: Arc<dyn MailStore> = Arc::new(MemoryStore::new());
        let sender = Arc::new(LoopbackSender::new(store.clone()));
        Mailbox::new(store, sender, "root@localhost")
    }

    #[test]
    fn test_unknown_mail_is_not_found() {
        let mb = mailbox();
        assert!(matches!(mb.source(1), Err(MailsinkError::NotFound(_))));
        assert!(matches!(mb.html(1, "http://h"), Err(MailsinkError::NotFound(_))));
        assert!(matches!(mb.query(1, "*"), Err(MailsinkError::NotFound(_))));
    }

    #[test]
    fn test_empty_query_checked_before_lookup() {
        let mb = mailbox();
        assert!(matches!(mb.query(42, ""), Err(MailsinkError::InvalidQuery(_))));
    }

    #[test]
    fn test_html_resolves_known_cids_only() {
        let mb = mailbox();
        let id = mb.ingest(RELATED.as_bytes()).unwrap();
        let html = mb.html(id, "http://localhost:8080").unwrap();
        assert!(html.contains(&format!("src=\"http://localhost:8080/mails/{id}/html/img@x\"")));
        assert!(html.contains("src=\"cid:other@x\""));
    }

    #[test]
    fn test_content_by_id() {
        let mb = mailbox();
        let id = mb.ingest(RELATED.as_bytes()).unwrap();
        let att = mb.content(id, "img@x").unwrap();
        assert_eq!(att.filename, "bg1.png");
        assert_eq!(att.mime_type, "image/png");
        assert!(matches!(mb.content(id, "nope"), Err(MailsinkError::NotFound(_))));
    }

    #[test]
    fn test_attachments_by_index() {
        let mb = mailbox();
        let id = mb.ingest(RELATED.as_bytes()).unwrap();
        let infos = mb.attachments(id).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].content_id.as_deref(), Some("img@x"));
        assert_eq!(mb.attachment(id, 0).unwrap().filename, "bg1.png");
        assert!(matches!(mb.attachment(id, 1), Err(MailsinkError::NotFound(_))));
    }

    #[test]
    fn test_query_without_html_is_empty() {
        let mb = mailbox();
        let id = mb.ingest(b"Subject: x\n\nplain only\n").unwrap();
        assert_eq!(mb.query(id, "*").unwrap(), vec![]);
    }

    #[test]
    fn test_demo_mail_and_purge() {
        let mb = mailbox();
        mb.create_demo_mail().unwrap();
        let list = mb.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].subject, "Subject");
        assert_eq!(mb.text(list[0].id).unwrap().trim_end(), "mail body");

        mb.purge().unwrap();
        assert!(mb.list().unwrap().is_empty());
    }

    #[test]
    fn test_ingest_rejects_garbage() {
        let mb = mailbox();
        assert!(matches!(mb.ingest(b""), Err(MailsinkError::MalformedMessage(_))));
        assert!(matches!(
            mb.ingest(b"garbage no headers"),
            Err(MailsinkError::MalformedMessage(_))
        ));
        assert!(mb.list().unwrap().is_empty());
    }
}
