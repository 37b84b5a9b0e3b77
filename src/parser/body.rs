//! Message body extraction: flattens a MIME tree into plain text, HTML and an
//! ordered attachment list.

use tracing::{debug, warn};

use crate::error::{MailsinkError, Result};
use crate::model::attachment::Attachment;
use crate::model::body::MessageBody;
use crate::parser::header::decode_charset;
use crate::parser::mime::{self, MimePart, PartKind};

/// What a leaf part contributes to the [`MessageBody`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartRole {
    PlainText,
    Html,
    Attachment,
}

/// Classify a leaf part.
///
/// `text/plain` and `text/html` are inline text unless the disposition says
/// `attachment`; every other media type is an attachment, whether or not it
/// carries a filename.
pub fn classify(part: &MimePart) -> PartRole {
    if part.is_attachment_disposition() {
        return PartRole::Attachment;
    }
    match part.content_type.as_str() {
        "text/plain" => PartRole::PlainText,
        "text/html" => PartRole::Html,
        _ => PartRole::Attachment,
    }
}

/// Parse a complete raw message and extract its body.
///
/// Fails only when the message as a whole cannot be parsed. The result is a
/// pure function of the input bytes.
pub fn parse_message_body(raw_message: &[u8]) -> Result<MessageBody> {
    let root = mime::parse_mime(raw_message)?;
    Ok(extract_body(&root))
}

/// Walk the tree depth-first and build the [`MessageBody`].
pub fn extract_body(root: &MimePart) -> MessageBody {
    BodyBuilder::new(true).build(root)
}

struct BodyBuilder {
    plain_text: String,
    html: String,
    attachments: Vec<Attachment>,
    /// Whether embedded messages may lend their text to this level. Only the
    /// top-level message lifts; deeper messages stay whole.
    lift_embedded: bool,
}

impl BodyBuilder {
    fn new(lift_embedded: bool) -> Self {
        Self {
            plain_text: String::new(),
            html: String::new(),
            attachments: Vec::new(),
            lift_embedded,
        }
    }

    fn build(mut self, root: &MimePart) -> MessageBody {
        self.visit(root);
        self.finish()
    }

    fn visit(&mut self, part: &MimePart) {
        match &part.kind {
            PartKind::Leaf { body, text } => self.leaf(part, body, text.as_deref()),
            // multipart/alternative is flattened too: every branch contributes.
            PartKind::Composite { children } => {
                for child in children {
                    self.visit(child);
                }
            }
            PartKind::MessageContainer {
                message,
                subject,
                message_id,
                raw,
            } => self.embedded(part, message, subject.as_deref(), message_id.as_deref(), raw),
        }
    }

    fn leaf(&mut self, part: &MimePart, body: &[u8], text: Option<&str>) {
        if part.decoding_problem {
            let err = MailsinkError::PartDecoding {
                part: part
                    .filename
                    .clone()
                    .unwrap_or_else(|| part.content_type.clone()),
                reason: "transfer encoding could not be decoded".into(),
            };
            warn!(error = %err, "Keeping part as best-effort attachment");
            self.attachments.push(attachment_from(part, body.to_vec()));
            return;
        }

        let role = classify(part);
        debug!(content_type = %part.content_type, ?role, "Classified part");

        match role {
            PartRole::PlainText => self.plain_text.push_str(&leaf_text(part, body, text)),
            PartRole::Html => self.html.push_str(&leaf_text(part, body, text)),
            PartRole::Attachment => self.attachments.push(attachment_from(part, body.to_vec())),
        }
    }

    /// An embedded message with plain text of its own lends that text to the
    /// top level and hands over its attachments; its HTML part, if any,
    /// becomes one more attachment. Without plain text, or when embedded in
    /// an embedded message, it is kept whole as a single attachment.
    fn embedded(
        &mut self,
        container: &MimePart,
        root: &MimePart,
        subject: Option<&str>,
        message_id: Option<&str>,
        raw: &[u8],
    ) {
        if self.lift_embedded {
            let inner = BodyBuilder::new(false).build(root);

            if !inner.plain_text.is_empty() {
                debug!(
                    attachments = inner.attachments.len(),
                    has_html = inner.has_html(),
                    "Lifting plain text of embedded message"
                );
                self.plain_text.push_str(&inner.plain_text);
                if inner.has_html() {
                    self.attachments.push(Attachment {
                        filename: embedded_name(None, subject, message_id, "html"),
                        mime_type: "text/html".to_string(),
                        charset: Some("utf-8".to_string()),
                        content_id: None,
                        data: inner.html.into_bytes(),
                    });
                }
                self.attachments.extend(inner.attachments);
                return;
            }
        }

        self.attachments.push(Attachment {
            filename: embedded_name(container.filename.as_deref(), subject, message_id, "eml"),
            mime_type: container.content_type.clone(),
            charset: None,
            content_id: container.content_id.clone(),
            data: raw.to_vec(),
        });
    }

    fn finish(self) -> MessageBody {
        MessageBody {
            plain_text: self.plain_text,
            html: self.html,
            attachments: self.attachments,
        }
    }
}

/// Decoded text of a leaf, falling back to decoding the payload with the
/// announced charset when the parser did not produce text.
fn leaf_text(part: &MimePart, body: &[u8], text: Option<&str>) -> String {
    match text {
        Some(text) => text.to_string(),
        None => decode_charset(part.charset.as_deref().unwrap_or("utf-8"), body),
    }
}

/// Filename for content taken from an embedded message: the part's own
/// filename, else `<message-id>.ext`, else `subject.ext`.
fn embedded_name(
    filename: Option<&str>,
    subject: Option<&str>,
    message_id: Option<&str>,
    extension: &str,
) -> String {
    if let Some(name) = filename {
        return name.to_string();
    }
    if let Some(id) = message_id.filter(|id| !id.is_empty()) {
        return format!("<{id}>.{extension}");
    }
    subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("{s}.{extension}"))
        .unwrap_or_default()
}

fn attachment_from(part: &MimePart, data: Vec<u8>) -> Attachment {
    Attachment {
        filename: part.filename.clone().unwrap_or_default(),
        mime_type: part.content_type.clone(),
        charset: part.charset.clone(),
        content_id: part.content_id.clone(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded(root: MimePart, message_id: Option<&str>) -> MimePart {
        MimePart {
            kind: PartKind::MessageContainer {
                message: Box::new(root),
                subject: Some("Forwarded".to_string()),
                message_id: message_id.map(String::from),
                raw: b"Subject: inner\n\nraw".to_vec(),
            },
            ..MimePart::leaf("message/rfc822", Vec::new())
        }
    }

    #[test]
    fn test_single_plain_leaf() {
        let body = extract_body(&MimePart::leaf("text/plain", "Mail body\nnew line\n"));
        assert_eq!(body.plain_text, "Mail body\nnew line\n");
        assert_eq!(body.html, "");
        assert!(body.attachments.is_empty());
    }

    #[test]
    fn test_alternative_keeps_both_branches() {
        let root = MimePart::composite(
            "multipart/alternative",
            vec![
                MimePart::leaf("text/plain", "Mail body"),
                MimePart::leaf("text/html", "<p>html mail</p>"),
            ],
        );
        let body = extract_body(&root);
        assert_eq!(body.plain_text, "Mail body");
        assert_eq!(body.html, "<p>html mail</p>");
    }

    #[test]
    fn test_sibling_text_parts_concatenate_in_order() {
        let root = MimePart::composite(
            "multipart/mixed",
            vec![
                MimePart::leaf("text/plain", "one "),
                MimePart::leaf("text/plain", "two"),
                MimePart::leaf("text/html", "<b>a</b>"),
                MimePart::leaf("text/html", "<b>b</b>"),
            ],
        );
        let body = extract_body(&root);
        assert_eq!(body.plain_text, "one two");
        assert_eq!(body.html, "<b>a</b><b>b</b>");
    }

    #[test]
    fn test_classification() {
        let text_attachment =
            MimePart::leaf("text/plain", "a").with_disposition("attachment", Some("a.txt"));
        assert_eq!(classify(&text_attachment), PartRole::Attachment);

        let inline_text = MimePart::leaf("text/plain", "a").with_disposition("inline", Some("a.txt"));
        assert_eq!(classify(&inline_text), PartRole::PlainText);

        let image = MimePart::leaf("image/png", "a");
        assert_eq!(classify(&image), PartRole::Attachment);

        assert_eq!(classify(&MimePart::leaf("text/html", "")), PartRole::Html);
    }

    #[test]
    fn test_attachment_data_is_exact() {
        let root = MimePart::composite(
            "multipart/mixed",
            vec![
                MimePart::leaf("text/plain", "see attached"),
                MimePart::leaf("application/pdf", vec![0u8, 159, 146, 150])
                    .with_disposition("attachment", Some("example.pdf")),
            ],
        );
        let body = extract_body(&root);
        assert_eq!(body.attachments.len(), 1);
        let att = &body.attachments[0];
        assert_eq!(att.filename, "example.pdf");
        assert_eq!(att.mime_type, "application/pdf");
        assert_eq!(att.data, vec![0u8, 159, 146, 150]);
    }

    #[test]
    fn test_embedded_message_lends_plain_text_and_attachments() {
        let inner = MimePart::composite(
            "multipart/mixed",
            vec![
                MimePart::leaf("text/plain", "nested message"),
                MimePart::leaf("text/plain", "a")
                    .with_disposition("attachment", Some("Disposition Notification Test.txt")),
            ],
        );
        let root = MimePart::composite("multipart/mixed", vec![embedded(inner, None)]);

        let body = extract_body(&root);
        assert_eq!(body.plain_text, "nested message");
        assert_eq!(body.html, "");
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].filename, "Disposition Notification Test.txt");
        assert_eq!(body.attachments[0].data, b"a");
    }

    #[test]
    fn test_embedded_message_without_text_becomes_attachment() {
        let inner = MimePart::leaf("text/html", "<p>only html</p>");
        let root = MimePart::composite(
            "multipart/mixed",
            vec![
                MimePart::leaf("text/plain", "outer"),
                embedded(inner, None),
            ],
        );

        let body = extract_body(&root);
        assert_eq!(body.plain_text, "outer");
        assert_eq!(body.html, "");
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].filename, "Forwarded.eml");
        assert_eq!(body.attachments[0].mime_type, "message/rfc822");
        assert_eq!(body.attachments[0].data, b"Subject: inner\n\nraw");
    }

    #[test]
    fn test_embedded_message_is_named_by_message_id_first() {
        let body = extract_body(&embedded(
            MimePart::leaf("image/gif", "x"),
            Some("53FEB7F0.3030501@localhost"),
        ));
        assert_eq!(body.attachments[0].filename, "<53FEB7F0.3030501@localhost>.eml");
    }

    #[test]
    fn test_embedded_html_becomes_attachment_next_to_lifted_text() {
        let inner = MimePart::composite(
            "multipart/alternative",
            vec![
                MimePart::leaf("text/plain", "nested message"),
                MimePart::leaf("text/html", "a"),
            ],
        );
        let body = extract_body(&embedded(inner, Some("53FEB7F0.3030501@localhost")));
        assert_eq!(body.plain_text, "nested message");
        assert_eq!(body.html, "");
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].filename, "<53FEB7F0.3030501@localhost>.html");
        assert_eq!(body.attachments[0].mime_type, "text/html");
        assert_eq!(body.attachments[0].data, b"a");
    }

    #[test]
    fn test_only_one_level_of_embedding_is_lifted() {
        let deep = embedded(MimePart::leaf("text/plain", "deep text"), Some("deep@localhost"));
        let mid = MimePart::composite(
            "multipart/mixed",
            vec![MimePart::leaf("text/plain", "mid text"), deep],
        );
        let root = MimePart::composite(
            "multipart/mixed",
            vec![MimePart::leaf("text/plain", "outer text "), embedded(mid, None)],
        );

        let body = extract_body(&root);
        assert_eq!(body.plain_text, "outer text mid text");
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].filename, "<deep@localhost>.eml");
        assert_eq!(body.attachments[0].mime_type, "message/rfc822");
        assert_eq!(body.attachments[0].data, b"Subject: inner\n\nraw");
    }

    #[test]
    fn test_undecodable_part_degrades_to_attachment() {
        let mut broken = MimePart::leaf("text/plain", "??");
        broken.decoding_problem = true;
        let root = MimePart::composite(
            "multipart/mixed",
            vec![MimePart::leaf("text/plain", "fine"), broken],
        );

        let body = extract_body(&root);
        assert_eq!(body.plain_text, "fine");
        assert_eq!(body.attachments.len(), 1);
        assert_eq!(body.attachments[0].filename, "");
        assert_eq!(body.attachments[0].mime_type, "text/plain");
    }

    #[test]
    fn test_leaf_without_text_uses_charset() {
        let mut part = MimePart::leaf("application/octet-stream", vec![0x63, 0x61, 0x66, 0xE9]);
        part.content_type = "text/plain".to_string();
        part.charset = Some("iso-8859-1".to_string());
        assert_eq!(extract_body(&part).plain_text, "café");
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let raw = b"From: a@example.com\nSubject: x\n\nhello\n";
        assert_eq!(
            parse_message_body(raw).unwrap(),
            parse_message_body(raw).unwrap()
        );
    }

    #[test]
    fn test_malformed_source_is_an_error() {
        assert!(matches!(
            parse_message_body(b""),
            Err(MailsinkError::MalformedMessage(_))
        ));
    }
}
