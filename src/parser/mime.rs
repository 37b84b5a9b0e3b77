//! MIME parser adapter: raw RFC 5322 bytes → [`MimePart`] tree.
//!
//! `mail-parser` does the heavy lifting (transfer decoding, charsets, nested
//! messages). This module copies what the extractor needs into a plain owned
//! tree with a closed [`PartKind`], so the rest of the crate never touches the
//! library's types.

use mail_parser::{ContentType, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::error::{MailsinkError, Result};
use crate::parser::header::{collect_parameters, normalize_content_id, HeaderParams};

/// Maximum nesting depth (multiparts and embedded messages) to descend into.
/// Deeper subtrees are cut off to protect against adversarial input.
pub const MAX_DEPTH: usize = 32;

/// Role of a node in the MIME tree. A part has exactly one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    /// A part with a body.
    Leaf {
        /// Payload with the transfer-encoding removed. Text keeps its
        /// declared charset.
        body: Vec<u8>,
        /// Charset-decoded text for `text/*` parts.
        text: Option<String>,
    },
    /// A `multipart/*` part.
    Composite { children: Vec<MimePart> },
    /// A `message/rfc822` (or similar) part holding one embedded message.
    MessageContainer {
        /// Root part of the embedded message.
        message: Box<MimePart>,
        /// Decoded subject of the embedded message.
        subject: Option<String>,
        /// Message-ID of the embedded message, without angle brackets.
        message_id: Option<String>,
        /// Raw source of the embedded message.
        raw: Vec<u8>,
    },
}

/// A node of the parsed MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lowercase `type/subtype`; `text/plain` when the header is missing.
    pub content_type: String,
    pub charset: Option<String>,
    /// Lowercase disposition type (`"inline"`, `"attachment"`), if any.
    pub disposition: Option<String>,
    /// Decoded filename from `Content-Disposition` or the `name` parameter.
    pub filename: Option<String>,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// Set when the transfer-encoding could not be decoded.
    pub decoding_problem: bool,
    pub kind: PartKind,
}

impl MimePart {
    /// A text or binary leaf with the given content type. Handy for building
    /// trees by hand.
    pub fn leaf(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let text = content_type
            .starts_with("text/")
            .then(|| String::from_utf8_lossy(&body).into_owned());
        Self {
            content_type: content_type.to_ascii_lowercase(),
            charset: None,
            disposition: None,
            filename: None,
            content_id: None,
            decoding_problem: false,
            kind: PartKind::Leaf { body, text },
        }
    }

    /// A `multipart/*` node with the given children.
    pub fn composite(content_type: &str, children: Vec<MimePart>) -> Self {
        Self {
            kind: PartKind::Composite { children },
            ..Self::leaf(content_type, Vec::new())
        }
    }

    pub fn with_disposition(mut self, disposition: &str, filename: Option<&str>) -> Self {
        self.disposition = Some(disposition.to_ascii_lowercase());
        self.filename = filename.map(String::from);
        self
    }

    pub fn with_content_id(mut self, content_id: &str) -> Self {
        self.content_id = Some(normalize_content_id(content_id).to_string());
        self
    }

    pub fn is_attachment_disposition(&self) -> bool {
        self.disposition.as_deref() == Some("attachment")
    }
}

/// Parse a complete raw message into its MIME tree.
///
/// Fails with [`MailsinkError::MalformedMessage`] when the source is empty,
/// carries no header fields, or cannot be read as a message at all. Problems inside single parts are
/// recorded on the part (`decoding_problem`) instead.
pub fn parse_mime(raw_message: &[u8]) -> Result<MimePart> {
    let message_bytes = skip_from_line(raw_message);

    if message_bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(MailsinkError::MalformedMessage(
            "message source is empty".into(),
        ));
    }

    let parser = MessageParser::default();
    let message = parser.parse(message_bytes).ok_or_else(|| {
        MailsinkError::MalformedMessage("source is not an RFC 5322 message".into())
    })?;

    if message.headers().is_empty() {
        return Err(MailsinkError::MalformedMessage(
            "message has no header fields".into(),
        ));
    }

    Ok(convert_part(&message, 0, 0))
}

fn convert_part(message: &Message<'_>, part_id: usize, depth: usize) -> MimePart {
    let Some(part) = message.part(part_id) else {
        warn!(part_id, "Dangling MIME part reference");
        return MimePart::leaf("application/octet-stream", Vec::new());
    };

    let mut mime = describe(part);
    debug!(
        part_id,
        depth,
        content_type = %mime.content_type,
        "Converting MIME part"
    );

    mime.kind = match &part.body {
        PartType::Text(text) | PartType::Html(text) => PartKind::Leaf {
            body: encode_text(text, mime.charset.as_deref()),
            text: Some(text.to_string()),
        },
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => PartKind::Leaf {
            body: bytes.to_vec(),
            text: None,
        },
        PartType::Multipart(ids) => {
            let children = if depth >= MAX_DEPTH {
                warn!(depth, "MIME tree too deep, skipping children");
                Vec::new()
            } else {
                ids.iter()
                    .map(|id| convert_part(message, *id, depth + 1))
                    .collect()
            };
            PartKind::Composite { children }
        }
        PartType::Message(nested) => {
            let root = if depth >= MAX_DEPTH {
                warn!(depth, "MIME tree too deep, skipping embedded message");
                MimePart::leaf("text/plain", Vec::new())
            } else {
                convert_part(nested, 0, depth + 1)
            };
            PartKind::MessageContainer {
                message: Box::new(root),
                subject: nested.subject().map(String::from),
                message_id: nested.message_id().map(|id| normalize_content_id(id).to_string()),
                raw: embedded_source(nested),
            }
        }
    };

    mime
}

/// `text` in the charset it was sent in, UTF-8 when the label is unknown.
fn encode_text(text: &str, charset: Option<&str>) -> Vec<u8> {
    match charset.and_then(|label| encoding_rs::Encoding::for_label(label.trim().as_bytes())) {
        Some(encoding) => encoding.encode(text).0.into_owned(),
        None => text.as_bytes().to_vec(),
    }
}

/// Copy the header-level facts of a part.
fn describe(part: &MessagePart<'_>) -> MimePart {
    let content_type = part
        .content_type()
        .map(essence)
        .unwrap_or_else(|| match part.body {
            PartType::Message(_) => "message/rfc822".to_string(),
            _ => "text/plain".to_string(),
        });

    let type_params = parameters(part.content_type());
    let disposition_params = parameters(part.content_disposition());

    let filename = disposition_params
        .get("filename")
        .or_else(|| type_params.get("name"))
        .map(String::from)
        .or_else(|| part.attachment_name().map(String::from))
        .filter(|name| !name.trim().is_empty());

    MimePart {
        content_type,
        charset: type_params.get("charset").map(String::from),
        disposition: part
            .content_disposition()
            .map(|d| d.ctype().to_ascii_lowercase()),
        filename,
        content_id: part
            .content_id()
            .map(normalize_content_id)
            .filter(|id| !id.is_empty())
            .map(String::from),
        decoding_problem: part.is_encoding_problem,
        kind: PartKind::Leaf {
            body: Vec::new(),
            text: None,
        },
    }
}

/// `type/subtype` in lowercase.
fn essence(ct: &ContentType<'_>) -> String {
    match ct.subtype() {
        Some(sub) => format!("{}/{}", ct.ctype(), sub),
        None => ct.ctype().to_string(),
    }
    .to_ascii_lowercase()
}

fn parameters(header: Option<&ContentType<'_>>) -> HeaderParams {
    let pairs = header
        .and_then(|h| h.attributes())
        .unwrap_or_default()
        .iter()
        .map(|(name, value)| (name.as_ref(), value.as_ref()));
    collect_parameters(pairs)
}

/// Raw bytes of an embedded message, headers included.
fn embedded_source(nested: &Message<'_>) -> Vec<u8> {
    let root = nested.root_part();
    let start = root.raw_header_offset() as usize;
    let end = root.raw_end_offset() as usize;
    nested
        .raw_message
        .get(start..end)
        .unwrap_or_default()
        .to_vec()
}

/// Skip the `From ` separator line (and a UTF-8 BOM) that mbox exports and
/// some MTAs put in front of a message.
pub fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}
