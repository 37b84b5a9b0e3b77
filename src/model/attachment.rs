//! Attachments extracted from a MIME tree.
//!
//! Attachments have no lifecycle of their own: they are owned by the
//! [`MessageBody`](super::body::MessageBody) that produced them and are
//! identified by their position in its attachment list.

use serde::Serialize;

/// A decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Decoded filename (RFC 2231 / RFC 2047 resolved). Empty if the part
    /// carried none.
    pub filename: String,

    /// MIME type as announced by the part (e.g. `"image/png"`).
    pub mime_type: String,

    /// Charset of `data` for `text/*` parts, as announced by the part.
    pub charset: Option<String>,

    /// Content-ID without angle brackets, for inline parts referenced by
    /// `cid:` URLs.
    pub content_id: Option<String>,

    /// Decoded payload (transfer-encoding removed).
    pub data: Vec<u8>,
}

impl Attachment {
    /// Whether this attachment answers to the given Content-ID.
    ///
    /// Both sides are compared without angle brackets or a `cid:` scheme.
    pub fn matches_content_id(&self, content_id: &str) -> bool {
        let wanted = crate::parser::header::normalize_content_id(content_id);
        !wanted.is_empty()
            && self
                .content_id
                .as_deref()
                .map(crate::parser::header::normalize_content_id)
                .is_some_and(|own| own == wanted)
    }

    /// `mime_type` with the charset parameter for text parts.
    pub fn content_type(&self) -> String {
        match &self.charset {
            Some(charset) if self.mime_type.starts_with("text/") => {
                format!("{}; charset={charset}", self.mime_type)
            }
            _ => self.mime_type.clone(),
        }
    }

    /// Metadata view used by listings.
    pub fn info(&self, index: usize) -> AttachmentInfo {
        AttachmentInfo {
            index,
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            content_id: self.content_id.clone(),
            size: self.data.len() as u64,
        }
    }
}

/// Attachment metadata without the payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    /// Position in the attachment list.
    pub index: usize,
    pub filename: String,
    pub mime_type: String,
    pub content_id: Option<String>,
    /// Decoded size in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(cid: Option<&str>) -> Attachment {
        Attachment {
            filename: "bg1.png".to_string(),
            mime_type: "image/png".to_string(),
            charset: None,
            content_id: cid.map(String::from),
            data: b"a".to_vec(),
        }
    }

    #[test]
    fn test_matches_content_id_ignores_brackets() {
        let att = png(Some("<1367760625.51865ef16e3f6@swift.generated>"));
        assert!(att.matches_content_id("1367760625.51865ef16e3f6@swift.generated"));
        assert!(att.matches_content_id("cid:1367760625.51865ef16e3f6@swift.generated"));
        assert!(!att.matches_content_id("1"));
        assert!(!att.matches_content_id(""));
    }

    #[test]
    fn test_content_type_carries_text_charset() {
        assert_eq!(png(None).content_type(), "image/png");
        let note = Attachment {
            filename: "note.txt".to_string(),
            mime_type: "text/plain".to_string(),
            charset: Some("iso-8859-1".to_string()),
            content_id: None,
            data: b"caf\xe9".to_vec(),
        };
        assert_eq!(note.content_type(), "text/plain; charset=iso-8859-1");
    }

    #[test]
    fn test_without_content_id_never_matches() {
        assert!(!png(None).matches_content_id("anything"));
    }

    #[test]
    fn test_info() {
        let info = png(Some("x@y")).info(3);
        assert_eq!(info.index, 3);
        assert_eq!(info.size, 1);
        assert_eq!(info.mime_type, "image/png");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["mimeType"], "image/png");
        assert_eq!(json["contentId"], "x@y");
    }
}
