//! Content-ID Resolver.
//!
//! Rewrites `cid:` references in an HTML part to URLs served by the mail
//! sink, and looks attachments up by Content-ID. Pure string rewriting: the
//! HTML is never parsed or executed.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{MailsinkError, Result};
use crate::model::attachment::Attachment;
use crate::model::body::MessageBody;
use crate::parser::header::{normalize_content_id, percent_decode};

lazy_static! {
    /// A URL-valued attribute whose value starts with `cid:`. Groups: the
    /// attribute with its `=`, the opening quote (may be empty), the id.
    static ref CID_REFERENCE: Regex = Regex::new(
        r#"(?i)(\b(?:src|href|background|poster|data|longdesc)\s*=\s*)(["']?)cid:([^"'\s>]+)"#
    )
    .unwrap();
}

/// URL under which the inline part `content_id` of mail `mail_id` is served.
pub fn content_url(base_url: &str, mail_id: u64, content_id: &str) -> String {
    format!(
        "{}/mails/{mail_id}/html/{}",
        base_url.trim_end_matches('/'),
        normalize_content_id(content_id)
    )
}

/// Rewrite every resolvable `cid:` reference in `html`.
///
/// A reference resolves when one of `body`'s attachments carries that
/// Content-ID; everything else passes through untouched.
pub fn sanitize_html(html: &str, body: &MessageBody, base_url: &str, mail_id: u64) -> String {
    CID_REFERENCE
        .replace_all(html, |caps: &Captures<'_>| {
            let reference = &caps[3];
            let decoded = String::from_utf8_lossy(&percent_decode(reference)).into_owned();
            if body.find_by_content_id(&decoded).is_none() {
                debug!(mail_id, content_id = %decoded, "Leaving unresolved cid reference");
                return caps[0].to_string();
            }
            format!(
                "{}{}{}",
                &caps[1],
                &caps[2],
                content_url(base_url, mail_id, reference)
            )
        })
        .into_owned()
}

/// The attachment of `body` whose Content-ID is `content_id`.
pub fn find_by_content_id<'a>(body: &'a MessageBody, content_id: &str) -> Result<&'a Attachment> {
    body.find_by_content_id(content_id).ok_or_else(|| {
        MailsinkError::NotFound(format!(
            "content-id {}",
            normalize_content_id(content_id)
        ))
    })
}
