//! Turn a raw message into a [`StoredMessage`] ready to be saved.

use chrono::DateTime;
use mail_parser::{Addr, MessageParser};

use crate::error::{MailsinkError, Result};
use crate::model::mail::StoredMessage;
use crate::parser::body::extract_body;
use crate::parser::header::parse_date;
use crate::parser::mime::{self, parse_mime};

/// Parse `raw` and precompute the fields a store keeps next to the source:
/// the HTML part, the envelope headers and the attachment count.
pub fn capture(raw: &[u8]) -> Result<StoredMessage> {
    let body = extract_body(&parse_mime(raw)?);

    let message = MessageParser::default()
        .parse(mime::skip_from_line(raw))
        .ok_or_else(|| MailsinkError::MalformedMessage("source is not an RFC 5322 message".into()))?;

    let from = message
        .from()
        .and_then(|addrs| addrs.first())
        .map(format_address)
        .unwrap_or_default();

    let to = message
        .to()
        .map(|addrs| addrs.iter().map(format_address).collect())
        .unwrap_or_default();

    let date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or_else(|| message.header_raw("Date").and_then(parse_date));

    let mut stored = StoredMessage::new(raw);
    stored.subject = message.subject().unwrap_or_default().to_string();
    stored.from = from;
    stored.to = to;
    stored.date = date;
    stored.attachment_count = body.attachments.len();
    if body.has_html() {
        stored.html = Some(body.html);
    }
    Ok(stored)
}

fn format_address(addr: &Addr<'_>) -> String {
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) if !name.is_empty() => format!("{name} <{address}>"),
        (_, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}
