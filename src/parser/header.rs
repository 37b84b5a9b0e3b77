//! MIME header helpers: RFC 2045 parameters with RFC 2231 continuations and
//! charsets, RFC 2047 encoded-words, Content-ID normalisation and `Date:`
//! parsing.
//!
//! Everything here is pure string processing and independent of the MIME
//! library used to walk the part tree.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Decoded `name=value` parameters of a structured header such as
/// `Content-Type` or `Content-Disposition`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderParams {
    params: Vec<(String, String)>,
}

impl HeaderParams {
    /// Look up a parameter by (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// One section of an RFC 2231 parameter: `name*N` or `name*N*`.
struct Section {
    index: u32,
    encoded: bool,
    value: String,
}

/// Merge raw parameter pairs into decoded parameters.
///
/// Handles the three RFC 2231 forms next to plain RFC 2045 values:
/// - `name*=charset'lang'%XX…` (extended value)
/// - `name*0=…; name*1=…` (continuations)
/// - `name*0*=charset'lang'%XX…; name*1*=%XX…` (encoded continuations)
///
/// Extended values win over a plain value of the same name. Plain values that
/// carry RFC 2047 encoded-words are decoded as well, since many clients emit
/// `filename="=?UTF-8?B?…?="`.
pub fn collect_parameters<'a, I>(pairs: I) -> HeaderParams
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut plain: Vec<(String, String)> = Vec::new();
    let mut extended: Vec<(String, String)> = Vec::new();
    let mut sections: Vec<(String, Vec<Section>)> = Vec::new();

    for (raw_name, value) in pairs {
        let name = raw_name.trim().to_ascii_lowercase();
        match name.split_once('*') {
            None => plain.push((name, value.to_string())),
            Some((base, "")) => extended.push((base.to_string(), value.to_string())),
            Some((base, rest)) => {
                let (digits, encoded) = match rest.strip_suffix('*') {
                    Some(d) => (d, true),
                    None => (rest, false),
                };
                let Ok(index) = digits.parse::<u32>() else {
                    // Not a continuation marker; keep it under its literal name.
                    plain.push((name.clone(), value.to_string()));
                    continue;
                };
                let section = Section {
                    index,
                    encoded,
                    value: value.to_string(),
                };
                match sections.iter_mut().find(|(n, _)| n == base) {
                    Some((_, list)) => list.push(section),
                    None => sections.push((base.to_string(), vec![section])),
                }
            }
        }
    }

    let mut params: Vec<(String, String)> = Vec::new();
    let mut set = |name: String, value: String| {
        if let Some(slot) = params.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            params.push((name, value));
        }
    };

    for (name, value) in plain {
        let value = if value.contains("=?") {
            decode_encoded_words(&value)
        } else {
            // Some parsers hand over an already-merged but still encoded value.
            decode_rfc2231_value(&value).unwrap_or(value)
        };
        set(name, value);
    }
    for (name, mut list) in sections {
        list.sort_by_key(|s| s.index);
        set(name, join_sections(&list));
    }
    for (name, value) in extended {
        let decoded = decode_rfc2231_value(&value).unwrap_or_else(|| percent_decode_lossy(&value));
        set(name, decoded);
    }

    HeaderParams { params }
}

/// Concatenate continuation sections, decoding the encoded ones with the
/// charset announced in the first section.
fn join_sections(sections: &[Section]) -> String {
    let mut charset: Option<String> = None;
    let mut bytes: Vec<u8> = Vec::new();

    for (pos, section) in sections.iter().enumerate() {
        if !section.encoded {
            bytes.extend_from_slice(section.value.as_bytes());
            continue;
        }
        let mut value = section.value.as_str();
        if pos == 0 {
            if let Some((cs, _lang, rest)) = split_charset_prefix(value) {
                if !cs.is_empty() {
                    charset = Some(cs.to_string());
                }
                value = rest;
            }
        }
        bytes.extend(percent_decode(value));
    }

    match charset {
        Some(cs) => decode_charset(&cs, &bytes),
        None => String::from_utf8_lossy(&bytes).into_owned(),
    }
}

/// Decode a single RFC 2231 extended value: `charset'language'percent-data`.
///
/// Returns `None` when the value does not carry the two-apostrophe prefix.
///
/// # Examples
/// - `"UTF-8''example.pdf"` → `"example.pdf"`
/// - `"iso-8859-1'en'r%E9sum%E9.txt"` → `"résumé.txt"`
pub fn decode_rfc2231_value(value: &str) -> Option<String> {
    let (charset, _lang, data) = split_charset_prefix(value)?;
    let bytes = percent_decode(data);
    if charset.is_empty() {
        return Some(String::from_utf8_lossy(&bytes).into_owned());
    }
    Some(decode_charset(charset, &bytes))
}

/// Split `charset'lang'rest`. The charset must be empty or a known label, so
/// that ordinary names such as `o'brien's.pdf` are left alone.
fn split_charset_prefix(value: &str) -> Option<(&str, &str, &str)> {
    let (charset, rest) = value.split_once('\'')?;
    let (lang, data) = rest.split_once('\'')?;
    if !charset.is_empty() && encoding_rs::Encoding::for_label(charset.as_bytes()).is_none() {
        return None;
    }
    Some((charset, lang, data))
}

/// Percent-decode into raw bytes. Invalid escapes are kept literally.
pub fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(b) = hex_byte(bytes[i + 1], bytes[i + 2]) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_byte(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}

fn percent_decode_lossy(input: &str) -> String {
    String::from_utf8_lossy(&percent_decode(input)).into_owned()
}

/// Strip surrounding whitespace and angle brackets from a Content-ID or
/// Message-ID, and a leading `cid:` scheme if present.
///
/// `"<1367760625.51865ef16e3f6@swift.generated>"` → `"1367760625.51865ef16e3f6@swift.generated"`
pub fn normalize_content_id(value: &str) -> &str {
    let trimmed = value.trim();
    let trimmed = match trimmed.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("cid:") => &trimmed[4..],
        _ => trimmed,
    };
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('>').unwrap_or(trimmed);
    trimmed.trim()
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two adjacent encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_ascii_uppercase().as_str() {
        "B" => base64::engine::general_purpose::STANDARD
            .decode(encoded_text.trim())
            .or_else(|_| {
                base64::engine::general_purpose::STANDARD_NO_PAD
                    .decode(encoded_text.trim().trim_end_matches('='))
            })
            .ok()?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    // RFC 2231 §5 allows a language suffix: charset*lang
    let charset = charset.split('*').next().unwrap_or(charset);
    let text = decode_charset(charset, &bytes);

    Some(DecodedWord {
        text,
        consumed: total_consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => match hex_byte(bytes[i + 1], bytes[i + 2]) {
                Some(byte) => {
                    result.push(byte);
                    i += 3;
                }
                None => {
                    result.push(b'=');
                    i += 1;
                }
            },
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
pub fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.trim().to_ascii_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.trim().as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

/// Parse a `Date:` header value.
///
/// Accepts RFC 2822, RFC 3339 and a few broken variants seen in the wild.
pub fn parse_date(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // "Thu, " prefix confuses the non-RFC formats below.
    let no_dow = match trimmed.split_once(',') {
        Some((dow, rest)) if dow.len() == 3 => rest.trim(),
        _ => trimmed,
    };

    const FORMATS: [&str; 4] = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(no_dow, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(ndt) = NaiveDateTime::parse_from_str(no_dow, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc2231_extended_value() {
        assert_eq!(
            decode_rfc2231_value("UTF-8''example.pdf").as_deref(),
            Some("example.pdf")
        );
        assert_eq!(
            decode_rfc2231_value("utf-8''%65%78ample.pdf").as_deref(),
            Some("example.pdf")
        );
    }

    #[test]
    fn test_rfc2231_latin1_with_language() {
        assert_eq!(
            decode_rfc2231_value("iso-8859-1'en'r%E9sum%E9.txt").as_deref(),
            Some("résumé.txt")
        );
    }

    #[test]
    fn test_rfc2231_without_prefix_is_none() {
        assert_eq!(decode_rfc2231_value("example.pdf"), None);
        assert_eq!(decode_rfc2231_value("it's mine"), None);
        assert_eq!(decode_rfc2231_value("o'brien's.pdf"), None);
    }

    #[test]
    fn test_collect_encoded_continuations() {
        let params = collect_parameters([
            ("filename*1*", "ple.pdf"),
            ("filename*0*", "UTF-8''exam"),
        ]);
        assert_eq!(params.get("filename"), Some("example.pdf"));
    }

    #[test]
    fn test_collect_mixed_continuations() {
        let params = collect_parameters([
            ("Filename*0*", "utf-8''%C3%BCber"),
            ("filename*1", "-report.pdf"),
        ]);
        assert_eq!(params.get("filename"), Some("über-report.pdf"));
    }

    #[test]
    fn test_collect_extended_wins_over_plain() {
        let params = collect_parameters([
            ("filename", "fallback.pdf"),
            ("filename*", "UTF-8''example.pdf"),
        ]);
        assert_eq!(params.get("filename"), Some("example.pdf"));
    }

    #[test]
    fn test_collect_plain_and_encoded_word() {
        let params = collect_parameters([
            ("name", "=?UTF-8?B?ZXhhbXBsZS5wZGY=?="),
            ("charset", "us-ascii"),
        ]);
        assert_eq!(params.get("name"), Some("example.pdf"));
        assert_eq!(params.get("CHARSET"), Some("us-ascii"));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_percent_decode_keeps_invalid_escapes() {
        assert_eq!(percent_decode("a%2"), b"a%2".to_vec());
        assert_eq!(percent_decode("a%zz"), b"a%zz".to_vec());
        assert_eq!(percent_decode("100%25"), b"100%".to_vec());
    }

    #[test]
    fn test_normalize_content_id() {
        assert_eq!(
            normalize_content_id(" <1367760625.51865ef16e3f6@swift.generated> "),
            "1367760625.51865ef16e3f6@swift.generated"
        );
        assert_eq!(normalize_content_id("cid:part1@x"), "part1@x");
        assert_eq!(normalize_content_id("CID:<part1@x>"), "part1@x");
        assert_eq!(normalize_content_id("plain"), "plain");
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        let input = "=?UTF-8?B?SG9sYSBtdW5kbw==?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        let input = "=?ISO-8859-1?Q?caf=E9?=";
        assert_eq!(decode_encoded_words(input), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        let input = "=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?=";
        assert_eq!(decode_encoded_words(input), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        let input = "Re: =?UTF-8?B?SG9sYQ==?= there";
        assert_eq!(decode_encoded_words(input), "Re: Hola there");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        let input = "=?Windows-1252?Q?M=FCller?=";
        assert_eq!(decode_encoded_words(input), "Müller");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 16 May 2013 12:30:25 +0200").unwrap();
        assert_eq!(dt.to_rfc3339(), "2013-05-16T10:30:25+00:00");
    }

    #[test]
    fn test_parse_date_variants() {
        assert!(parse_date("2024-01-15 10:30:00").is_some());
        assert!(parse_date("2024-01-15T10:30:00Z").is_some());
        assert!(parse_date("  ").is_none());
        assert!(parse_date("not a date").is_none());
    }
}
