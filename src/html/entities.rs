//! HTML character references.

use std::borrow::Cow;

/// Named references understood by the decoder. Email HTML rarely uses more
/// than this.
const NAMED: &[(&str, &str)] = &[
    ("AElig", "\u{C6}"),
    ("Aacute", "\u{C1}"),
    ("Agrave", "\u{C0}"),
    ("Auml", "\u{C4}"),
    ("Ccedil", "\u{C7}"),
    ("Eacute", "\u{C9}"),
    ("Egrave", "\u{C8}"),
    ("Ntilde", "\u{D1}"),
    ("Oacute", "\u{D3}"),
    ("Ouml", "\u{D6}"),
    ("Uacute", "\u{DA}"),
    ("Uuml", "\u{DC}"),
    ("aacute", "\u{E1}"),
    ("acirc", "\u{E2}"),
    ("acute", "\u{B4}"),
    ("aelig", "\u{E6}"),
    ("agrave", "\u{E0}"),
    ("amp", "&"),
    ("apos", "'"),
    ("aring", "\u{E5}"),
    ("atilde", "\u{E3}"),
    ("auml", "\u{E4}"),
    ("bull", "\u{2022}"),
    ("ccedil", "\u{E7}"),
    ("cent", "\u{A2}"),
    ("copy", "\u{A9}"),
    ("dagger", "\u{2020}"),
    ("deg", "\u{B0}"),
    ("divide", "\u{F7}"),
    ("eacute", "\u{E9}"),
    ("ecirc", "\u{EA}"),
    ("egrave", "\u{E8}"),
    ("euml", "\u{EB}"),
    ("euro", "\u{20AC}"),
    ("frac12", "\u{BD}"),
    ("frac14", "\u{BC}"),
    ("frac34", "\u{BE}"),
    ("gt", ">"),
    ("hellip", "\u{2026}"),
    ("iacute", "\u{ED}"),
    ("icirc", "\u{EE}"),
    ("iexcl", "\u{A1}"),
    ("igrave", "\u{EC}"),
    ("iquest", "\u{BF}"),
    ("iuml", "\u{EF}"),
    ("laquo", "\u{AB}"),
    ("ldquo", "\u{201C}"),
    ("lsaquo", "\u{2039}"),
    ("lsquo", "\u{2018}"),
    ("lt", "<"),
    ("mdash", "\u{2014}"),
    ("middot", "\u{B7}"),
    ("nbsp", "\u{A0}"),
    ("ndash", "\u{2013}"),
    ("ntilde", "\u{F1}"),
    ("oacute", "\u{F3}"),
    ("ocirc", "\u{F4}"),
    ("ograve", "\u{F2}"),
    ("oslash", "\u{F8}"),
    ("otilde", "\u{F5}"),
    ("ouml", "\u{F6}"),
    ("para", "\u{B6}"),
    ("plusmn", "\u{B1}"),
    ("pound", "\u{A3}"),
    ("quot", "\""),
    ("raquo", "\u{BB}"),
    ("rdquo", "\u{201D}"),
    ("reg", "\u{AE}"),
    ("rsaquo", "\u{203A}"),
    ("rsquo", "\u{2019}"),
    ("sbquo", "\u{201A}"),
    ("sect", "\u{A7}"),
    ("shy", "\u{AD}"),
    ("sup1", "\u{B9}"),
    ("sup2", "\u{B2}"),
    ("sup3", "\u{B3}"),
    ("szlig", "\u{DF}"),
    ("times", "\u{D7}"),
    ("trade", "\u{2122}"),
    ("uacute", "\u{FA}"),
    ("ucirc", "\u{FB}"),
    ("ugrave", "\u{F9}"),
    ("uuml", "\u{FC}"),
    ("yen", "\u{A5}"),
    ("yuml", "\u{FF}"),
    ("zwj", "\u{200D}"),
    ("zwnj", "\u{200C}"),
];

/// References browsers still accept without the trailing `;`.
const LEGACY: &[&str] = &["amp", "copy", "gt", "lt", "nbsp", "quot", "reg"];

/// Decode character references in text content.
pub fn decode_text(input: &str) -> Cow<'_, str> {
    decode(input, false)
}

/// Decode character references in an attribute value. A legacy reference
/// without `;` followed by an alphanumeric or `=` stays literal, so query
/// strings such as `?a=1&copy=2` survive.
pub fn decode_attribute(input: &str) -> Cow<'_, str> {
    decode(input, true)
}

fn decode(input: &str, in_attribute: bool) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        match decode_reference(after, in_attribute) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &after[consumed..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode the reference at the start of `s` (just after the `&`).
/// Returns the replacement and how many bytes of `s` it consumed.
fn decode_reference(s: &str, in_attribute: bool) -> Option<(String, usize)> {
    if let Some(num) = s.strip_prefix('#') {
        return decode_numeric(num).map(|(c, used)| (c.to_string(), used + 1));
    }

    let name_len = s
        .bytes()
        .take(32)
        .take_while(u8::is_ascii_alphanumeric)
        .count();
    if name_len == 0 {
        return None;
    }
    let name = &s[..name_len];

    if s[name_len..].starts_with(';') {
        if let Some((_, value)) = NAMED.iter().find(|(n, _)| *n == name) {
            return Some((value.to_string(), name_len + 1));
        }
    }

    let legacy = LEGACY
        .iter()
        .filter(|l| name.starts_with(**l))
        .max_by_key(|l| l.len())?;
    let next = s.as_bytes().get(legacy.len()).copied();
    if in_attribute && next.is_some_and(|b| b.is_ascii_alphanumeric() || b == b'=') {
        return None;
    }
    let (_, value) = NAMED.iter().find(|(n, _)| n == legacy)?;
    Some((value.to_string(), legacy.len()))
}

fn decode_numeric(s: &str) -> Option<(char, usize)> {
    let (digits_start, radix) = match s.as_bytes().first() {
        Some(b'x') | Some(b'X') => (1, 16),
        _ => (0, 10),
    };
    let digits = s[digits_start..]
        .bytes()
        .take_while(|b| (*b as char).is_digit(radix))
        .count();
    if digits == 0 {
        return None;
    }
    let end = digits_start + digits;
    let value = u32::from_str_radix(&s[digits_start..end], radix).unwrap_or(u32::MAX);
    let c = match value {
        0 => '\u{FFFD}',
        v => char::from_u32(v).unwrap_or('\u{FFFD}'),
    };
    let used = if s[end..].starts_with(';') { end + 1 } else { end };
    Some((c, used))
}
