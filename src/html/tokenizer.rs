//! Forgiving HTML tokenizer.
//!
//! Never fails: anything that does not look like markup is text, comments and
//! doctypes are reported but carry no content, and a tag cut off by the end of
//! input is dropped the way browsers drop it.

use super::entities;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    Comment,
    Doctype,
}

/// Elements whose content is taken verbatim up to the matching end tag.
const RAW_TEXT: &[&str] = &["iframe", "noembed", "noframes", "script", "style", "xmp"];

/// Like raw text, but character references are decoded.
const ESCAPABLE_RAW_TEXT: &[&str] = &["textarea", "title"];

pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    /// Set after a raw-text start tag: (element name, decode references).
    raw_text: Option<(String, bool)>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            raw_text: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn raw_text_token(&mut self, name: &str, decode: bool) -> Option<Token> {
        let rest = self.rest();
        let end = find_end_tag(rest, name).unwrap_or(rest.len());
        self.pos += end;
        let content = &rest[..end];
        if content.is_empty() {
            return self.next();
        }
        let text = if decode {
            entities::decode_text(content).into_owned()
        } else {
            content.to_string()
        };
        Some(Token::Text(text))
    }

    fn text_token(&mut self) -> Token {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        let mut i = self.pos;
        while i < bytes.len() {
            if bytes[i] == b'<' && i > start && starts_markup(&self.input[i..]) {
                break;
            }
            i += 1;
            // Step over the rest of a multi-byte character.
            while i < bytes.len() && !self.input.is_char_boundary(i) {
                i += 1;
            }
        }
        self.pos = i;
        Token::Text(entities::decode_text(&self.input[start..i]).into_owned())
    }

    /// Skip past the next `terminator` (or to the end of input).
    fn skip_past(&mut self, terminator: &str) {
        match self.rest().find(terminator) {
            Some(idx) => self.pos += idx + terminator.len(),
            None => self.pos = self.input.len(),
        }
    }

    fn tag(&mut self) -> Option<Token> {
        let rest = self.rest();
        let is_end = rest.starts_with("</");
        let mut cursor = Cursor::new(rest, if is_end { 2 } else { 1 });

        let name = cursor.take_while(|b| !b.is_ascii_whitespace() && b != b'/' && b != b'>');
        let name = name.to_ascii_lowercase();

        let mut attrs: Vec<(String, String)> = Vec::new();
        let mut self_closing = false;
        loop {
            cursor.skip_whitespace();
            match cursor.peek() {
                None => {
                    // EOF inside a tag: drop it.
                    self.pos = self.input.len();
                    return None;
                }
                Some(b'>') => {
                    cursor.advance(1);
                    break;
                }
                Some(b'/') => {
                    cursor.advance(1);
                    if cursor.peek() == Some(b'>') {
                        self_closing = true;
                    }
                }
                Some(_) => {
                    let (attr_name, value) = cursor.attribute();
                    if !attr_name.is_empty() && !attrs.iter().any(|(n, _)| *n == attr_name) {
                        attrs.push((attr_name, value));
                    }
                }
            }
        }
        self.pos += cursor.pos;

        if is_end {
            return Some(Token::EndTag { name });
        }

        if RAW_TEXT.contains(&name.as_str()) {
            self.raw_text = Some((name.clone(), false));
        } else if ESCAPABLE_RAW_TEXT.contains(&name.as_str()) {
            self.raw_text = Some((name.clone(), true));
        }

        Some(Token::StartTag {
            name,
            attrs,
            self_closing,
        })
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some((name, decode)) = self.raw_text.take() {
            return self.raw_text_token(&name, decode);
        }

        let rest = self.rest();
        if rest.is_empty() {
            return None;
        }

        if !starts_markup(rest) {
            return Some(self.text_token());
        }

        if rest.starts_with("<!--") {
            self.pos += 4;
            self.skip_past("-->");
            return Some(Token::Comment);
        }
        if rest.starts_with("<!") {
            let doctype = rest
                .as_bytes()
                .get(2..9)
                .is_some_and(|word| word.eq_ignore_ascii_case(b"doctype"));
            self.skip_past(">");
            return Some(if doctype { Token::Doctype } else { Token::Comment });
        }
        if rest.starts_with("<?") || (rest.starts_with("</") && !is_tag_start(&rest[2..])) {
            if rest.starts_with("</>") {
                self.pos += 3;
                return self.next();
            }
            self.skip_past(">");
            return Some(Token::Comment);
        }

        match self.tag() {
            Some(token) => Some(token),
            None => self.next(),
        }
    }
}

/// True when `s` (starting with `<`) opens a tag, comment or declaration.
fn starts_markup(s: &str) -> bool {
    let Some(after) = s.strip_prefix('<') else {
        return false;
    };
    match after.as_bytes().first() {
        Some(b'!') | Some(b'?') => true,
        Some(b'/') => after.len() > 1,
        Some(b) => b.is_ascii_alphabetic(),
        None => false,
    }
}

fn is_tag_start(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_alphabetic)
}

/// Byte offset of `</name` (case-insensitive) followed by a tag boundary.
fn find_end_tag(haystack: &str, name: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(idx) = haystack[from..].find("</") {
        let start = from + idx;
        let name_end = start + 2 + name.len();
        if name_end <= bytes.len()
            && bytes[start + 2..name_end].eq_ignore_ascii_case(name.as_bytes())
            && bytes
                .get(name_end)
                .is_none_or(|b| b.is_ascii_whitespace() || *b == b'/' || *b == b'>')
        {
            return Some(start);
        }
        from = start + 2;
    }
    None
}

/// Byte cursor over the inside of a tag.
struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str, pos: usize) -> Self {
        Self { s, pos }
    }

    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.s.len());
    }

    /// Consume bytes while `pred` holds. Every stop byte is ASCII, so the
    /// returned slice always ends on a char boundary.
    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
        &self.s[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(|b| b.is_ascii_whitespace());
    }

    fn attribute(&mut self) -> (String, String) {
        // A leading '=' belongs to the name.
        let first = if self.peek() == Some(b'=') {
            self.advance(1);
            "="
        } else {
            ""
        };
        let rest =
            self.take_while(|b| !b.is_ascii_whitespace() && b != b'/' && b != b'>' && b != b'=');
        let name = format!("{first}{rest}").to_ascii_lowercase();

        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            return (name, String::new());
        }
        self.advance(1);
        self.skip_whitespace();

        let raw = match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                self.advance(1);
                let value = self.take_while(|b| b != quote);
                self.advance(1);
                value
            }
            _ => self.take_while(|b| !b.is_ascii_whitespace() && b != b'>'),
        };
        (name, entities::decode_attribute(raw).into_owned())
    }
}
