//! Tree construction with browser-like error recovery.
//!
//! Covers the recovery rules that matter for mail HTML: implied `<html>` and
//! `<body>`, `<head>` only when head content is present, void elements,
//! paragraphs closed by block elements, list items and table cells closed by
//! their siblings, and end tags without a matching open element ignored.
//! Whatever is still open at the end of input is closed implicitly.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::dom::{Document, NodeId};
use super::tokenizer::{Token, Tokenizer};

const VOID: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements that belong in `<head>` when they appear before any body content.
const HEAD_CONTENT: &[&str] = &[
    "base", "link", "meta", "noscript", "script", "style", "template", "title",
];

/// Start tags that close an open `<p>`.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "center", "dd", "details", "dialog", "dir", "div",
    "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hgroup", "hr", "li", "main", "menu", "nav", "ol", "p", "pre", "section",
    "summary", "table", "ul",
];

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Elements that stop the search for an element to close.
const SCOPE_BOUNDARY: &[&str] = &[
    "applet", "button", "caption", "html", "marquee", "object", "table", "td", "template", "th",
];

/// Deepest nesting of open elements. Start tags beyond it are attached to the
/// innermost open element as childless siblings.
pub const MAX_DEPTH: usize = 512;

/// Parse `input` into a [`Document`]. Never fails.
pub fn parse_html(input: &str) -> Document {
    let mut builder = TreeBuilder::new();
    for token in Tokenizer::new(input) {
        builder.process(token);
    }
    builder.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    BeforeBody,
    InBody,
}

struct TreeBuilder {
    doc: Document,
    html: NodeId,
    head: Option<NodeId>,
    body: Option<NodeId>,
    /// Open elements, outermost first. Always starts with `html`, followed
    /// by `body` once it exists.
    open: Vec<NodeId>,
    /// How many elements of each name are on `open`.
    counts: HashMap<String, usize>,
    mode: Mode,
}

impl TreeBuilder {
    fn new() -> Self {
        let mut doc = Document::new();
        let html = doc.create_element("html", Vec::new());
        doc.append(Document::ROOT, html);
        Self {
            doc,
            html,
            head: None,
            body: None,
            open: vec![html],
            counts: HashMap::from([("html".to_string(), 1)]),
            mode: Mode::BeforeBody,
        }
    }

    fn push_open(&mut self, id: NodeId) {
        if self.open.len() >= MAX_DEPTH {
            debug!(depth = self.open.len(), "Nesting limit reached, flattening");
            return;
        }
        if let Some(name) = self.doc.element_name(id) {
            *self.counts.entry(name.to_string()).or_default() += 1;
        }
        self.open.push(id);
    }

    fn pop_open(&mut self) {
        let Some(id) = self.open.pop() else {
            return;
        };
        if let Some(name) = self.doc.element_name(id) {
            if let Some(count) = self.counts.get_mut(name) {
                *count = count.saturating_sub(1);
            }
        }
    }

    fn truncate_open(&mut self, len: usize) {
        while self.open.len() > len {
            self.pop_open();
        }
    }

    fn is_open(&self, name: &str) -> bool {
        self.counts.get(name).is_some_and(|&count| count > 0)
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.html)
    }

    fn current_name(&self) -> &str {
        self.doc.element_name(self.current()).unwrap_or("")
    }

    fn process(&mut self, token: Token) {
        match self.mode {
            Mode::BeforeBody => self.before_body(token),
            Mode::InBody => self.in_body(token),
        }
    }

    fn before_body(&mut self, token: Token) {
        match token {
            Token::Comment | Token::Doctype => {}
            Token::Text(text) => {
                // Text inside <title>, <style> etc. stays in head.
                let current = self.current();
                if current != self.html && Some(current) != self.head {
                    self.doc.append_text(current, &text);
                    return;
                }
                let trimmed = text.trim_start_matches(|c: char| c.is_ascii_whitespace());
                if !trimmed.is_empty() {
                    self.start_body(Vec::new());
                    self.in_body(Token::Text(trimmed.to_string()));
                }
            }
            Token::StartTag { name, attrs, .. } if name == "html" => {
                self.doc.merge_attributes(self.html, attrs);
            }
            Token::StartTag { name, .. } if name == "head" => {
                if self.head.is_none() {
                    let head = self.ensure_head();
                    self.push_open(head);
                }
            }
            Token::StartTag { name, attrs, .. } if name == "body" => {
                self.start_body(attrs);
            }
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } if HEAD_CONTENT.contains(&name.as_str()) => {
                let head = self.ensure_head();
                let element = self.doc.create_element(&name, attrs);
                self.doc.append(head, element);
                if !VOID.contains(&name.as_str()) && !self_closing {
                    self.push_open(element);
                }
            }
            Token::EndTag { name } if name == "head" => {
                self.pop_until(|b, id| Some(id) == b.head);
            }
            Token::EndTag { name } if self.open.len() > 1 && self.current_name() == name => {
                self.pop_open();
            }
            Token::EndTag { name } if name != "br" && name != "p" => {}
            other => {
                self.start_body(Vec::new());
                self.in_body(other);
            }
        }
    }

    fn ensure_head(&mut self) -> NodeId {
        match self.head {
            Some(head) => head,
            None => {
                let head = self.doc.create_element("head", Vec::new());
                self.doc.append(self.html, head);
                self.head = Some(head);
                head
            }
        }
    }

    fn start_body(&mut self, attrs: Vec<(String, String)>) {
        self.truncate_open(1);
        let body = self.doc.create_element("body", attrs);
        self.doc.append(self.html, body);
        self.push_open(body);
        self.body = Some(body);
        self.mode = Mode::InBody;
        trace!("Opened body");
    }

    fn in_body(&mut self, token: Token) {
        match token {
            Token::Comment | Token::Doctype => {}
            Token::Text(text) => {
                let current = self.current();
                self.doc.append_text(current, &text);
            }
            Token::StartTag { name, attrs, .. } if name == "html" => {
                self.doc.merge_attributes(self.html, attrs);
            }
            Token::StartTag { name, attrs, .. } if name == "body" => {
                if let Some(body) = self.body {
                    self.doc.merge_attributes(body, attrs);
                }
            }
            Token::StartTag { name, .. } if name == "head" => {}
            Token::StartTag {
                name,
                attrs,
                self_closing,
            } => self.start_tag(&name, attrs, self_closing),
            Token::EndTag { name } => self.end_tag(&name),
        }
    }

    fn start_tag(&mut self, name: &str, attrs: Vec<(String, String)>, self_closing: bool) {
        if CLOSES_P.contains(&name) && self.in_scope("p") {
            self.close("p");
        }

        match name {
            _ if HEADINGS.contains(&name)
                && HEADINGS.contains(&self.current_name())
                && self.open.len() > self.open_floor() =>
            {
                self.pop_open();
            }
            "li" => self.close_item(&["li"], &["ol", "ul", "menu"]),
            "dd" | "dt" => self.close_item(&["dd", "dt"], &["dl"]),
            "option" => self.pop_if_current("option"),
            "optgroup" => {
                self.pop_if_current("option");
                self.pop_if_current("optgroup");
            }
            "tr" => {
                self.close_item(&["td", "th"], &["tr", "table"]);
                self.close_item(&["tr"], &["table", "tbody", "thead", "tfoot"]);
            }
            "td" | "th" => self.close_item(&["td", "th"], &["tr", "table"]),
            "tbody" | "thead" | "tfoot" => {
                self.close_item(&["td", "th"], &["tr", "table"]);
                self.close_item(&["tr"], &["table", "tbody", "thead", "tfoot"]);
                self.close_item(&["tbody", "thead", "tfoot"], &["table"]);
            }
            _ => {}
        }

        let element = self.doc.create_element(name, attrs);
        let parent = self.current();
        self.doc.append(parent, element);

        let foreign = self.in_foreign_content();
        if VOID.contains(&name) || (self_closing && foreign) {
            return;
        }
        self.push_open(element);
    }

    fn end_tag(&mut self, name: &str) {
        match name {
            // Content after </body> or </html> still belongs to the body.
            "body" | "html" => {}
            "br" => self.start_tag("br", Vec::new(), false),
            "p" if !self.in_scope("p") => {
                let p = self.doc.create_element("p", Vec::new());
                let parent = self.current();
                self.doc.append(parent, p);
            }
            _ if self.is_open(name) => self.close(name),
            _ => trace!(tag = name, "Ignoring unmatched end tag"),
        }
    }

    fn is_named(&self, id: NodeId, name: &str) -> bool {
        self.doc.element_name(id) == Some(name)
    }

    fn in_scope(&self, name: &str) -> bool {
        if !self.is_open(name) {
            return false;
        }
        for &id in self.open.iter().rev() {
            let Some(tag) = self.doc.element_name(id) else {
                continue;
            };
            if tag == name {
                return true;
            }
            if SCOPE_BOUNDARY.contains(&tag) {
                return false;
            }
        }
        false
    }

    fn in_foreign_content(&self) -> bool {
        self.is_open("svg") || self.is_open("math")
    }

    /// Pop elements up to and including the innermost `name`.
    fn close(&mut self, name: &str) {
        self.pop_until(|b, id| b.is_named(id, name));
    }

    fn pop_until(&mut self, pred: impl Fn(&Self, NodeId) -> bool) {
        let floor = self.open_floor();
        let found = self.open[floor..].iter().rposition(|&id| pred(self, id));
        if let Some(pos) = found {
            self.truncate_open(floor + pos);
        }
    }

    /// Index of the first element that may be popped: never `html`, and
    /// never `body` once it exists.
    fn open_floor(&self) -> usize {
        if self.body.is_some() {
            2
        } else {
            1
        }
    }

    /// Close an open `items` element unless one of `boundaries` comes first.
    fn close_item(&mut self, items: &[&str], boundaries: &[&str]) {
        if !items.iter().any(|item| self.is_open(item)) {
            return;
        }
        let floor = self.open_floor();
        let target = self.open[floor..].iter().rev().find_map(|&id| {
            let tag = self.doc.element_name(id)?;
            if items.contains(&tag) {
                Some(Some(id))
            } else if boundaries.contains(&tag) || SCOPE_BOUNDARY.contains(&tag) {
                Some(None)
            } else {
                None
            }
        });
        if let Some(Some(id)) = target {
            self.pop_until(|_, open| open == id);
        }
    }

    fn pop_if_current(&mut self, name: &str) {
        if self.current_name() == name && self.open.len() > self.open_floor() {
            self.pop_open();
        }
    }

    fn finish(mut self) -> Document {
        if self.body.is_none() {
            self.start_body(Vec::new());
        }
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::html::HtmlNode;
    use HtmlNode as N;

    fn tree(input: &str) -> Vec<HtmlNode> {
        let doc = parse_html(input);
        doc.to_html_nodes(Document::ROOT)
    }

    fn el(tag: &str, children: Vec<HtmlNode>) -> HtmlNode {
        N::element(tag, children)
    }

    #[test]
    fn test_implied_html_and_body() {
        assert_eq!(
            tree("<div><p>p inner text"),
            vec![el(
                "html",
                vec![el(
                    "body",
                    vec![el("div", vec![el("p", vec![N::text("p inner text")])])]
                )]
            )]
        );
    }

    #[test]
    fn test_empty_input_still_has_body() {
        assert_eq!(tree(""), vec![el("html", vec![el("body", vec![])])]);
    }

    #[test]
    fn test_head_only_when_needed() {
        assert_eq!(
            tree("<title>T</title><p>x"),
            vec![el(
                "html",
                vec![
                    el("head", vec![el("title", vec![N::text("T")])]),
                    el("body", vec![el("p", vec![N::text("x")])]),
                ]
            )]
        );
    }

    #[test]
    fn test_full_document_with_whitespace() {
        let input = "<!DOCTYPE html>\n<html>\n<head>\n<style>p{}</style>\n</head>\n<body>\n<p>a</p>\n</body>\n</html>\n";
        assert_eq!(
            tree(input),
            vec![el(
                "html",
                vec![
                    el("head", vec![el("style", vec![N::text("p{}")])]),
                    el(
                        "body",
                        vec![N::text("\n"), el("p", vec![N::text("a")]), N::text("\n\n\n")]
                    ),
                ]
            )]
        );
    }

    #[test]
    fn test_block_closes_paragraph() {
        assert_eq!(
            tree("<p>one<div>two</div>"),
            vec![el(
                "html",
                vec![el(
                    "body",
                    vec![
                        el("p", vec![N::text("one")]),
                        el("div", vec![N::text("two")]),
                    ]
                )]
            )]
        );
    }

    #[test]
    fn test_list_items_close_each_other() {
        let doc = parse_html("<ul><li>a<li>b</ul>");
        let html = doc.to_html_nodes(Document::ROOT);
        assert_eq!(
            html,
            vec![el(
                "html",
                vec![el(
                    "body",
                    vec![el(
                        "ul",
                        vec![el("li", vec![N::text("a")]), el("li", vec![N::text("b")])]
                    )]
                )]
            )]
        );
    }

    #[test]
    fn test_void_elements_and_stray_end_tags() {
        assert_eq!(
            tree("a<br>b</span>c<img src=x>"),
            vec![el(
                "html",
                vec![el(
                    "body",
                    vec![
                        N::text("a"),
                        el("br", vec![]),
                        N::text("bc"),
                        el("img", vec![]),
                    ]
                )]
            )]
        );
    }

    #[test]
    fn test_table_cells() {
        assert_eq!(
            tree("<table><tr><td>1<td>2<tr><td>3</table>"),
            vec![el(
                "html",
                vec![el(
                    "body",
                    vec![el(
                        "table",
                        vec![
                            el(
                                "tr",
                                vec![el("td", vec![N::text("1")]), el("td", vec![N::text("2")])]
                            ),
                            el("tr", vec![el("td", vec![N::text("3")])]),
                        ]
                    )]
                )]
            )]
        );
    }

    #[test]
    fn test_content_after_body_end_stays_in_body() {
        assert_eq!(
            tree("<body>a</body>b"),
            vec![el("html", vec![el("body", vec![N::text("ab")])])]
        );
    }

    #[test]
    fn test_stray_paragraph_end_tag() {
        assert_eq!(
            tree("x</p>"),
            vec![el("html", vec![el("body", vec![N::text("x"), el("p", vec![])])])]
        );
    }

    #[test]
    fn test_nested_same_name_elements() {
        assert_eq!(
            tree("<div><div>a</div>b</div>c"),
            vec![el(
                "html",
                vec![el(
                    "body",
                    vec![
                        el("div", vec![el("div", vec![N::text("a")]), N::text("b")]),
                        N::text("c"),
                    ]
                )]
            )]
        );
    }

    fn max_depth(doc: &Document) -> usize {
        (0..doc.len())
            .map(|id| {
                let (mut depth, mut node) = (0, id);
                while let Some(parent) = doc.node(node).parent {
                    depth += 1;
                    node = parent;
                }
                depth
            })
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_nesting_is_capped() {
        let doc = parse_html(&"<div>".repeat(2_000));
        assert_eq!(max_depth(&doc), MAX_DEPTH + 1);
        assert_eq!(doc.len(), 2_003);
    }

    #[test]
    fn test_deep_nesting_closes_cleanly() {
        let input = format!(
            "{}{}<p>after",
            "<span>".repeat(50_000),
            "</span>".repeat(50_000)
        );
        let doc = parse_html(&input);
        let nodes = doc.to_html_nodes(Document::ROOT);
        let [N::Element { children, .. }] = nodes.as_slice() else {
            panic!("expected a single html element");
        };
        let [N::Element { children: body, .. }] = children.as_slice() else {
            panic!("expected a single body element");
        };
        assert_eq!(body.len(), 2);
        assert_eq!(body[1], el("p", vec![N::text("after")]));
    }
}
