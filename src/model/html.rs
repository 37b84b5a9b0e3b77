//! Serializable HTML query results.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// One node of a query result.
///
/// Serializes the way clients of the query endpoint expect it:
/// - element: `{"<tag>": {"children": [...]}}`
/// - text:    `{"text": "<value>"}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Element { tag: String, children: Vec<HtmlNode> },
    Text(String),
}

impl HtmlNode {
    pub fn element(tag: impl Into<String>, children: Vec<HtmlNode>) -> Self {
        Self::Element {
            tag: tag.into(),
            children,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

struct Children<'a>(&'a [HtmlNode]);

impl Serialize for Children<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("children", self.0)?;
        map.end()
    }
}

impl Serialize for HtmlNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            HtmlNode::Element { tag, children } => {
                map.serialize_entry(tag, &Children(children))?;
            }
            HtmlNode::Text(text) => map.serialize_entry("text", text)?,
        }
        map.end()
    }
}
