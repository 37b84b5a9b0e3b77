//! HTML Query Engine: permissive HTML parsing into an index arena and an
//! XPath subset evaluated over it.

pub mod builder;
pub mod dom;
pub mod entities;
pub mod tokenizer;
pub mod xpath;

use tracing::debug;

use crate::error::{MailsinkError, Result};
use crate::model::html::HtmlNode;

pub use builder::parse_html;
pub use dom::Document;
pub use xpath::Query;

/// Evaluate `xpath` against `html`.
///
/// The query is validated before anything is parsed: an empty query or a
/// syntax error fails with [`MailsinkError::InvalidQuery`]. An absent or
/// blank HTML part yields no matches rather than an error.
pub fn query_html(html: &str, xpath: &str) -> Result<Vec<HtmlNode>> {
    if xpath.trim().is_empty() {
        return Err(MailsinkError::InvalidQuery("xpath must not be empty".into()));
    }
    let query: Query = xpath.parse()?;

    if html.trim().is_empty() {
        debug!(xpath, "No HTML to query");
        return Ok(Vec::new());
    }

    let doc = parse_html(html);
    let result = query.evaluate(&doc);
    debug!(xpath, nodes = doc.len(), matches = result.len(), "Evaluated query");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_is_invalid() {
        assert!(matches!(
            query_html("<p>x</p>", ""),
            Err(MailsinkError::InvalidQuery(_))
        ));
        assert!(matches!(
            query_html("", "  "),
            Err(MailsinkError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_blank_html_has_no_matches() {
        assert_eq!(query_html("", "*").unwrap(), vec![]);
        assert_eq!(query_html(" \n", "//p").unwrap(), vec![]);
    }

    #[test]
    fn test_syntax_error_even_without_html() {
        assert!(matches!(
            query_html("", "//p["),
            Err(MailsinkError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let html = "<table><tr><td>a<td>b</table><p>tail";
        let first = serde_json::to_string(&query_html(html, "//td").unwrap()).unwrap();
        let second = serde_json::to_string(&query_html(html, "//td").unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
