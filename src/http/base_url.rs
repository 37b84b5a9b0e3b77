//! External base URL of the sink, as seen by the client.
//!
//! Behind a reverse proxy the `Host` header names the proxy's upstream, so the
//! `X-Forwarded-*` headers take precedence when present.

use axum::http::header::HOST;
use axum::http::HeaderMap;

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";
const FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// Base URL (scheme, authority and path prefix, no trailing slash) for
/// links handed back to the client.
///
/// A configured `public_url` wins over anything the request says.
pub fn base_url(headers: &HeaderMap, public_url: Option<&str>) -> String {
    if let Some(url) = public_url.filter(|u| !u.trim().is_empty()) {
        return url.trim().trim_end_matches('/').to_string();
    }

    let proto = first_value(headers, FORWARDED_PROTO).unwrap_or("http");
    let host = first_value(headers, FORWARDED_HOST)
        .or_else(|| first_value(headers, HOST.as_str()))
        .unwrap_or("localhost");
    let prefix = first_value(headers, FORWARDED_PREFIX)
        .map(|p| p.trim_end_matches('/'))
        .unwrap_or("");

    if prefix.is_empty() || prefix.starts_with('/') {
        format!("{proto}://{host}{prefix}")
    } else {
        format!("{proto}://{host}/{prefix}")
    }
}

/// First comma-separated entry of a header; proxies append to these lists.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_host_header() {
        let h = headers(&[("host", "localhost:8080")]);
        assert_eq!(base_url(&h, None), "http://localhost:8080");
    }

    #[test]
    fn test_forwarded_headers_win() {
        let h = headers(&[
            ("host", "10.0.0.5:8080"),
            ("x-forwarded-proto", "https"),
            ("x-forwarded-host", "sink.example.com, proxy.internal"),
            ("x-forwarded-prefix", "/mailsink/"),
        ]);
        assert_eq!(base_url(&h, None), "https://sink.example.com/mailsink");
    }

    #[test]
    fn test_prefix_without_slash() {
        let h = headers(&[("host", "h"), ("x-forwarded-prefix", "app")]);
        assert_eq!(base_url(&h, None), "http://h/app");
    }

    #[test]
    fn test_public_url_overrides_request() {
        let h = headers(&[("host", "internal:8080")]);
        assert_eq!(
            base_url(&h, Some("https://mail.example.org/")),
            "https://mail.example.org"
        );
        assert_eq!(base_url(&h, Some("  ")), "http://internal:8080");
    }

    #[test]
    fn test_no_headers() {
        assert_eq!(base_url(&HeaderMap::new(), None), "http://localhost");
    }
}
