//! Matched routes and path-parameter extraction.
//!
//! # Pattern Syntax
//!
//! ```text
//! GET /users/{id}/posts/{postId}     method token, two placeholders
//! /files/{path...}                   trailing catch-all
//! /{$}                               exact-match terminator, ignored
//! ```
//!
//! Extraction is positional: pattern segment `i` is compared with request
//! segment `i`. Without a catch-all both must have the same segment count,
//! otherwise no parameters are extracted.

use std::collections::BTreeMap;

use http::Request;

/// The route a request matched, attached by the routing layer.
///
/// Stored as a typed request extension and read back through [`MatchedRoute::of`].
///
/// # Example
///
/// ```
/// use php_vfs::request::MatchedRoute;
///
/// let mut request = http::Request::new(());
/// MatchedRoute::new("GET /users/{id}", "/api/users.get.php").attach(&mut request);
///
/// let route = MatchedRoute::of(&request).unwrap();
/// assert_eq!(route.script(), "/api/users.get.php");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    pattern: String,
    script: String,
}

impl MatchedRoute {
    /// A route `pattern` served by the virtual path `script`.
    pub fn new(pattern: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            script: script.into(),
        }
    }

    /// The route pattern as registered, method token included.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Virtual path of the script serving this route.
    pub fn script(&self) -> &str {
        &self.script
    }

    /// Attach this route to `request`, replacing any previous one.
    pub fn attach<B>(self, request: &mut Request<B>) {
        request.extensions_mut().insert(self);
    }

    /// The route attached to `request`, if any.
    pub fn of<B>(request: &Request<B>) -> Option<&Self> {
        request.extensions().get::<Self>()
    }

    /// Extract path parameters of `path` against this route's pattern.
    pub fn params(&self, path: &str) -> BTreeMap<String, String> {
        extract_params(&self.pattern, path)
    }
}

/// One segment of a parsed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal,
    Param(&'a str),
    CatchAll(&'a str),
}

/// Split a URL path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Strip a leading method token (`GET /a` becomes `/a`).
fn strip_method(pattern: &str) -> &str {
    let pattern = pattern.trim();
    match pattern.split_once(char::is_whitespace) {
        Some((method, rest)) if !method.starts_with('/') => rest.trim_start(),
        _ => pattern,
    }
}

fn parse_segments(pattern: &str) -> Vec<Segment<'_>> {
    path_segments(strip_method(pattern))
        .into_iter()
        .filter(|s| *s != "{$}")
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) => match inner.strip_suffix("...") {
                Some(name) => Segment::CatchAll(name),
                None => Segment::Param(inner),
            },
            None => Segment::Literal,
        })
        .collect()
}

/// Extract `{name}` placeholders of `pattern` from `path`.
///
/// Returns an empty map when the segment counts differ and the pattern has
/// no trailing catch-all.
pub fn extract_params(pattern: &str, path: &str) -> BTreeMap<String, String> {
    let segments = parse_segments(pattern);
    let parts = path_segments(path);
    let mut params = BTreeMap::new();

    let catch_all = matches!(segments.last(), Some(Segment::CatchAll(_)));
    let fixed = if catch_all { segments.len() - 1 } else { segments.len() };
    let counts_match = if catch_all {
        parts.len() >= fixed
    } else {
        parts.len() == fixed
    };
    if !counts_match {
        return params;
    }

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal => {}
            Segment::Param(name) => {
                params.insert((*name).to_string(), parts[i].to_string());
            }
            Segment::CatchAll(name) => {
                params.insert((*name).to_string(), parts[i..].join("/"));
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_params() {
        let params = extract_params("/users/{id}/posts/{postId}", "/users/42/posts/7");
        let expected: BTreeMap<String, String> = [("id", "42"), ("postId", "7")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(params, expected);

        let json = serde_json::to_string(&params).unwrap();
        let decoded: BTreeMap<String, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_method_token_and_terminator() {
        let params = extract_params("GET /users/{id}", "/users/9");
        assert_eq!(params.get("id").map(String::as_str), Some("9"));

        let params = extract_params("POST /items/{id}/{$}", "/items/3/");
        assert_eq!(params.get("id").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_segment_count_mismatch() {
        assert!(extract_params("/users/{id}", "/users/1/extra").is_empty());
        assert!(extract_params("/users/{id}", "/users").is_empty());
    }

    #[test]
    fn test_catch_all() {
        let params = extract_params("/files/{path...}", "/files/a/b/c.txt");
        assert_eq!(params.get("path").map(String::as_str), Some("a/b/c.txt"));

        let params = extract_params("/files/{path...}", "/files");
        assert_eq!(params.get("path").map(String::as_str), Some(""));
    }

    #[test]
    fn test_path_segments() {
        assert_eq!(path_segments("/a//b/"), vec!["a", "b"]);
        assert!(path_segments("/").is_empty());
    }

    #[test]
    fn test_matched_route_extension() {
        let mut request = Request::new(());
        assert!(MatchedRoute::of(&request).is_none());

        MatchedRoute::new("/users/{id}", "/users.php").attach(&mut request);
        let route = MatchedRoute::of(&request).unwrap();
        assert_eq!(route.pattern(), "/users/{id}");
        assert_eq!(route.params("/users/5").get("id").map(String::as_str), Some("5"));
    }
}
