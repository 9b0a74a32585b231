//! Request matchers.
//!
//! A stub always matches on method and path; matchers narrow it further by
//! looking at the body or headers of the request.

use crate::error::{Result, StubError};
use crate::request::{quote_bytes, RecordedRequest};
use bytes::Bytes;
use regex::bytes::Regex;
use std::fmt;

/// A predicate over a request beyond its method and path.
///
/// Each satisfied matcher adds one point to a stub's score, so stubs with
/// more matchers win over less specific ones.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Body must be byte-for-byte equal.
    BodyEquals(Bytes),
    /// Pattern must match somewhere in the body.
    BodyMatches(Regex),
    /// Body must parse as JSON equal to the expected value.
    BodyJsonEquals(serde_json::Value),
    /// Header must be present with exactly these values, in order.
    HeaderEquals { key: String, values: Vec<String> },
}

impl Matcher {
    /// Match requests whose body equals `body`.
    pub fn body_equals(body: impl Into<Bytes>) -> Self {
        Matcher::BodyEquals(body.into())
    }

    /// Match requests whose body contains a match for `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regular expression. Use
    /// [`Matcher::try_body_matches`] to handle the error instead.
    pub fn body_matches(pattern: &str) -> Self {
        match Self::try_body_matches(pattern) {
            Ok(matcher) => matcher,
            Err(err) => panic!("{}", err),
        }
    }

    /// Fallible form of [`Matcher::body_matches`].
    pub fn try_body_matches(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| StubError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Matcher::BodyMatches(regex))
    }

    /// Match requests whose body is JSON equal to `value`.
    pub fn body_json_equals(value: serde_json::Value) -> Self {
        Matcher::BodyJsonEquals(value)
    }

    /// Match requests carrying header `key` with exactly `values`.
    pub fn header_equals<I, V>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Matcher::HeaderEquals {
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the matcher against a request.
    pub fn matches(&self, request: &RecordedRequest) -> bool {
        match self {
            Matcher::BodyEquals(body) => request.body == *body,
            Matcher::BodyMatches(regex) => regex.is_match(&request.body),
            Matcher::BodyJsonEquals(expected) => {
                serde_json::from_slice::<serde_json::Value>(&request.body)
                    .map(|actual| actual == *expected)
                    .unwrap_or(false)
            }
            Matcher::HeaderEquals { key, values } => request
                .header(key)
                .map(|actual| actual == values.as_slice())
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::BodyEquals(body) => write!(f, "body: {}", quote_bytes(body)),
            Matcher::BodyMatches(regex) => {
                write!(f, "body: {}", quote_bytes(regex.as_str().as_bytes()))
            }
            Matcher::BodyJsonEquals(value) => write!(f, "body: json {}", value),
            Matcher::HeaderEquals { key, values } => {
                write!(f, "{}: {}", key, values.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_equals() {
        let matcher = Matcher::body_equals("name=Bob");

        let req = RecordedRequest::new("POST", "/users").with_body("name=Bob");
        assert!(matcher.matches(&req));

        let req = RecordedRequest::new("POST", "/users").with_body("name=Bobby");
        assert!(!matcher.matches(&req));
        assert_eq!(matcher.to_string(), r#"body: "name=Bob""#);
    }

    #[test]
    fn test_body_equals_describes_binary_bytes() {
        let matcher = Matcher::body_equals(&b"\x00\xfe"[..]);
        assert_eq!(matcher.to_string(), r#"body: "\x00\xfe""#);
    }

    #[test]
    fn test_body_matches_anywhere() {
        let matcher = Matcher::body_matches(r"id=\d+");

        let req = RecordedRequest::new("POST", "/users").with_body("name=Bob&id=42");
        assert!(matcher.matches(&req));

        let req = RecordedRequest::new("POST", "/users").with_body("name=Bob");
        assert!(!matcher.matches(&req));
        assert_eq!(matcher.to_string(), r#"body: "id=\\d+""#);
    }

    #[test]
    fn test_invalid_body_pattern_fails_at_construction() {
        let err = Matcher::try_body_matches("a(b").unwrap_err();
        assert!(matches!(err, StubError::InvalidPattern { .. }));
    }

    #[test]
    #[should_panic(expected = "invalid pattern")]
    fn test_body_matches_panics_on_invalid_pattern() {
        Matcher::body_matches("[unclosed");
    }

    #[test]
    fn test_body_json_equals_ignores_formatting() {
        let matcher = Matcher::body_json_equals(serde_json::json!({"name": "Bob", "age": 3}));

        let req = RecordedRequest::new("POST", "/users").with_body(r#"{ "age": 3, "name": "Bob" }"#);
        assert!(matcher.matches(&req));

        let req = RecordedRequest::new("POST", "/users").with_body("not json");
        assert!(!matcher.matches(&req));
    }

    #[test]
    fn test_header_equals_is_ordered_and_exact() {
        let matcher = Matcher::header_equals("accept", ["text/plain", "application/json"]);

        let req = RecordedRequest::new("GET", "/")
            .with_header("accept", "text/plain")
            .with_header("accept", "application/json");
        assert!(matcher.matches(&req));

        let req = RecordedRequest::new("GET", "/")
            .with_header("accept", "application/json")
            .with_header("accept", "text/plain");
        assert!(!matcher.matches(&req));

        let req = RecordedRequest::new("GET", "/").with_header("accept", "text/plain");
        assert!(!matcher.matches(&req));

        let req = RecordedRequest::new("GET", "/");
        assert!(!matcher.matches(&req));

        assert_eq!(matcher.to_string(), "accept: text/plain,application/json");
    }

    #[test]
    fn test_header_equals_is_case_sensitive() {
        let matcher = Matcher::header_equals("X-Token", ["abc"]);
        let req = RecordedRequest::new("GET", "/").with_header("x-token", "abc");
        assert!(!matcher.matches(&req));
    }
}
