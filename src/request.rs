//! Requests as seen by the matching engine.

use bytes::Bytes;
use hyper::http::request::Parts;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::fmt;

/// Quote bytes the way diagnostics expect: printable text as-is, escapes
/// for quotes, backslashes and control characters, `\xNN` for bytes that
/// are not valid UTF-8.
pub(crate) fn quote_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push('"');

    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                push_escaped(&mut out, valid);
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                push_escaped(&mut out, std::str::from_utf8(valid).unwrap_or_default());
                let invalid = err.error_len().unwrap_or(after.len());
                for byte in &after[..invalid] {
                    out.push_str(&format!("\\x{:02x}", byte));
                }
                rest = &after[invalid..];
            }
        }
    }

    out.push('"');
    out
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            ch if ch.is_ascii_control() => out.push_str(&format!("\\x{:02x}", ch as u32)),
            ch if ch.is_control() => out.push_str(&format!("\\u{:04x}", ch as u32)),
            ch => out.push(ch),
        }
    }
}

/// A request whose body has already been read in full.
///
/// Header names are kept exactly as the listener hands them over (hyper
/// lower-cases them); values keep their arrival order.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HashMap<String, Vec<String>>,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Build from hyper request parts and the collected body.
    pub(crate) fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in parts.headers.iter() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }

        Self {
            method: parts.method.as_str().to_string(),
            path: percent_decode_str(parts.uri.path())
                .decode_utf8_lossy()
                .into_owned(),
            query: parts.uri.query().map(str::to_string),
            headers,
            body,
        }
    }

    /// Values for a header, looked up case-sensitively.
    pub fn header(&self, name: &str) -> Option<&[String]> {
        self.headers.get(name).map(Vec::as_slice)
    }
}

impl fmt::Display for RecordedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}, body: {}",
            self.method,
            self.path,
            quote_bytes(&self.body)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_body() {
        let req = RecordedRequest::new("POST", "/bar").with_body("name=\"Bob\"");
        assert_eq!(req.to_string(), r#"POST /bar, body: "name=\"Bob\"""#);
    }

    #[test]
    fn test_quote_bytes_escapes() {
        assert_eq!(quote_bytes(b"plain text"), r#""plain text""#);
        assert_eq!(quote_bytes(b"a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(quote_bytes(b"line\n\ttab"), r#""line\n\ttab""#);
        assert_eq!(quote_bytes(b"nul\x00bell\x07"), r#""nul\x00bell\a""#);
        assert_eq!(quote_bytes(b"bad\xff\xfeend"), r#""bad\xff\xfeend""#);
        assert_eq!(quote_bytes("caf\u{e9}".as_bytes()), "\"caf\u{e9}\"");
    }

    #[test]
    fn test_display_escapes_binary_body() {
        let req = RecordedRequest::new("PUT", "/blob").with_body(&b"\x00\x01\xff"[..]);
        assert_eq!(req.to_string(), r#"PUT /blob, body: "\x00\x01\xff""#);
    }

    #[test]
    fn test_from_parts_decodes_path() {
        let request = hyper::Request::builder()
            .uri("/files/a%20b/%E2%9C%93?q=a%20b")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let recorded = RecordedRequest::from_parts(&parts, Bytes::new());
        assert_eq!(recorded.path, "/files/a b/\u{2713}");
        assert_eq!(recorded.query.as_deref(), Some("q=a%20b"));
    }

    #[test]
    fn test_from_parts_keeps_header_order() {
        let request = hyper::Request::builder()
            .method("PUT")
            .uri("/users/1?force=true")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();

        let recorded = RecordedRequest::from_parts(&parts, Bytes::from_static(b"{}"));
        assert_eq!(recorded.method, "PUT");
        assert_eq!(recorded.path, "/users/1");
        assert_eq!(recorded.query.as_deref(), Some("force=true"));
        assert_eq!(
            recorded.header("x-tag"),
            Some(&["a".to_string(), "b".to_string()][..])
        );
        assert_eq!(recorded.header("X-Tag"), None);
    }
}
