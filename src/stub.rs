//! Stubs: an expected request and the response it earns.

use crate::error::{Result, StubError};
use crate::matcher::Matcher;
use crate::registry::{lock, SharedRegistry};
use crate::request::RecordedRequest;
use crate::response::{CustomHandler, ResponseSpec};
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// How a stub selects request paths.
#[derive(Debug, Clone)]
pub enum PathSpec {
    /// Path must equal the value
    Exact(String),
    /// Pattern must match somewhere in the path
    Pattern(Regex),
}

impl PathSpec {
    /// Compile a path pattern.
    pub fn pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| StubError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(PathSpec::Pattern(regex))
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            PathSpec::Exact(value) => path == value,
            PathSpec::Pattern(regex) => regex.is_match(path),
        }
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSpec::Exact(value) => f.write_str(value),
            PathSpec::Pattern(regex) => f.write_str(regex.as_str()),
        }
    }
}

/// A registered expectation.
#[derive(Debug, Clone)]
pub struct Stub {
    pub method: String,
    pub path: PathSpec,
    pub matchers: Vec<Matcher>,
    pub response: ResponseSpec,
    /// Set once the stub has answered a request; it never matches again.
    pub consumed: bool,
}

impl Stub {
    /// Create an unconsumed stub with an empty response.
    pub fn new(method: impl Into<String>, path: PathSpec, matchers: Vec<Matcher>) -> Self {
        Self {
            method: method.into(),
            path,
            matchers,
            response: ResponseSpec::default(),
            consumed: false,
        }
    }

    /// Score a request against this stub.
    ///
    /// Returns `None` when method, path or any matcher rejects the request.
    /// Otherwise the score is 1 plus the number of matchers.
    pub fn score(&self, request: &RecordedRequest) -> Option<usize> {
        if self.method != request.method || !self.path.matches(&request.path) {
            return None;
        }

        let mut score = 1;
        for matcher in &self.matchers {
            if !matcher.matches(request) {
                return None;
            }
            score += 1;
        }
        Some(score)
    }
}

impl fmt::Display for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matchers: Vec<String> = self.matchers.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} {} {}",
            self.method.to_uppercase(),
            self.path,
            matchers.join(",")
        )
    }
}

/// Handle to a registered stub, used to configure its response.
#[derive(Clone)]
pub struct StubHandle {
    registry: SharedRegistry,
    index: usize,
}

impl StubHandle {
    pub(crate) fn new(registry: SharedRegistry, index: usize) -> Self {
        Self { registry, index }
    }

    /// Position of the stub in registration order, starting at 1.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    /// Set the response status and return a handle for the rest of the response.
    pub fn respond(&self, status: u16) -> ResponseHandle {
        self.update(|response| response.status = status);
        ResponseHandle {
            stub: self.clone(),
        }
    }

    /// Answer matched requests with a custom handler.
    ///
    /// Status, headers and body configured through [`StubHandle::respond`]
    /// are ignored once a handler is installed.
    pub fn on_request<F>(&self, handler: F)
    where
        F: Fn(&RecordedRequest) -> Response<Full<Bytes>> + Send + Sync + 'static,
    {
        let handler: CustomHandler = Arc::new(handler);
        self.update(move |response| response.handler = Some(handler));
    }

    /// Whether a request has matched this stub.
    pub fn is_matched(&self) -> bool {
        lock(&self.registry)
            .get(self.index)
            .map(|stub| stub.consumed)
            .unwrap_or(false)
    }

    fn update(&self, f: impl FnOnce(&mut ResponseSpec)) {
        let mut registry = lock(&self.registry);
        if let Some(stub) = registry.get_mut(self.index) {
            f(&mut stub.response);
        }
    }
}

/// Chainable configuration of a stub's response.
#[derive(Clone)]
pub struct ResponseHandle {
    stub: StubHandle,
}

impl ResponseHandle {
    /// Set the response body.
    pub fn body(self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.stub.update(move |response| response.body = body);
        self
    }

    /// Replace the response headers. Values are emitted in iteration order.
    pub fn headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let headers: Vec<(String, Vec<String>)> = headers
            .into_iter()
            .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
            .collect();
        self.stub.update(move |response| response.headers = headers);
        self
    }

    /// Append a single header value.
    pub fn header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.stub.update(move |response| {
            match response.headers.iter_mut().find(|(existing, _)| *existing == name) {
                Some((_, values)) => values.push(value),
                None => response.headers.push((name, vec![value])),
            }
        });
        self
    }
}
