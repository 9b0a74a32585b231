//! Stubbed responses and how they are turned into HTTP responses.

use crate::error::{Result, StubError};
use crate::request::RecordedRequest;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use std::fmt;
use std::sync::Arc;

/// Callback that fully replaces status, headers and body generation.
pub type CustomHandler = Arc<dyn Fn(&RecordedRequest) -> Response<Full<Bytes>> + Send + Sync>;

/// Convenience for custom handlers: a response with a status and body.
///
/// Status codes hyper cannot represent become 500.
pub fn full_response(status: u16, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
}

/// The response a stub answers with once matched.
#[derive(Clone, Default)]
pub struct ResponseSpec {
    /// HTTP status code (0 = fall back to the server default)
    pub status: u16,
    /// Response body
    pub body: Bytes,
    /// Response headers, emitted in this order
    pub headers: Vec<(String, Vec<String>)>,
    /// Custom handler overriding everything above
    pub handler: Option<CustomHandler>,
}

impl fmt::Debug for ResponseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSpec")
            .field("status", &self.status)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

impl ResponseSpec {
    /// Resolve the status to send: stub status, then server default, then 200.
    pub fn resolve_status(&self, default_status: Option<u16>) -> u16 {
        if self.status != 0 {
            return self.status;
        }
        match default_status {
            Some(status) if status != 0 => status,
            _ => StatusCode::OK.as_u16(),
        }
    }

    /// Build the HTTP response for a matched request.
    pub fn render(
        &self,
        request: &RecordedRequest,
        default_status: Option<u16>,
    ) -> Result<Response<Full<Bytes>>> {
        if let Some(handler) = &self.handler {
            return Ok(handler(request));
        }

        let status = self.resolve_status(default_status);
        let mut response = Response::new(Full::new(self.body.clone()));
        *response.status_mut() = StatusCode::from_u16(status)
            .map_err(|_| StubError::InvalidHeader(format!("status code {}", status)))?;

        let headers = response.headers_mut();
        for (name, values) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| StubError::InvalidHeader(format!("name {:?}", name)))?;
            for value in values {
                let header_value = HeaderValue::from_str(value).map_err(|_| {
                    StubError::InvalidHeader(format!("value {:?} for {}", value, name))
                })?;
                headers.append(header_name.clone(), header_value);
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_status_resolution_order() {
        let unset = ResponseSpec::default();
        assert_eq!(unset.resolve_status(None), 200);
        assert_eq!(unset.resolve_status(Some(418)), 418);

        let explicit = ResponseSpec {
            status: 201,
            ..ResponseSpec::default()
        };
        assert_eq!(explicit.resolve_status(None), 201);
        assert_eq!(explicit.resolve_status(Some(418)), 201);
    }

    #[tokio::test]
    async fn test_render_appends_headers_in_order() {
        let spec = ResponseSpec {
            status: 202,
            body: Bytes::from_static(b"accepted"),
            headers: vec![
                ("x-trace".to_string(), vec!["one".to_string(), "two".to_string()]),
                ("content-type".to_string(), vec!["text/plain".to_string()]),
            ],
            handler: None,
        };

        let response = spec
            .render(&RecordedRequest::new("GET", "/"), None)
            .unwrap();
        assert_eq!(response.status(), 202);

        let traces: Vec<_> = response
            .headers()
            .get_all("x-trace")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(traces, vec!["one", "two"]);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"accepted");
    }

    #[test]
    fn test_custom_handler_bypasses_status_and_body() {
        let spec = ResponseSpec {
            status: 500,
            body: Bytes::from_static(b"ignored"),
            headers: Vec::new(),
            handler: Some(Arc::new(|req: &RecordedRequest| {
                full_response(201, req.path.clone())
            })),
        };

        let response = spec
            .render(&RecordedRequest::new("GET", "/echo"), Some(404))
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_invalid_header_name_is_an_error() {
        let spec = ResponseSpec {
            headers: vec![("bad header".to_string(), vec!["x".to_string()])],
            ..ResponseSpec::default()
        };

        let err = spec
            .render(&RecordedRequest::new("GET", "/"), None)
            .unwrap_err();
        assert!(matches!(err, StubError::InvalidHeader(_)));
    }
}
