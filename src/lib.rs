//! Zentinel Stub Server
//!
//! An in-process HTTP server for tests. Register the requests the code under
//! test is expected to make, point it at the server URL, and verify at the
//! end that every expected request arrived.
//!
//! # Features
//!
//! - **Request Matching**: Match by method, exact path or path pattern, body and headers
//! - **Best Match**: The stub satisfying the most matchers answers; ties go to the first registered
//! - **Single Use**: A matched stub never answers again
//! - **Custom Handlers**: Build the whole response from the request
//! - **Verification**: Wait a grace period for late requests, then report unmatched stubs
//!
//! # Example
//!
//! ```no_run
//! use zentinel_stub_server::{Matcher, RecordingReporter, Server};
//!
//! # async fn run() -> Result<(), zentinel_stub_server::StubError> {
//! let reporter = RecordingReporter::new();
//! let server = Server::start(reporter.clone()).await?;
//!
//! server
//!     .stub("POST", "/users", [Matcher::body_equals("name=Bob")])
//!     .respond(201)
//!     .body("created");
//!
//! // ... exercise the code under test against server.url() ...
//!
//! server.verify().await;
//! reporter.assert_clean();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod reporter;
pub mod request;
pub mod response;
pub mod server;
pub mod stub;

pub use config::ServerSettings;
pub use error::StubError;
pub use matcher::Matcher;
pub use reporter::{RecordingReporter, TestReporter};
pub use request::RecordedRequest;
pub use response::{full_response, CustomHandler, ResponseSpec};
pub use server::{Server, ServerBuilder, POLL_INTERVAL};
pub use stub::{ResponseHandle, StubHandle};
