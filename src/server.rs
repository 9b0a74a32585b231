//! The stub server: listener, request dispatch and verification.

use crate::config::ServerSettings;
use crate::error::{Result, StubError};
use crate::matcher::Matcher;
use crate::registry::{lock, Registry, SharedRegistry};
use crate::reporter::TestReporter;
use crate::request::RecordedRequest;
use crate::stub::{PathSpec, Stub, StubHandle};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How often `verify` checks whether every stub has been matched.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Handles every request arriving at the listener.
struct Dispatcher {
    registry: SharedRegistry,
    reporter: Arc<dyn TestReporter>,
    settings: ServerSettings,
}

impl Dispatcher {
    async fn dispatch(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                self.fail(&format!("failed to read request body: {}", err));
                return empty_response(StatusCode::BAD_REQUEST);
            }
        };
        let request = RecordedRequest::from_parts(&parts, body);

        // Matching, consumption and the all-consumed flag change together.
        let consumed = {
            let mut registry = lock(&self.registry);
            match registry.consume_best(&request) {
                Some(consumed) => consumed,
                None => {
                    let message = registry.unregistered_request_message(&request);
                    drop(registry);
                    if self.settings.log_unmatched {
                        warn!(
                            method = %request.method,
                            path = %request.path,
                            "No matching stub found"
                        );
                    }
                    self.fail(&message);
                    return empty_response(StatusCode::NOT_FOUND);
                }
            }
        };

        if self.settings.log_matches {
            info!(
                stub = consumed.index + 1,
                method = %request.method,
                path = %request.path,
                "Request matched stub"
            );
        }

        match consumed
            .response
            .render(&request, self.settings.default_status)
        {
            Ok(response) => response,
            Err(err) => {
                self.fail(&format!(
                    "failed to write response for stub {}: {}",
                    consumed.index + 1,
                    err
                ));
                empty_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    fn fail(&self, message: &str) {
        self.reporter.report_non_fatal_failure(message);
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Builder applying server options before the listener starts.
pub struct ServerBuilder {
    reporter: Arc<dyn TestReporter>,
    settings: ServerSettings,
}

impl ServerBuilder {
    /// Grace period `verify` waits for late requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings = self.settings.with_timeout(timeout);
        self
    }

    /// Status for stubs that do not set one.
    pub fn default_status(mut self, status: u16) -> Self {
        self.settings = self.settings.with_default_status(status);
        self
    }

    /// Replace all settings at once.
    pub fn settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Bind the listener and start serving.
    pub async fn start(self) -> Result<Server> {
        let ServerBuilder { reporter, settings } = self;

        if let Err(err) = settings.validate() {
            return Err(fail_start(reporter.as_ref(), err));
        }

        let listener = bind(settings.bind_address)
            .await
            .map_err(|err| fail_start(reporter.as_ref(), StubError::Bind(err)))?;
        let addr = listener
            .local_addr()
            .map_err(|err| fail_start(reporter.as_ref(), StubError::Bind(err)))?;
        let url = format!("http://{}", reachable(addr));

        let registry: SharedRegistry = Arc::new(Mutex::new(Registry::default()));
        let dispatcher = Arc::new(Dispatcher {
            registry: registry.clone(),
            reporter: reporter.clone(),
            settings: settings.clone(),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, dispatcher, shutdown_rx));

        info!(url = %url, timeout_ms = settings.timeout_ms, "Stub server listening");

        Ok(Server {
            url,
            addr,
            registry,
            reporter,
            settings,
            shutdown,
            task: Some(task),
        })
    }
}

/// Report a startup error as fatal and hand it back to the caller.
fn fail_start(reporter: &dyn TestReporter, err: StubError) -> StubError {
    reporter.report_fatal_failure(&err.to_string());
    err
}

async fn bind(ip: IpAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(SocketAddr::new(ip, 0)).await
}

/// Address clients can connect to when bound to a wildcard address.
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

async fn accept_loop(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    connections.spawn(serve_connection(
                        stream,
                        dispatcher.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(err) => warn!(error = %err, "Failed to accept connection"),
            },
            _ = stopped(&mut shutdown) => break,
        }
    }

    // Let in-flight requests finish before the server counts as closed.
    while connections.join_next().await.is_some() {}
}

/// Resolves once shutdown has been signalled or the server is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn serve_connection(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: watch::Receiver<bool>,
) {
    let service = {
        let dispatcher = dispatcher.clone();
        service_fn(move |request: Request<Incoming>| {
            let dispatcher = dispatcher.clone();
            async move { Ok::<_, Infallible>(dispatcher.dispatch(request).await) }
        })
    };

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = stopped(&mut shutdown) => {
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };

    if let Err(err) = result {
        dispatcher.fail(&format!("failed to write response: {}", err));
    }
}

/// An HTTP server that answers requests from registered stubs and checks,
/// at teardown, that every stub was used.
///
/// Call [`Server::verify`] or [`Server::close`] to shut it down. Dropping
/// the server also stops the listener, without verification.
pub struct Server {
    url: String,
    addr: SocketAddr,
    registry: SharedRegistry,
    reporter: Arc<dyn TestReporter>,
    settings: ServerSettings,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Server {
    /// Start a server with default settings.
    pub async fn start<R: TestReporter + 'static>(reporter: R) -> Result<Self> {
        Self::builder(reporter).start().await
    }

    /// Configure a server before starting it.
    pub fn builder<R: TestReporter + 'static>(reporter: R) -> ServerBuilder {
        ServerBuilder {
            reporter: Arc::new(reporter),
            settings: ServerSettings::default(),
        }
    }

    /// Base URL of the listener, e.g. `http://127.0.0.1:41234`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Full URL for a path on this server.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Register a stub matching `method` and the exact `path`.
    ///
    /// Stubs are tried in registration order; the one satisfying the most
    /// matchers answers the request and is never matched again.
    pub fn stub<I>(&self, method: impl Into<String>, path: impl Into<String>, matchers: I) -> StubHandle
    where
        I: IntoIterator<Item = Matcher>,
    {
        self.register(Stub::new(
            method,
            PathSpec::Exact(path.into()),
            matchers.into_iter().collect(),
        ))
    }

    /// Register a stub whose path is a regular expression.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regular expression. Use
    /// [`Server::try_stub_match`] to handle the error instead.
    pub fn stub_match<I>(&self, method: impl Into<String>, pattern: &str, matchers: I) -> StubHandle
    where
        I: IntoIterator<Item = Matcher>,
    {
        match self.try_stub_match(method, pattern, matchers) {
            Ok(handle) => handle,
            Err(err) => panic!("{}", err),
        }
    }

    /// Fallible form of [`Server::stub_match`].
    pub fn try_stub_match<I>(
        &self,
        method: impl Into<String>,
        pattern: &str,
        matchers: I,
    ) -> Result<StubHandle>
    where
        I: IntoIterator<Item = Matcher>,
    {
        let path = PathSpec::pattern(pattern)?;
        Ok(self.register(Stub::new(method, path, matchers.into_iter().collect())))
    }

    fn register(&self, stub: Stub) -> StubHandle {
        debug!(stub = %stub, "Registering stub");
        let index = lock(&self.registry).push(stub);
        StubHandle::new(self.registry.clone(), index)
    }

    /// True when every registered stub has been matched.
    pub fn all_matched(&self) -> bool {
        lock(&self.registry).all_consumed()
    }

    /// Number of stubs not yet matched.
    pub fn pending(&self) -> usize {
        lock(&self.registry).pending()
    }

    /// Wait for every stub to be matched, then shut down.
    ///
    /// Checks every [`POLL_INTERVAL`] until all stubs are matched or the
    /// configured timeout elapses. On timeout the listener is shut down and
    /// the stubs are checked one last time; if some are still unmatched a
    /// single failure listing every stub is reported.
    pub async fn verify(mut self) {
        let deadline = tokio::time::sleep(self.settings.timeout());
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval_at(Instant::now() + POLL_INTERVAL, POLL_INTERVAL);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.all_matched() {
                        self.shutdown().await;
                        info!("All stubs matched");
                        return;
                    }
                }
                _ = &mut deadline => {
                    self.shutdown().await;
                    self.report_unmatched();
                    return;
                }
            }
        }
    }

    fn report_unmatched(&self) {
        let message = {
            let registry = lock(&self.registry);
            if registry.all_consumed() {
                info!("All stubs matched");
                return;
            }
            if self.settings.log_unmatched {
                warn!(pending = registry.pending(), "Not all stubs have been matched");
            }
            registry.unmatched_stubs_message()
        };
        self.reporter.report_non_fatal_failure(&message);
    }

    /// Shut down without checking whether stubs were matched.
    pub async fn close(mut self) {
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Stub server listener task failed");
            }
            info!(url = %self.url, "Stub server closed");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
