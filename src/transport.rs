//! Transport seam between application code and the network
//!
//! Application code sends requests through a [`TransportSlot`]. The slot
//! normally holds the real [`HttpTransport`]; an active mock swaps its own
//! dispatcher in and puts the original back on teardown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{Result, StubwireError};

/// Future returned by [`Transport::send`]
pub type TransportFuture<'a> = BoxFuture<'a, Result<Response<Bytes>>>;

/// Something that can answer an HTTP request
pub trait Transport: Send + Sync {
    /// Send a request and wait for the full response
    fn send(&self, request: Request<Bytes>) -> TransportFuture<'_>;
}

/// Real HTTP transport backed by the hyper client
pub struct HttpTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpTransport {
    /// Create a new HTTP transport
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build_http();

        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request<Bytes>) -> TransportFuture<'_> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let request = Request::from_parts(parts, Full::new(body));

            debug!("Forwarding {} {}", request.method(), request.uri());

            let response = self.client.request(request).await.map_err(|e| {
                warn!("Request failed: {e}");
                StubwireError::Transport(format!("Request failed: {e}"))
            })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| {
                    StubwireError::Transport(format!("Failed to read response body: {e}"))
                })?
                .to_bytes();

            Ok(Response::from_parts(parts, body))
        })
    }
}

struct SlotState {
    transport: Arc<dyn Transport>,
    intercepted: bool,
}

/// Swappable holder of the transport application code sends through
///
/// Clones share the same slot.
#[derive(Clone)]
pub struct TransportSlot {
    state: Arc<RwLock<SlotState>>,
}

impl TransportSlot {
    /// Create a slot holding `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SlotState {
                transport,
                intercepted: false,
            })),
        }
    }

    /// Create a slot holding a real [`HttpTransport`]
    #[must_use]
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    /// The transport requests currently go through
    #[must_use]
    pub fn current(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.state.read().transport)
    }

    /// Whether a mock is installed
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        self.state.read().intercepted
    }

    /// Send a request through the current transport
    ///
    /// # Errors
    ///
    /// Returns whatever the current transport returns
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let transport = self.current();
        transport.send(request).await
    }

    /// Replace the transport with one built from the original, which is
    /// returned so it can be restored later.
    pub(crate) fn intercept<F>(&self, build: F) -> Result<Arc<dyn Transport>>
    where
        F: FnOnce(Arc<dyn Transport>) -> Arc<dyn Transport>,
    {
        let mut state = self.state.write();
        if state.intercepted {
            return Err(StubwireError::AlreadyActive);
        }

        let original = Arc::clone(&state.transport);
        state.transport = build(Arc::clone(&original));
        state.intercepted = true;
        Ok(original)
    }

    pub(crate) fn restore(&self, original: Arc<dyn Transport>) {
        let mut state = self.state.write();
        state.transport = original;
        state.intercepted = false;
    }
}

impl fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSlot")
            .field("intercepted", &self.is_intercepted())
            .finish_non_exhaustive()
    }
}
