//! Turns intercepted requests into synthetic responses or refusals

use std::sync::Arc;

use bytes::Bytes;
use hyper::{Request, Response};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cookie;
use crate::error::UnmatchedRequest;
use crate::expectation::{Expectation, ObservedRequest};
use crate::ledger::{CallLedger, Outcome, RecordedResponse};
use crate::registry::Registry;
use crate::transport::{Transport, TransportFuture};
use crate::{Result, StubwireError};

enum Answer {
    Ready(Response<Bytes>),
    Forward(ObservedRequest),
}

/// Interception hook installed into a [`TransportSlot`](crate::TransportSlot)
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
    ledger: CallLedger,
    real: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Create a dispatcher; `real` serves passthrough expectations
    #[must_use]
    pub fn new(registry: Arc<Mutex<Registry>>, ledger: CallLedger, real: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            ledger,
            real,
        }
    }

    /// Answer one intercepted request
    ///
    /// # Errors
    ///
    /// Returns [`StubwireError::Unmatched`] when no expectation accepts the
    /// request, or the real transport's error during passthrough
    pub async fn handle(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let observed = ObservedRequest::from_request(&request);

        match self.answer(observed)? {
            Answer::Ready(response) => Ok(response),
            Answer::Forward(observed) => {
                debug!("Passthrough: {} {}", observed.method, observed.url);
                let response = self.real.send(request).await?;
                self.ledger.record(
                    observed,
                    Outcome::Response(RecordedResponse::from_response(&response)),
                );
                Ok(response)
            }
        }
    }

    // Resolution and recording happen under the registry lock so concurrent
    // callers consume each expectation exactly once and record in order.
    // Passthrough calls are the exception: they are recorded after the real
    // transport answers, outside the lock, so their ledger position follows
    // completion order rather than resolution order.
    fn answer(&self, observed: ObservedRequest) -> Result<Answer> {
        let mut registry = self.registry.lock();

        let Some(expectation) = registry.resolve(&observed) else {
            let failure = UnmatchedRequest {
                method: observed.method.clone(),
                url: observed.url.clone(),
            };
            warn!("Unmatched request: {} {}", failure.method, failure.url);
            self.ledger.record(observed, Outcome::Failure(failure.clone()));
            return Err(StubwireError::Unmatched(failure));
        };

        if expectation.response().is_passthrough() {
            return Ok(Answer::Forward(observed));
        }

        let mut response = build_response(&expectation);
        cookie::inject(&observed.headers, &mut response);

        debug!(
            "Matched {} {} -> {}",
            observed.method,
            observed.url,
            response.status()
        );
        self.ledger.record(
            observed,
            Outcome::Response(RecordedResponse::from_response(&response)),
        );
        drop(registry);

        Ok(Answer::Ready(response))
    }
}

impl Transport for Dispatcher {
    fn send(&self, request: Request<Bytes>) -> TransportFuture<'_> {
        Box::pin(self.handle(request))
    }
}

fn build_response(expectation: &Expectation) -> Response<Bytes> {
    let template = expectation.response();
    let body = template
        .body
        .as_deref()
        .map_or_else(Bytes::new, |body| Bytes::copy_from_slice(body.as_bytes()));

    let mut response = Response::new(body);
    *response.status_mut() = template.status;
    *response.headers_mut() = expectation.response_headers().clone();
    response
}

/// Standard reason phrase for the response status, if one is defined
pub fn reason_phrase<B>(response: &Response<B>) -> Option<&'static str> {
    response.status().canonical_reason()
}
