//! Record of every intercepted call

use std::sync::Arc;

use bytes::Bytes;
use hyper::{HeaderMap, Response, StatusCode};
use parking_lot::Mutex;

use crate::cookie::{self, CookieJar};
use crate::error::UnmatchedRequest;
use crate::expectation::ObservedRequest;

/// Response as delivered to the caller
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Cookies injected into the response
    pub cookies: Option<CookieJar>,
}

impl RecordedResponse {
    /// Snapshot a response
    pub fn from_response(response: &Response<Bytes>) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: response.body().clone(),
            cookies: cookie::cookies(response).cloned(),
        }
    }
}

/// What the caller received
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A synthetic or passed-through response
    Response(RecordedResponse),
    /// The connection-refused signal
    Failure(UnmatchedRequest),
}

impl Outcome {
    /// The response, if one was delivered
    #[must_use]
    pub fn response(&self) -> Option<&RecordedResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Failure(_) => None,
        }
    }

    /// Whether the call was refused
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// One intercepted request and its outcome
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// The request as intercepted
    pub request: ObservedRequest,
    /// The response or failure
    pub outcome: Outcome,
}

/// Shared append-only call list
#[derive(Debug, Clone, Default)]
pub struct CallLedger {
    calls: Arc<Mutex<Vec<CallRecord>>>,
}

impl CallLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call
    pub fn record(&self, request: ObservedRequest, outcome: Outcome) {
        self.calls.lock().push(CallRecord { request, outcome });
    }

    /// Snapshot of all calls in order
    #[must_use]
    pub fn snapshot(&self) -> Vec<CallRecord> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }
}
