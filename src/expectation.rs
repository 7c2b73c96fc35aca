//! Expectations: what a test expects to be called, and how to answer

use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Request, StatusCode};

use crate::error::PendingExpectation;
use crate::normalize::NormalizedUrl;
use crate::{Result, StubwireError};

/// Read-only view of an intercepted request
#[derive(Debug, Clone)]
pub struct ObservedRequest {
    /// HTTP method as sent
    pub method: String,
    /// URL as sent
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
}

impl ObservedRequest {
    /// Snapshot the parts of a request used for matching
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().as_str().to_string(),
            url: request.uri().to_string(),
            headers: request.headers().clone(),
        }
    }

    /// Build a request view by hand, mostly useful in tests
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a header; names or values that are not valid HTTP are skipped
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}

/// URL predicate of an expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlMatch {
    /// Any URL
    Any,
    /// Same canonical URL and a superset of the query parameters
    Exact(NormalizedUrl),
}

impl UrlMatch {
    fn matches(&self, observed_url: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => NormalizedUrl::parse(observed_url)
                .map(|observed| expected.accepts(&observed))
                .unwrap_or(false),
        }
    }
}

/// Method predicate of an expectation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodMatch {
    /// Any method
    Any,
    /// Case-sensitive equality
    Exact(String),
}

impl MethodMatch {
    fn matches(&self, method: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == method,
        }
    }
}

/// Request side of a registration, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSpec {
    url: Option<String>,
    method: Option<String>,
    headers: Vec<(String, String)>,
}

impl RequestSpec {
    /// Match any request
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Match requests to this URL
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Match requests with this method
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Require a header with exactly this value
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl From<&str> for RequestSpec {
    fn from(url: &str) -> Self {
        Self::any().url(url)
    }
}

impl From<String> for RequestSpec {
    fn from(url: String) -> Self {
        Self::any().url(url)
    }
}

/// Response side of a registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTemplate {
    pub(crate) status: StatusCode,
    pub(crate) body: Option<String>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) passthrough: bool,
}

impl Default for ResponseTemplate {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
            headers: Vec::new(),
            passthrough: false,
        }
    }
}

impl ResponseTemplate {
    /// An empty `200 OK`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Response body, sent as UTF-8
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Response status
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Response status from a raw code
    ///
    /// # Errors
    ///
    /// Returns error if the code is outside `100..=999`
    pub fn status_code(self, code: u16) -> Result<Self> {
        let status = StatusCode::from_u16(code).map_err(|_| StubwireError::InvalidStatus(code))?;
        Ok(self.status(status))
    }

    /// Add a response header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Forward the request to the real transport instead of answering
    #[must_use]
    pub fn passthrough(mut self) -> Self {
        self.passthrough = true;
        self
    }

    /// Whether this template forwards to the real transport
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let (name, value) = parse_header(name, value)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| StubwireError::InvalidHeader(format!("{name}: {e}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| StubwireError::InvalidHeader(format!("{name}: {e}")))?;
    Ok((header_name, header_value))
}

impl From<&str> for ResponseTemplate {
    fn from(body: &str) -> Self {
        Self::new().body(body)
    }
}

impl From<String> for ResponseTemplate {
    fn from(body: String) -> Self {
        Self::new().body(body)
    }
}

/// How many times an expectation may be consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallsLimit {
    /// Exactly this many times, then evicted
    Times(usize),
    /// Never evicted
    Unlimited,
}

impl Default for CallsLimit {
    fn default() -> Self {
        Self::Times(1)
    }
}

/// A registered expectation
#[derive(Debug, Clone)]
pub struct Expectation {
    url: UrlMatch,
    method: MethodMatch,
    headers: Vec<(HeaderName, HeaderValue)>,
    response: ResponseTemplate,
    response_headers: HeaderMap,
    remaining: CallsLimit,
}

impl Expectation {
    /// Normalize a registration into an expectation
    ///
    /// # Errors
    ///
    /// Returns error if the URL cannot be parsed, a required or response
    /// header is not valid HTTP, or the limit is zero
    pub fn new(
        request: RequestSpec,
        response: ResponseTemplate,
        limit: CallsLimit,
    ) -> Result<Self> {
        if limit == CallsLimit::Times(0) {
            return Err(StubwireError::InvalidCallsLimit);
        }

        let url = match request.url.as_deref() {
            Some(raw) => UrlMatch::Exact(NormalizedUrl::parse(raw)?),
            None => UrlMatch::Any,
        };
        let method = request.method.map_or(MethodMatch::Any, MethodMatch::Exact);
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| parse_header(name, value))
            .collect::<Result<Vec<_>>>()?;
        let response_headers = response.header_map()?;

        Ok(Self {
            url,
            method,
            headers,
            response,
            response_headers,
            remaining: limit,
        })
    }

    /// Whether this expectation accepts the request. Never mutates state.
    #[must_use]
    pub fn matches(&self, request: &ObservedRequest) -> bool {
        self.url.matches(&request.url)
            && self.method.matches(&request.method)
            && self.headers_match(&request.headers)
    }

    // Names are looked up case-insensitively through `HeaderMap`; values
    // must match exactly.
    fn headers_match(&self, headers: &HeaderMap) -> bool {
        self.headers
            .iter()
            .all(|(name, value)| headers.get(name) == Some(value))
    }

    /// Consume one call. Returns `true` when the expectation is exhausted.
    pub(crate) fn consume(&mut self) -> bool {
        match &mut self.remaining {
            CallsLimit::Times(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
            CallsLimit::Unlimited => false,
        }
    }

    /// URL predicate
    #[must_use]
    pub fn url(&self) -> &UrlMatch {
        &self.url
    }

    /// Method predicate
    #[must_use]
    pub fn method(&self) -> &MethodMatch {
        &self.method
    }

    /// Required headers
    #[must_use]
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    /// Response template
    #[must_use]
    pub fn response(&self) -> &ResponseTemplate {
        &self.response
    }

    /// Response headers, validated at registration
    #[must_use]
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    /// Calls left before eviction
    #[must_use]
    pub fn remaining(&self) -> CallsLimit {
        self.remaining
    }

    /// Method and URL, for reporting
    #[must_use]
    pub fn describe(&self) -> PendingExpectation {
        PendingExpectation {
            method: match &self.method {
                MethodMatch::Any => "*".to_string(),
                MethodMatch::Exact(method) => method.clone(),
            },
            url: match &self.url {
                UrlMatch::Any => "*".to_string(),
                UrlMatch::Exact(url) => url.to_string(),
            },
        }
    }
}
