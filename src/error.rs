//! Error types for Stubwire

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for Stubwire operations
pub type Result<T> = std::result::Result<T, StubwireError>;

/// An intercepted request that no expectation accepted.
///
/// Callers should treat this exactly like a refused TCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedRequest {
    /// HTTP method of the refused request
    pub method: String,
    /// URL of the refused request, as sent
    pub url: String,
}

impl fmt::Display for UnmatchedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection refused: {} {}", self.method, self.url)
    }
}

/// An expectation left over when a scope was torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExpectation {
    /// Expected method, `*` when any method was accepted
    pub method: String,
    /// Expected canonical URL, `*` when any URL was accepted
    pub url: String,
}

impl fmt::Display for PendingExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Errors that can occur in Stubwire
#[derive(Debug, Error)]
pub enum StubwireError {
    /// No registered expectation matched the request
    #[error("{0}")]
    Unmatched(UnmatchedRequest),

    /// Scope ended cleanly with expectations still registered
    #[error("Not all mocked requests have been called: {}", join_pending(.pending))]
    NotAllExpectationsCalled {
        /// Expectations that still had calls remaining
        pending: Vec<PendingExpectation>,
    },

    /// A transport slot was activated twice
    #[error("Interception is already active on this transport")]
    AlreadyActive,

    /// Expectation URL could not be parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// Response template header could not be converted
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Status code outside 100..=999
    #[error("Invalid status code: {0}")]
    InvalidStatus(u16),

    /// A finite calls limit must be at least one
    #[error("Calls limit must be greater than zero")]
    InvalidCallsLimit,

    /// The real transport failed during passthrough
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StubwireError {
    /// Whether this error is the simulated connection refusal
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::Unmatched(_))
    }

    /// The refused request, if this is a connection refusal
    #[must_use]
    pub fn unmatched(&self) -> Option<&UnmatchedRequest> {
        match self {
            Self::Unmatched(request) => Some(request),
            _ => None,
        }
    }
}

fn join_pending(pending: &[PendingExpectation]) -> String {
    pending
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
