//! Stubwire - In-process HTTP call interception for tests
//!
//! Requests sent through a [`TransportSlot`] are matched against the
//! expectations registered on a [`Mock`] and answered with synthetic
//! responses, so test suites stay deterministic and never touch the network.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod cookie;
pub mod dispatcher;
pub mod error;
pub mod expectation;
pub mod ledger;
pub mod normalize;
pub mod registry;
pub mod scope;
pub mod transport;

pub use config::MockConfig;
pub use cookie::{cookies, CookieJar};
pub use dispatcher::{reason_phrase, Dispatcher};
pub use error::{PendingExpectation, Result, StubwireError, UnmatchedRequest};
pub use expectation::{CallsLimit, ObservedRequest, RequestSpec, ResponseTemplate};
pub use ledger::{CallRecord, Outcome};
pub use scope::{ActiveScope, Mock};
pub use transport::{HttpTransport, Transport, TransportSlot};
