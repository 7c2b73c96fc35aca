//! Activation scope: install the mock, run the test, tear down and verify
//!
//! ```no_run
//! # async fn demo() -> stubwire::Result<()> {
//! use bytes::Bytes;
//! use hyper::Request;
//! use stubwire::{Mock, TransportSlot};
//!
//! let slot = TransportSlot::http();
//! let mock = Mock::new();
//! mock.add("http://example.com/", "ok")?;
//!
//! mock.activate(&slot, || async {
//!     let request = Request::get("http://example.com/").body(Bytes::new()).unwrap();
//!     let response = slot.send(request).await?;
//!     assert_eq!(response.body(), "ok");
//!     Ok::<_, stubwire::StubwireError>(())
//! })
//! .await
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::MockConfig;
use crate::dispatcher::Dispatcher;
use crate::expectation::{CallsLimit, Expectation, RequestSpec, ResponseTemplate};
use crate::ledger::{CallLedger, CallRecord};
use crate::registry::Registry;
use crate::transport::{Transport, TransportSlot};
use crate::{Result, StubwireError};

/// A set of expectations plus the calls made against them
///
/// Create one per test. Expectations are registered with [`Mock::add`] and
/// served once the mock is installed with [`Mock::start`] or
/// [`Mock::activate`].
#[derive(Debug)]
pub struct Mock {
    registry: Arc<Mutex<Registry>>,
    ledger: CallLedger,
    active: AtomicBool,
    assert_all_consumed: bool,
}

impl Default for Mock {
    fn default() -> Self {
        Self::new()
    }
}

impl Mock {
    /// Create a mock with no expectations
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::new())),
            ledger: CallLedger::new(),
            active: AtomicBool::new(false),
            assert_all_consumed: true,
        }
    }

    /// Create a mock from a fixture configuration
    ///
    /// # Errors
    ///
    /// Returns error if any configured expectation is invalid
    pub fn from_config(config: &MockConfig) -> Result<Self> {
        let mut mock = Self::new();
        mock.assert_all_consumed = config.assert_all_consumed;

        for (i, entry) in config.expectations.iter().enumerate() {
            let (request, response, limit) = entry
                .to_parts()
                .map_err(|e| StubwireError::ConfigError(format!("Expectation {i}: {e}")))?;
            mock.add_with_limit(request, response, limit)?;
        }

        Ok(mock)
    }

    /// Expect one call matching `request`, answered with `response`
    ///
    /// # Errors
    ///
    /// Returns error if the URL or a response header is invalid
    pub fn add(
        &self,
        request: impl Into<RequestSpec>,
        response: impl Into<ResponseTemplate>,
    ) -> Result<()> {
        self.add_with_limit(request, response, CallsLimit::default())
    }

    /// Expect calls matching `request` up to `limit` times
    ///
    /// # Errors
    ///
    /// Returns error if the URL or a response header is invalid, or the
    /// limit is zero
    pub fn add_with_limit(
        &self,
        request: impl Into<RequestSpec>,
        response: impl Into<ResponseTemplate>,
        limit: CallsLimit,
    ) -> Result<()> {
        let expectation = Expectation::new(request.into(), response.into(), limit)?;
        self.registry.lock().register(expectation);
        Ok(())
    }

    /// Calls intercepted so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.ledger.snapshot()
    }

    /// Number of expectations not yet exhausted
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether this mock is currently installed
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Fail if any expectation still has calls left
    ///
    /// # Errors
    ///
    /// Returns [`StubwireError::NotAllExpectationsCalled`] listing them
    pub fn check_all_consumed(&self) -> Result<()> {
        let registry = self.registry.lock();
        if registry.has_pending() {
            return Err(StubwireError::NotAllExpectationsCalled {
                pending: registry.pending(),
            });
        }
        Ok(())
    }

    /// Install this mock into `slot`
    ///
    /// # Errors
    ///
    /// Returns [`StubwireError::AlreadyActive`] if this mock or the slot is
    /// already intercepted
    pub fn start(&self, slot: &TransportSlot) -> Result<ActiveScope<'_>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StubwireError::AlreadyActive);
        }

        let installed = slot.intercept(|original| {
            Arc::new(Dispatcher::new(
                Arc::clone(&self.registry),
                self.ledger.clone(),
                original,
            )) as Arc<dyn Transport>
        });

        let original = match installed {
            Ok(original) => original,
            Err(e) => {
                self.active.store(false, Ordering::Release);
                return Err(e);
            }
        };

        info!(
            "Interception started with {} expectation(s)",
            self.pending_count()
        );

        Ok(ActiveScope {
            mock: self,
            slot: slot.clone(),
            original: Some(original),
        })
    }

    /// Run `body` with this mock installed.
    ///
    /// When `body` succeeds the scope is stopped with the consumption check
    /// (unless disabled in the configuration) and a leftover expectation
    /// turns into an error. When `body` fails its error is returned and the
    /// check is skipped. The slot is restored in both cases.
    ///
    /// # Errors
    ///
    /// Returns the body's error, an activation error, or
    /// [`StubwireError::NotAllExpectationsCalled`]
    pub async fn activate<F, Fut, T, E>(
        &self,
        slot: &TransportSlot,
        body: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<StubwireError>,
    {
        let scope = self.start(slot)?;

        match body().await {
            Ok(value) => {
                scope.stop(self.assert_all_consumed)?;
                Ok(value)
            }
            Err(e) => {
                scope.stop(false)?;
                Err(e)
            }
        }
    }
}

/// Guard for an installed mock
///
/// Dropping the guard without calling [`ActiveScope::stop`] restores the slot
/// and clears all state without checking consumption, so a panicking test
/// never leaves the hook installed.
pub struct ActiveScope<'a> {
    mock: &'a Mock,
    slot: TransportSlot,
    original: Option<Arc<dyn Transport>>,
}

impl ActiveScope<'_> {
    /// Calls intercepted so far
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.mock.calls()
    }

    /// Uninstall the mock.
    ///
    /// The slot is restored and the call ledger and expectations are cleared
    /// before the consumption check runs.
    ///
    /// # Errors
    ///
    /// Returns [`StubwireError::NotAllExpectationsCalled`] if
    /// `assert_all_consumed` is set and expectations were left over
    pub fn stop(mut self, assert_all_consumed: bool) -> Result<()> {
        self.teardown(assert_all_consumed)
    }

    fn teardown(&mut self, assert_all_consumed: bool) -> Result<()> {
        let Some(original) = self.original.take() else {
            return Ok(());
        };

        self.slot.restore(original);
        self.mock.ledger.clear();
        let pending = {
            let mut registry = self.mock.registry.lock();
            let pending = registry.pending();
            registry.clear();
            pending
        };
        self.mock.active.store(false, Ordering::Release);

        info!("Interception stopped");

        if assert_all_consumed && !pending.is_empty() {
            warn!("{} expectation(s) were never called", pending.len());
            return Err(StubwireError::NotAllExpectationsCalled { pending });
        }

        Ok(())
    }
}

impl fmt::Debug for ActiveScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveScope")
            .field("slot", &self.slot)
            .field("installed", &self.original.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for ActiveScope<'_> {
    fn drop(&mut self) {
        let _ = self.teardown(false);
    }
}
