//! Ordered store of expectations

use tracing::debug;

use crate::error::PendingExpectation;
use crate::expectation::{Expectation, ObservedRequest};

/// Expectations in registration order.
///
/// An exhausted expectation is removed in the same call that exhausts it, so
/// no expectation with zero calls left is ever stored.
#[derive(Debug, Default)]
pub struct Registry {
    expectations: Vec<Expectation>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expectation. Duplicates are kept.
    pub fn register(&mut self, expectation: Expectation) {
        debug!(
            "Registered expectation: {} (position {})",
            expectation.describe(),
            self.expectations.len()
        );
        self.expectations.push(expectation);
    }

    /// Find the first expectation accepting `request` and consume one call.
    ///
    /// Returns a snapshot of the expectation as it was matched.
    pub fn resolve(&mut self, request: &ObservedRequest) -> Option<Expectation> {
        let index = self
            .expectations
            .iter()
            .position(|expectation| expectation.matches(request))?;

        let matched = self.expectations[index].clone();
        if self.expectations[index].consume() {
            self.expectations.remove(index);
            debug!("Expectation exhausted: {}", matched.describe());
        }

        Some(matched)
    }

    /// Whether any expectation is still registered
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.expectations.is_empty()
    }

    /// Method and URL of every remaining expectation
    #[must_use]
    pub fn pending(&self) -> Vec<PendingExpectation> {
        self.expectations.iter().map(Expectation::describe).collect()
    }

    /// Number of registered expectations
    #[must_use]
    pub fn len(&self) -> usize {
        self.expectations.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }

    /// Remove every expectation
    pub fn clear(&mut self) {
        self.expectations.clear();
    }
}
