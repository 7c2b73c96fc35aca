//! Fixture configuration for Stubwire
//!
//! Expectations can be declared in TOML and loaded with
//! [`Mock::from_config`](crate::Mock::from_config).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expectation::{CallsLimit, RequestSpec, ResponseTemplate};
use crate::normalize::NormalizedUrl;
use crate::{Result, StubwireError};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Fail a clean teardown when expectations were not called
    #[serde(default = "default_true")]
    pub assert_all_consumed: bool,
    /// Expectations in registration order
    #[serde(default)]
    pub expectations: Vec<ExpectationConfig>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            assert_all_consumed: true,
            expectations: Vec::new(),
        }
    }
}

/// One expected request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectationConfig {
    /// URL to match; omitted matches any URL
    #[serde(default)]
    pub url: Option<String>,
    /// Method to match; omitted matches any method
    #[serde(default)]
    pub method: Option<String>,
    /// Headers the request must carry
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// How many calls to serve, 1 when omitted
    #[serde(default)]
    pub calls_limit: Option<usize>,
    /// Serve any number of calls
    #[serde(default)]
    pub unlimited: bool,
    /// Response to serve
    #[serde(default)]
    pub response: ResponseConfig,
}

/// Response returned for a matched request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// Status code
    #[serde(default = "default_status")]
    pub status: u16,
    /// Body text
    #[serde(default)]
    pub body: Option<String>,
    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Forward to the real transport instead
    #[serde(default)]
    pub passthrough: bool,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            body: None,
            headers: BTreeMap::new(),
            passthrough: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_status() -> u16 {
    200
}

impl ExpectationConfig {
    /// Convert into registration parts
    ///
    /// # Errors
    ///
    /// Returns error if the status or calls limit is invalid
    pub fn to_parts(&self) -> Result<(RequestSpec, ResponseTemplate, CallsLimit)> {
        let mut request = RequestSpec::any();
        if let Some(url) = &self.url {
            request = request.url(url.as_str());
        }
        if let Some(method) = &self.method {
            request = request.method(method.as_str());
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let mut response = ResponseTemplate::new().status_code(self.response.status)?;
        if let Some(body) = &self.response.body {
            response = response.body(body.as_str());
        }
        for (name, value) in &self.response.headers {
            response = response.header(name.as_str(), value.as_str());
        }
        if self.response.passthrough {
            response = response.passthrough();
        }

        let limit = match (self.unlimited, self.calls_limit) {
            (true, None) => CallsLimit::Unlimited,
            (true, Some(_)) => {
                return Err(StubwireError::ConfigError(
                    "calls_limit and unlimited are mutually exclusive".to_string(),
                ))
            }
            (false, Some(0)) => return Err(StubwireError::InvalidCallsLimit),
            (false, Some(n)) => CallsLimit::Times(n),
            (false, None) => CallsLimit::default(),
        };

        Ok((request, response, limit))
    }
}

impl MockConfig {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StubwireError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be parsed or fails validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StubwireError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        for (i, expectation) in self.expectations.iter().enumerate() {
            if let Some(method) = &expectation.method {
                if method.is_empty() {
                    return Err(StubwireError::ConfigError(format!(
                        "Expectation {i}: method cannot be empty"
                    )));
                }
            }

            if let Some(url) = &expectation.url {
                NormalizedUrl::parse(url)
                    .map_err(|e| StubwireError::ConfigError(format!("Expectation {i}: {e}")))?;
            }

            expectation
                .to_parts()
                .map_err(|e| StubwireError::ConfigError(format!("Expectation {i}: {e}")))?;
        }

        Ok(())
    }
}
