//! Cookies echoed from the request onto synthetic responses
//!
//! A test can put a `set-cookie` header on the *request*; the mock parses it
//! and attaches the cookies to the response it returns. Parsing is lenient:
//! anything that is not a `name=value` pair is skipped.

use hyper::header::SET_COOKIE;
use hyper::{HeaderMap, Response};

/// Cookies attached to a synthetic response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    /// Parse a `name=value; name=value` cookie string
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Some((name.to_string(), value.to_string()))
            })
            .collect();

        Self { cookies }
    }

    /// Value of the last cookie with this name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a cookie with this name exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Cookies in header order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of cookies
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Whether the jar is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Copy cookies from the request's `set-cookie` header onto the response.
///
/// Missing, non-UTF-8 or empty headers leave the response untouched.
pub(crate) fn inject<B>(request_headers: &HeaderMap, response: &mut Response<B>) {
    let Some(header) = request_headers
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
    else {
        return;
    };

    let jar = CookieJar::parse(header);
    if !jar.is_empty() {
        response.extensions_mut().insert(jar);
    }
}

/// Cookies attached to a response by the mock, if any
pub fn cookies<B>(response: &Response<B>) -> Option<&CookieJar> {
    response.extensions().get::<CookieJar>()
}
