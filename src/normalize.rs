//! URL canonicalization for expectation matching
//!
//! Two URLs are considered equal when their canonical forms are equal. The
//! canonical form is `scheme://authority/path` with:
//!
//! 1. Host encoded through UTS-46 (Unicode and punycode hosts compare equal)
//! 2. Host lowercased and default port elided
//! 3. Empty path replaced by `/`
//! 4. Escapes of unreserved characters decoded, other escapes uppercased
//! 5. Query and fragment removed
//!
//! The query string is kept separately as a parameter map so matching can be
//! a subset check rather than a string comparison.

use std::collections::BTreeMap;
use std::fmt;

use url::{Position, Url};

use crate::{Result, StubwireError};

/// Query parameters: name to values, duplicates preserved, values sorted
pub type QueryParams = BTreeMap<String, Vec<String>>;

/// A URL reduced to its comparable parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    canonical: String,
    query: QueryParams,
}

impl NormalizedUrl {
    /// Parse and canonicalize a URL
    ///
    /// # Errors
    ///
    /// Returns [`StubwireError::InvalidUrl`] if the URL cannot be parsed
    pub fn parse(raw: &str) -> Result<Self> {
        let parsed = Url::parse(raw.trim()).map_err(|e| StubwireError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        let query = parse_query(&parsed);

        let mut canonical = parsed[..Position::BeforePath].to_string();
        let path = parsed.path();
        if path.is_empty() {
            canonical.push('/');
        } else {
            canonical.push_str(&requote_path(path));
        }

        Ok(Self { canonical, query })
    }

    /// Canonical `scheme://authority/path` string
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// Parsed query parameters
    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Whether `observed` denotes the same resource and carries every
    /// parameter of this URL with the same values.
    ///
    /// Parameters present only in `observed` are ignored.
    #[must_use]
    pub fn accepts(&self, observed: &NormalizedUrl) -> bool {
        if self.canonical != observed.canonical {
            return false;
        }

        self.query
            .iter()
            .all(|(name, values)| observed.query.get(name) == Some(values))
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Normalize an optional URL; `None` stands for "any URL"
///
/// # Errors
///
/// Returns [`StubwireError::InvalidUrl`] if the URL cannot be parsed
pub fn normalize(url: Option<&str>) -> Result<Option<NormalizedUrl>> {
    url.map(NormalizedUrl::parse).transpose()
}

/// Split the query into a parameter map. Blank values are dropped.
fn parse_query(url: &Url) -> QueryParams {
    let mut query = QueryParams::new();

    for (name, value) in url.query_pairs() {
        if value.is_empty() {
            continue;
        }
        query
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    for values in query.values_mut() {
        values.sort_unstable();
    }

    query
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Rewrite percent escapes into one deterministic spelling.
///
/// The parser has already escaped non-ASCII and forbidden characters, so only
/// existing escapes and stray `%` signs need attention here.
fn requote_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte != b'%' {
            out.push(char::from(byte));
            i += 1;
            continue;
        }

        let escaped = bytes
            .get(i + 1)
            .copied()
            .and_then(hex_value)
            .zip(bytes.get(i + 2).copied().and_then(hex_value))
            .map(|(hi, lo)| (hi << 4) | lo);

        match escaped {
            Some(decoded) if is_unreserved(decoded) => {
                out.push(char::from(decoded));
                i += 3;
            }
            Some(decoded) => {
                out.push_str(&format!("%{decoded:02X}"));
                i += 3;
            }
            None => {
                out.push_str("%25");
                i += 1;
            }
        }
    }

    out
}
