//! Cache key namespacing.
//!
//! Keys have the shape `"<domain>:<operation>:<params>"` where `params` is the
//! canonical JSON of the call parameters (object keys sorted). Two calls with
//! equal parameters always build the same key, and every key of a domain is
//! matched by `"<domain>:*"` for bulk invalidation.

use super::errors::{CacheError, CacheResult};
use serde::Serialize;
use std::fmt;

/// A namespaced cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build `"<domain>:<operation>:<canonical params>"`.
    ///
    /// Parameters that serialize to `null` (e.g. `()`) are omitted, giving
    /// `"<domain>:<operation>"`.
    pub fn build<P>(domain: &str, operation: &str, params: &P) -> CacheResult<Self>
    where
        P: Serialize + ?Sized,
    {
        validate_segment(domain)?;
        validate_segment(operation)?;

        // Round-tripping through Value sorts object keys
        let value = serde_json::to_value(params)?;
        if value.is_null() {
            return Ok(Self(format!("{domain}:{operation}")));
        }
        Ok(Self(format!(
            "{domain}:{operation}:{}",
            serde_json::to_string(&value)?
        )))
    }

    /// Build a key without parameters
    pub fn simple(domain: &str, operation: &str) -> CacheResult<Self> {
        Self::build(domain, operation, &())
    }

    /// Glob matching every key in `domain`
    pub fn pattern(domain: &str) -> String {
        format!("{domain}:*")
    }

    /// Glob matching every parameterized key of one operation
    pub fn operation_pattern(domain: &str, operation: &str) -> String {
        format!("{domain}:{operation}:*")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_segment(segment: &str) -> CacheResult<()> {
    if segment.is_empty() || segment.contains([':', '*', '?']) {
        return Err(CacheError::InvalidPattern {
            pattern: segment.to_string(),
            reason: "key segments must be non-empty and free of ':', '*' and '?'".to_string(),
        });
    }
    Ok(())
}
