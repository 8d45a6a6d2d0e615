//! Glob matching for cache key patterns.
//!
//! Supports the subset of Redis `MATCH` syntax used for invalidation:
//! `*` (any run of characters), `?` (exactly one character) and `\` to
//! escape the next character. Everything else matches literally.

use super::errors::{CacheError, CacheResult};
use regex::Regex;

/// A compiled glob pattern
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    /// Compile a glob into an anchored regular expression
    pub fn new(pattern: &str) -> CacheResult<Self> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push_str("(?s)^");

        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                '\\' => match chars.next() {
                    Some(escaped) => expr.push_str(&regex::escape(&escaped.to_string())),
                    None => {
                        return Err(CacheError::InvalidPattern {
                            pattern: pattern.to_string(),
                            reason: "trailing escape character".to_string(),
                        })
                    }
                },
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Whether `key` matches the whole pattern
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    /// The original glob text
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
