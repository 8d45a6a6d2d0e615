//! Crate-level error type.
//!
//! Breaker, retry and notifier errors stay generic over the wrapped upstream
//! error and are returned as-is; `GuardError` covers the failures of building
//! and running the system itself.

use crate::cache::CacheError;
use crate::config::ConfigurationError;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Unknown circuit breaker component: {0}")]
    UnknownComponent(String),
}

pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: GuardError = ConfigurationError::UnknownBackend {
            backend: "memcached".to_string(),
        }
        .into();
        assert!(matches!(err, GuardError::Configuration(_)));
        assert!(err.to_string().starts_with("Configuration error:"));

        let err: GuardError = CacheError::Timeout("get".to_string()).into();
        assert_eq!(err.to_string(), "Cache error: Cache operation timed out: get");
    }
}
