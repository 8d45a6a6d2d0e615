//! # Circuit Breaker Configuration
//!
//! Runtime configuration for a single circuit breaker, plus presets for the
//! external services this crate protects.
//!
//! **Note**: For system-wide configuration loaded from TOML files, use
//! `crate::config::CircuitBreakerConfig`, whose component entries convert into
//! this type via `to_resilience_config()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known logical breaker names used by the notification and content clients.
pub mod components {
    /// AI content generation
    pub const AI_SERVICE: &str = "ai-service";
    /// Media hosting / image uploads
    pub const MEDIA_SERVICE: &str = "media-service";
    /// Transactional email
    pub const EMAIL_SERVICE: &str = "email-service";
    /// WhatsApp messaging delivery
    pub const WHATSAPP_SERVICE: &str = "whatsapp-service";
    /// Remote cache backend
    pub const CACHE: &str = "cache";
}

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures (while closed) before opening the circuit
    pub failure_threshold: u32,

    /// Number of consecutive successes in half-open state to close the circuit
    pub success_threshold: u32,

    /// Time to stay open before a call may re-probe the dependency
    pub reset_timeout: Duration,

    /// Deadline for a single attempt; exceeding it counts as a failure
    pub request_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// AI content generation: slow calls, quick to trip
    pub fn for_ai_service() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Media hosting: large uploads, more tolerant of failures
    pub fn for_media_service() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Transactional email
    pub fn for_email_service() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Messaging delivery (WhatsApp)
    pub fn for_messaging_service() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Remote cache backend: fail fast, recover fast
    pub fn for_cache() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            reset_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(2),
        }
    }

    /// Preset for a well-known component name, if there is one
    pub fn preset_for(component_name: &str) -> Option<Self> {
        match component_name {
            components::AI_SERVICE => Some(Self::for_ai_service()),
            components::MEDIA_SERVICE => Some(Self::for_media_service()),
            components::EMAIL_SERVICE => Some(Self::for_email_service()),
            components::WHATSAPP_SERVICE => Some(Self::for_messaging_service()),
            components::CACHE => Some(Self::for_cache()),
            _ => None,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }

        if self.success_threshold > 50 {
            return Err("success_threshold should not exceed 50".to_string());
        }

        if self.reset_timeout.is_zero() {
            return Err("reset_timeout must be greater than 0".to_string());
        }

        if self.reset_timeout > Duration::from_secs(3600) {
            return Err("reset_timeout should not exceed 3600 seconds".to_string());
        }

        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }

        if self.request_timeout > Duration::from_secs(600) {
            return Err("request_timeout should not exceed 600 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}
