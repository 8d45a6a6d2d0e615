//! # Circuit Breaker Metrics
//!
//! Read-only snapshots of circuit breaker state and cumulative statistics.
//! These are what the diagnostics surface (`get_status`, `get_all_status`)
//! hands out; mutating a snapshot never affects the breaker.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cumulative request statistics for one circuit breaker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Every call to `execute`, including rejected ones
    pub total_requests: u64,

    /// Calls whose operation completed successfully
    pub successful_requests: u64,

    /// Calls whose operation failed or timed out
    pub failed_requests: u64,

    /// Calls rejected without invoking the operation (circuit open)
    pub rejected_requests: u64,

    /// Attempts that exceeded the request timeout (subset of `failed_requests`)
    pub timeouts: u64,

    /// Display form of the most recent failure
    pub last_error: Option<String>,
}

impl CircuitBreakerStats {
    /// Fraction of executed (non-rejected) calls that failed
    pub fn failure_rate(&self) -> f64 {
        let executed = self.successful_requests + self.failed_requests;
        if executed == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / executed as f64
    }

    /// True when every counter is zero and no error is recorded
    pub fn is_zeroed(&self) -> bool {
        *self == Self::default()
    }
}

/// Point-in-time snapshot of a circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    /// Logical breaker name
    pub name: String,

    /// Current state
    pub state: CircuitState,

    /// Consecutive failures counted while closed
    pub consecutive_failures: u32,

    /// Consecutive successes counted while half-open
    pub consecutive_successes: u32,

    /// Configured thresholds and timeouts
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub request_timeout_ms: u64,

    /// Wall-clock time at which an open circuit becomes eligible for a probe
    pub open_until: Option<DateTime<Utc>>,

    /// Seconds until the next eligible attempt (0 unless open)
    pub retry_after_secs: u64,

    /// Cumulative statistics
    pub stats: CircuitBreakerStats,
}

impl CircuitBreakerStatus {
    /// Check if the snapshot indicates healthy operation
    pub fn is_healthy(&self) -> bool {
        match self.state {
            CircuitState::Closed => {
                let executed = self.stats.successful_requests + self.stats.failed_requests;
                // Too few calls to judge
                executed < 10 || self.stats.failure_rate() < 0.1
            }
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    /// Human-readable state description
    pub fn state_description(&self) -> &'static str {
        match self.state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Testing dependency health",
        }
    }

    /// Format for logging
    pub fn format_summary(&self) -> String {
        format!(
            "{}: {} | Requests: {} | Failed: {} | Rejected: {} | Timeouts: {}",
            self.name,
            self.state_description(),
            self.stats.total_requests,
            self.stats.failed_requests,
            self.stats.rejected_requests,
            self.stats.timeouts
        )
    }
}

/// Registry-wide aggregation of breaker snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerStatus {
    /// Snapshot per breaker name
    pub circuit_breakers: HashMap<String, CircuitBreakerStatus>,

    /// When the snapshots were collected
    pub collected_at: DateTime<Utc>,
}

impl SystemCircuitBreakerStatus {
    /// Build from a name → status mapping
    pub fn new(circuit_breakers: HashMap<String, CircuitBreakerStatus>) -> Self {
        Self {
            circuit_breakers,
            collected_at: Utc::now(),
        }
    }

    /// Count of breakers by state
    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for status in self.circuit_breakers.values() {
            *counts.entry(status.state).or_insert(0) += 1;
        }
        counts
    }

    /// Names of unhealthy breakers, sorted
    pub fn unhealthy_circuits(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .circuit_breakers
            .values()
            .filter(|status| !status.is_healthy())
            .map(|status| status.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Fraction of healthy breakers (1.0 when there are none)
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy = self
            .circuit_breakers
            .values()
            .filter(|status| status.is_healthy())
            .count();

        healthy as f64 / self.circuit_breakers.len() as f64
    }

    /// Total requests across all breakers
    pub fn total_requests(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|status| status.stats.total_requests)
            .sum()
    }

    /// Total rejected requests across all breakers
    pub fn total_rejected(&self) -> u64 {
        self.circuit_breakers
            .values()
            .map(|status| status.stats.rejected_requests)
            .sum()
    }

    /// Format summary for logging
    pub fn format_summary(&self) -> String {
        let counts = self.count_by_state();
        format!(
            "Breakers: {} (closed: {}, open: {}, half-open: {}) | Health: {:.1}% | Requests: {} | Rejected: {}",
            self.circuit_breakers.len(),
            counts.get(&CircuitState::Closed).unwrap_or(&0),
            counts.get(&CircuitState::Open).unwrap_or(&0),
            counts.get(&CircuitState::HalfOpen).unwrap_or(&0),
            self.health_score() * 100.0,
            self.total_requests(),
            self.total_rejected()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, state: CircuitState, ok: u64, failed: u64) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            name: name.to_string(),
            state,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout_ms: 60_000,
            request_timeout_ms: 30_000,
            open_until: None,
            retry_after_secs: 0,
            stats: CircuitBreakerStats {
                total_requests: ok + failed,
                successful_requests: ok,
                failed_requests: failed,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_failure_rate_ignores_rejections() {
        let stats = CircuitBreakerStats {
            total_requests: 10,
            successful_requests: 3,
            failed_requests: 1,
            rejected_requests: 6,
            ..Default::default()
        };
        assert!((stats.failure_rate() - 0.25).abs() < f64::EPSILON);
        assert_eq!(CircuitBreakerStats::default().failure_rate(), 0.0);
    }

    #[test]
    fn test_health_classification() {
        assert!(status("a", CircuitState::Closed, 5, 3).is_healthy());
        assert!(!status("a", CircuitState::Closed, 50, 20).is_healthy());
        assert!(!status("a", CircuitState::Open, 0, 3).is_healthy());
        assert!(status("a", CircuitState::HalfOpen, 0, 3).is_healthy());
    }

    #[test]
    fn test_system_aggregation() {
        let mut map = HashMap::new();
        map.insert(
            "email-service".to_string(),
            status("email-service", CircuitState::Open, 0, 3),
        );
        map.insert(
            "ai-service".to_string(),
            status("ai-service", CircuitState::Closed, 4, 0),
        );
        let system = SystemCircuitBreakerStatus::new(map);

        assert_eq!(system.count_by_state().get(&CircuitState::Open), Some(&1));
        assert_eq!(system.unhealthy_circuits(), vec!["email-service"]);
        assert!((system.health_score() - 0.5).abs() < f64::EPSILON);
        assert_eq!(system.total_requests(), 7);
        assert!(system.format_summary().contains("open: 1"));
    }

    #[test]
    fn test_empty_system_is_healthy() {
        let system = SystemCircuitBreakerStatus::new(HashMap::new());
        assert_eq!(system.health_score(), 1.0);
    }
}
