//! # Circuit Breaker Implementation
//!
//! Provides fault isolation around calls to external dependencies. This follows
//! the classic circuit breaker pattern with three states: Closed (normal
//! operation), Open (failing fast), and Half-Open (testing recovery).
//!
//! ```text
//! CLOSED    --consecutive failures >= failure_threshold--> OPEN
//! OPEN      --now >= open_until (on next call)-----------> HALF_OPEN
//! HALF_OPEN --any failure--------------------------------> OPEN
//! HALF_OPEN --consecutive successes >= success_threshold-> CLOSED
//! CLOSED    --success------------------------------------> CLOSED (failures reset)
//! ```
//!
//! State mutation is serialized by a short-lived mutex that is never held
//! across an `.await`. Calls in flight complete in any order, so counters
//! reflect completion order rather than issue order.

use crate::resilience::events::{self, StateTransition, TransitionReason, TransitionSender};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerStats, CircuitBreakerStatus};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - calls are let through as probes
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(label)
    }
}

impl FromStr for CircuitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "closed" => Ok(CircuitState::Closed),
            "open" => Ok(CircuitState::Open),
            "half_open" | "halfopen" => Ok(CircuitState::HalfOpen),
            other => Err(format!("unknown circuit state '{other}'")),
        }
    }
}

/// Details of a call rejected by an open circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitOpenInfo {
    /// Breaker that rejected the call
    pub component: String,
    /// State at rejection time (always `Open`)
    pub state: CircuitState,
    /// Whole seconds until the breaker will let a probe through
    pub retry_after_secs: u64,
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not invoked
    #[error(
        "Circuit breaker is open for {}, retry in {}s",
        .0.component,
        .0.retry_after_secs
    )]
    CircuitOpen(CircuitOpenInfo),

    /// A single attempt exceeded the request timeout
    #[error("Operation timed out for {component} after {timeout_ms}ms")]
    Timeout { component: String, timeout_ms: u64 },

    /// The wrapped operation itself failed
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the call was rejected without being attempted
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen(_))
    }

    /// True when the attempt ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitBreakerError::Timeout { .. })
    }

    /// The upstream error, if the operation itself failed
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitBreakerError::OperationFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Lock-free cumulative counters
#[derive(Debug, Default)]
struct AtomicStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    rejected_requests: AtomicU64,
    timeouts: AtomicU64,
}

impl AtomicStats {
    fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.successful_requests.store(0, Ordering::Relaxed);
        self.failed_requests.store(0, Ordering::Relaxed);
        self.rejected_requests.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
    }
}

/// State-machine fields mutated together under one lock
#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Set exactly when entering OPEN, cleared on CLOSED
    open_until: Option<Instant>,
    last_error: Option<String>,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            open_until: None,
            last_error: None,
        }
    }

    fn enter_open(&mut self, reset_timeout: Duration) {
        self.state = CircuitState::Open;
        self.consecutive_successes = 0;
        self.open_until = Some(Instant::now() + reset_timeout);
    }

    fn enter_closed(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.open_until = None;
    }

    fn enter_half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.consecutive_successes = 0;
    }

    fn remaining_open(&self) -> Option<Duration> {
        match (self.state, self.open_until) {
            (CircuitState::Open, Some(until)) => {
                Some(until.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    (duration.as_millis() as u64).div_ceil(1000)
}

/// Per-dependency circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and status
    name: String,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State machine
    core: Mutex<BreakerCore>,

    /// Cumulative statistics
    stats: AtomicStats,

    /// Transition events
    events: TransitionSender,

    /// When false, failures are counted but never open the circuit
    tripping: bool,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with its own event channel
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_event_sender(name, config, events::channel())
    }

    /// Create a breaker that publishes transitions on a shared channel
    pub fn with_event_sender(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        events: TransitionSender,
    ) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            success_threshold = config.success_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            config,
            core: Mutex::new(BreakerCore::new()),
            stats: AtomicStats::default(),
            events,
            tripping: true,
        }
    }

    /// Disable automatic opening. Calls still run under `request_timeout` and
    /// feed statistics; only [`force_state`](Self::force_state) changes state.
    pub fn without_tripping(mut self) -> Self {
        debug!(component = %self.name, "Automatic circuit opening disabled");
        self.tripping = false;
        self
    }

    /// Whether failures can open this circuit
    pub fn is_tripping(&self) -> bool {
        self.tripping
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.core.lock().state
    }

    /// Subscribe to this breaker's transition channel
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.events.subscribe()
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// The operation races against `request_timeout`. On timeout the future is
    /// dropped; work it already handed off elsewhere (spawned tasks, remote
    /// requests) is not reclaimed by the breaker.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Err(info) = self.try_acquire() {
            self.stats.rejected_requests.fetch_add(1, Ordering::Relaxed);
            warn!(
                component = %self.name,
                retry_after_secs = info.retry_after_secs,
                "Circuit open, rejecting call"
            );
            return Err(CircuitBreakerError::CircuitOpen(info));
        }

        let started = Instant::now();
        match tokio::time::timeout(self.config.request_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success(started.elapsed());
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure(err.to_string(), false, started.elapsed());
                Err(CircuitBreakerError::OperationFailed(err))
            }
            Err(_) => {
                let timeout_ms = self.config.request_timeout.as_millis() as u64;
                self.on_failure(
                    format!("timed out after {timeout_ms}ms"),
                    true,
                    started.elapsed(),
                );
                Err(CircuitBreakerError::Timeout {
                    component: self.name.clone(),
                    timeout_ms,
                })
            }
        }
    }

    /// Execute with a fallback used only when the circuit rejects the call.
    ///
    /// The fallback's value is returned as-is and leaves success/failure
    /// statistics untouched. Timeouts and upstream failures still surface.
    pub async fn execute_with_fallback<F, Fut, T, E, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(&CircuitOpenInfo) -> T,
    {
        match self.execute(operation).await {
            Err(CircuitBreakerError::CircuitOpen(info)) => {
                debug!(component = %self.name, "Serving fallback for open circuit");
                Ok(fallback(&info))
            }
            other => other,
        }
    }

    /// Decide whether a call may proceed, moving OPEN → HALF_OPEN when due
    fn try_acquire(&self) -> Result<(), CircuitOpenInfo> {
        {
            let mut core = self.core.lock();
            match core.state {
                CircuitState::Closed | CircuitState::HalfOpen => return Ok(()),
                CircuitState::Open => {
                    let remaining = core.remaining_open().unwrap_or(Duration::ZERO);
                    if !remaining.is_zero() {
                        return Err(CircuitOpenInfo {
                            component: self.name.clone(),
                            state: CircuitState::Open,
                            retry_after_secs: ceil_secs(remaining),
                        });
                    }
                    core.enter_half_open();
                }
            }
        }

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "Circuit breaker half-open (testing recovery)"
        );
        self.publish(
            CircuitState::Open,
            CircuitState::HalfOpen,
            TransitionReason::ResetTimeoutElapsed,
        );
        Ok(())
    }

    fn on_success(&self, duration: Duration) {
        self.stats.successful_requests.fetch_add(1, Ordering::Relaxed);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        let recovered = {
            let mut core = self.core.lock();
            match core.state {
                CircuitState::Closed => {
                    core.consecutive_failures = 0;
                    false
                }
                CircuitState::HalfOpen => {
                    core.consecutive_successes += 1;
                    if core.consecutive_successes >= self.config.success_threshold {
                        core.enter_closed();
                        true
                    } else {
                        false
                    }
                }
                CircuitState::Open => {
                    // A call issued before the circuit opened finished late
                    debug!(component = %self.name, "Success recorded while circuit is open");
                    false
                }
            }
        };

        if recovered {
            info!(
                component = %self.name,
                total_requests = self.stats.total_requests.load(Ordering::Relaxed),
                "Circuit breaker closed (recovered)"
            );
            self.publish(
                CircuitState::HalfOpen,
                CircuitState::Closed,
                TransitionReason::Recovered,
            );
        }
    }

    fn on_failure(&self, message: String, timed_out: bool, duration: Duration) {
        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        error!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            timed_out = timed_out,
            error = %message,
            "Operation failed"
        );

        let transition = {
            let mut core = self.core.lock();
            core.last_error = Some(message);
            match core.state {
                _ if !self.tripping => {
                    core.consecutive_failures = core.consecutive_failures.saturating_add(1);
                    None
                }
                CircuitState::Closed => {
                    core.consecutive_failures += 1;
                    if core.consecutive_failures >= self.config.failure_threshold {
                        core.enter_open(self.config.reset_timeout);
                        Some((CircuitState::Closed, TransitionReason::FailureThreshold))
                    } else {
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    // Single strike: any probe failure re-opens
                    core.consecutive_failures += 1;
                    core.enter_open(self.config.reset_timeout);
                    Some((CircuitState::HalfOpen, TransitionReason::ProbeFailed))
                }
                CircuitState::Open => None,
            }
        };

        if let Some((from, reason)) = transition {
            error!(
                component = %self.name,
                failure_threshold = self.config.failure_threshold,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker opened (failing fast)"
            );
            self.publish(from, CircuitState::Open, reason);
        }
    }

    fn publish(&self, from: CircuitState, to: CircuitState, reason: TransitionReason) {
        // No subscribers is not an error
        let _ = self.events.send(StateTransition {
            component: self.name.clone(),
            from,
            to,
            reason,
            at: Utc::now(),
        });
    }

    /// Force the circuit into `state`, resetting counters to match it.
    ///
    /// CLOSED zeroes both consecutive counters and clears `open_until`;
    /// OPEN starts a fresh reset timeout; HALF_OPEN zeroes both counters.
    pub fn force_state(&self, state: CircuitState) {
        warn!(component = %self.name, target = %state, "Circuit breaker state forced");

        let previous = {
            let mut core = self.core.lock();
            let previous = core.state;
            match state {
                CircuitState::Closed => core.enter_closed(),
                CircuitState::Open => core.enter_open(self.config.reset_timeout),
                CircuitState::HalfOpen => {
                    core.enter_half_open();
                    core.consecutive_failures = 0;
                }
            }
            previous
        };

        if previous != state {
            self.publish(previous, state, TransitionReason::Forced);
        }
    }

    /// Zero every counter without touching the state
    pub fn reset_stats(&self) {
        self.stats.reset();
        let mut core = self.core.lock();
        core.consecutive_failures = 0;
        core.consecutive_successes = 0;
        core.last_error = None;
        debug!(component = %self.name, "Circuit breaker statistics reset");
    }

    /// Force CLOSED and zero every counter
    pub fn reset(&self) {
        self.force_state(CircuitState::Closed);
        self.reset_stats();
    }

    /// Read-only snapshot of state and statistics
    pub fn get_status(&self) -> CircuitBreakerStatus {
        let core = self.core.lock();
        let remaining = core.remaining_open();
        let open_until = remaining.and_then(|r| {
            chrono::Duration::from_std(r)
                .ok()
                .map(|delta| Utc::now() + delta)
        });

        CircuitBreakerStatus {
            name: self.name.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            consecutive_successes: core.consecutive_successes,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
            request_timeout_ms: self.config.request_timeout.as_millis() as u64,
            open_until,
            retry_after_secs: remaining.map(ceil_secs).unwrap_or(0),
            stats: CircuitBreakerStats {
                total_requests: self.stats.total_requests.load(Ordering::Relaxed),
                successful_requests: self.stats.successful_requests.load(Ordering::Relaxed),
                failed_requests: self.stats.failed_requests.load(Ordering::Relaxed),
                rejected_requests: self.stats.rejected_requests.load(Ordering::Relaxed),
                timeouts: self.stats.timeouts.load(Ordering::Relaxed),
                last_error: core.last_error.clone(),
            },
        }
    }

    /// Check if circuit is healthy (closed with a low failure rate)
    pub fn is_healthy(&self) -> bool {
        self.get_status().is_healthy()
    }
}
