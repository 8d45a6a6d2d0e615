//! # Protected Notifier
//!
//! Wraps a [`NotificationTransport`] with retry and circuit breaker protection.
//! The full retry sequence encloses the breaker: transient failures on a
//! closed circuit are retried with backoff, an open circuit or a permanent
//! failure stops the sequence at once.
//!
//! Business flows call [`ProtectedNotifier::notify`], which never fails: a
//! notification that cannot be delivered is logged and reported as a
//! [`DeliveryOutcome`] so the triggering transaction is never rolled back.

use super::transport::{DeliveryReceipt, Notification, NotificationTransport, TransportError};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, RetryError, RetryExecutor,
    RetryPolicy,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error returned by [`ProtectedNotifier::send`]
pub type NotifyError = RetryError<CircuitBreakerError<TransportError>>;

/// Result of a best-effort delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered {
        attempts: u32,
        receipt: DeliveryReceipt,
    },
    /// Circuit open; the transport was not called
    Skipped { retry_after_secs: u64 },
    Failed { attempts: u32, error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Notification sender with retry and circuit breaker protection
#[derive(Debug, Clone)]
pub struct ProtectedNotifier {
    transport: Arc<dyn NotificationTransport>,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryExecutor,
}

impl ProtectedNotifier {
    pub fn new(
        transport: Arc<dyn NotificationTransport>,
        circuit_breaker: Arc<CircuitBreaker>,
        retry_policy: RetryPolicy,
    ) -> Self {
        let retry = RetryExecutor::new(circuit_breaker.name().to_string(), retry_policy);
        Self {
            transport,
            circuit_breaker,
            retry,
        }
    }

    /// Use the registry breaker for the transport's channel
    pub fn from_registry(
        transport: Arc<dyn NotificationTransport>,
        registry: &CircuitBreakerRegistry,
        retry_policy: RetryPolicy,
    ) -> Self {
        let circuit_breaker = registry.get_circuit_breaker(transport.channel().component_name());
        Self::new(transport, circuit_breaker, retry_policy)
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    /// Deliver with retries, returning the typed result
    pub async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt, NotifyError> {
        self.send_counted(notification).await.0
    }

    /// Deliver with retries; failures are logged and reported, never returned
    pub async fn notify(&self, notification: &Notification) -> DeliveryOutcome {
        let (result, attempts) = self.send_counted(notification).await;

        match result {
            Ok(receipt) => {
                info!(
                    component = %self.circuit_breaker.name(),
                    notification_id = %notification.id,
                    attempts = attempts,
                    "Notification delivered"
                );
                DeliveryOutcome::Delivered { attempts, receipt }
            }
            Err(RetryError::Aborted {
                error: CircuitBreakerError::CircuitOpen(info),
                ..
            }) => {
                warn!(
                    component = %self.circuit_breaker.name(),
                    notification_id = %notification.id,
                    retry_after_secs = info.retry_after_secs,
                    "Notification skipped, circuit open"
                );
                DeliveryOutcome::Skipped {
                    retry_after_secs: info.retry_after_secs,
                }
            }
            Err(e) => {
                error!(
                    component = %self.circuit_breaker.name(),
                    notification_id = %notification.id,
                    attempts = e.attempts(),
                    error = %e,
                    "Notification delivery failed"
                );
                DeliveryOutcome::Failed {
                    attempts: e.attempts(),
                    error: e.last_error().to_string(),
                }
            }
        }
    }

    async fn send_counted(
        &self,
        notification: &Notification,
    ) -> (Result<DeliveryReceipt, NotifyError>, u32) {
        let mut attempts = 0;
        let result = self
            .retry
            .with_retry_if(
                || {
                    attempts += 1;
                    self.circuit_breaker
                        .execute(|| self.transport.send(notification))
                },
                is_retryable,
            )
            .await;
        (result, attempts)
    }
}

fn is_retryable(error: &CircuitBreakerError<TransportError>) -> bool {
    match error {
        CircuitBreakerError::CircuitOpen(_) => false,
        CircuitBreakerError::Timeout { .. } => true,
        CircuitBreakerError::OperationFailed(e) => e.is_transient(),
    }
}
