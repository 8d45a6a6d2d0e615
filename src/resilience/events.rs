//! # Circuit Breaker Events
//!
//! State transitions are published on a `tokio::sync::broadcast` channel.
//! Diagnostics and logging subscribe to the channel; breakers never wait on
//! subscribers and a slow subscriber only lags itself.

use crate::resilience::CircuitState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default buffered events per channel before slow subscribers start lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Why a breaker changed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// Consecutive failures reached the threshold while closed
    FailureThreshold,
    /// A probe failed while half-open
    ProbeFailed,
    /// The reset timeout elapsed while open
    ResetTimeoutElapsed,
    /// Consecutive successes reached the threshold while half-open
    Recovered,
    /// Administrative override (`force_state` / `reset`)
    Forced,
}

/// A single state change of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub component: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: TransitionReason,
    pub at: DateTime<Utc>,
}

/// Sending half shared by breakers
pub type TransitionSender = broadcast::Sender<StateTransition>;

/// Create a new transition channel
pub fn channel() -> TransitionSender {
    let (sender, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
    sender
}

/// Spawn a task that logs every transition until the channel closes.
///
/// Returns the task handle so the owner can abort it at shutdown.
pub fn spawn_transition_logger(
    mut receiver: broadcast::Receiver<StateTransition>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(transition) => info!(
                    component = %transition.component,
                    from = ?transition.from,
                    to = ?transition.to,
                    reason = ?transition.reason,
                    at = %transition.at.to_rfc3339(),
                    "Circuit breaker transition"
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Transition logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Transition channel closed, logger exiting");
                    break;
                }
            }
        }
    })
}
