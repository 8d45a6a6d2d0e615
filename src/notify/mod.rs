//! # Upstream Call Sites
//!
//! Protection for the application's outbound integrations:
//!
//! - [`ProtectedNotifier`]: email and WhatsApp delivery with retry plus circuit
//!   breaker, degrading to a logged [`DeliveryOutcome`] instead of an error
//! - [`ProtectedClient`]: AI content and media hosting calls with circuit
//!   breaker, fallback and optional response caching
//!
//! Message content and the business triggers (order status changes) live
//! with the caller; this module only protects transport.

pub mod client;
pub mod notifier;
pub mod transport;

pub use client::ProtectedClient;
pub use notifier::{DeliveryOutcome, NotifyError, ProtectedNotifier};
pub use transport::{Channel, DeliveryReceipt, Notification, NotificationTransport, TransportError};
