//! Notification payloads and the transport seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::resilience::components;

/// Delivery channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    WhatsApp,
}

impl Channel {
    /// Breaker protecting this channel's transport
    pub fn component_name(self) -> &'static str {
        match self {
            Channel::Email => components::EMAIL_SERVICE,
            Channel::WhatsApp => components::WHATSAPP_SERVICE,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => f.write_str("email"),
            Channel::WhatsApp => f.write_str("whatsapp"),
        }
    }
}

/// A message ready for delivery.
///
/// `id` doubles as the idempotency key: every retry of one notification
/// carries the same id, so transports that support it can drop duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Notification {
    pub fn email(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::new(Channel::Email, recipient, Some(subject.into()), body)
    }

    pub fn whatsapp(recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Channel::WhatsApp, recipient, None, body)
    }

    fn new(
        channel: Channel,
        recipient: impl Into<String>,
        subject: Option<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            recipient: recipient.into(),
            subject,
            body: body.into(),
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Proof of delivery returned by a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub notification_id: Uuid,
    /// Identifier assigned by the provider, when it returns one
    pub provider_message_id: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn for_notification(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id,
            provider_message_id: None,
            delivered_at: Utc::now(),
        }
    }

    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_message_id = Some(id.into());
        self
    }
}

/// Transport failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Network trouble, 5xx, throttling; worth another attempt
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Invalid recipient, rejected payload, bad credentials
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Transient(_))
    }
}

/// Something that can deliver a [`Notification`] (SMTP relay, WhatsApp API, ...)
#[async_trait::async_trait]
pub trait NotificationTransport: Send + Sync + fmt::Debug {
    /// Deliver one notification. Must tolerate repeated calls with the same `id`.
    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt, TransportError>;

    /// Channel this transport serves
    fn channel(&self) -> Channel;
}
