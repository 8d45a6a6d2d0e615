//! Shared helpers for integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::Level;
use upstream_guard::notify::{
    Channel, DeliveryReceipt, Notification, NotificationTransport, TransportError,
};

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Counts invocations of an upstream double
#[derive(Debug, Default, Clone)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Transport that fails with scripted errors, then delivers
#[derive(Debug)]
pub struct RecordingTransport {
    channel: Channel,
    script: Mutex<VecDeque<TransportError>>,
    delivered: Mutex<Vec<Notification>>,
    attempts: CallCounter,
}

impl RecordingTransport {
    pub fn new(channel: Channel) -> Arc<Self> {
        Self::scripted(channel, Vec::new())
    }

    pub fn scripted(channel: Channel, failures: Vec<TransportError>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            script: Mutex::new(failures.into()),
            delivered: Mutex::new(Vec::new()),
            attempts: CallCounter::default(),
        })
    }

    /// Fail the next `times` calls with `error`
    pub fn fail_next(&self, error: TransportError, times: usize) {
        self.script.lock().extend(std::iter::repeat(error).take(times));
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.count()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().clone()
    }
}

#[async_trait::async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, notification: &Notification) -> Result<DeliveryReceipt, TransportError> {
        let attempt = self.attempts.hit();
        if let Some(error) = self.script.lock().pop_front() {
            return Err(error);
        }
        self.delivered.lock().push(notification.clone());
        Ok(DeliveryReceipt::for_notification(notification)
            .with_provider_id(format!("{}-{attempt}", self.channel)))
    }

    fn channel(&self) -> Channel {
        self.channel
    }
}
