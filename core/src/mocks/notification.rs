//! Mock notification sink and transport for testing.

use crate::error::{Result, ShipmentError};
use crate::providers::{NotificationSink, NotificationTransport, OutboundMessage};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Sink that records messages instead of queueing them.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<OutboundMessage>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far, in enqueue order.
    #[must_use]
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Forget recorded messages.
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }

    /// Reject every subsequent message with `Notification(message)`.
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }
}

impl NotificationSink for RecordingSink {
    fn enqueue(&self, message: OutboundMessage) -> Result<()> {
        let failure = self
            .failure
            .lock()
            .map_err(|_| ShipmentError::Notification("sink lock poisoned".into()))?
            .clone();
        if let Some(reason) = failure {
            return Err(ShipmentError::Notification(reason));
        }

        self.messages
            .lock()
            .map_err(|_| ShipmentError::Notification("sink lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

/// Transport that records deliveries and can be told to fail per recipient.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    delivered: Arc<Mutex<Vec<OutboundMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockTransport {
    /// Create a transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject messages addressed to `recipient`.
    pub fn fail_for(&self, recipient: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(recipient.to_string());
        }
    }

    /// Messages accepted so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.delivered
            .lock()
            .map(|delivered| delivered.clone())
            .unwrap_or_default()
    }
}

impl NotificationTransport for MockTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        let rejected = self
            .failing
            .lock()
            .map_err(|_| ShipmentError::Notification("transport lock poisoned".into()))?
            .contains(message.recipient());
        if rejected {
            return Err(ShipmentError::Notification(format!(
                "recipient {} rejected",
                message.recipient()
            )));
        }

        self.delivered
            .lock()
            .map_err(|_| ShipmentError::Notification("transport lock poisoned".into()))?
            .push(message.clone());
        Ok(())
    }
}
