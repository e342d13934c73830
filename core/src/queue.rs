//! In-process notification queue.
//!
//! [`NotificationQueue`] is the production [`NotificationSink`]: enqueueing
//! pushes onto an unbounded `tokio` channel and returns immediately. A single
//! [`NotificationWorker`] drains the channel in order and hands each message
//! to a [`NotificationTransport`]. Delivery is best effort: a failed message
//! is logged and dropped, never retried.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, ShipmentError};
use crate::providers::{NotificationSink, NotificationTransport, OutboundMessage};

/// Sending half of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl NotificationSink for NotificationQueue {
    fn enqueue(&self, message: OutboundMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| ShipmentError::Notification("notification queue is closed".into()))
    }
}

/// Draining half of the queue.
#[derive(Debug)]
pub struct NotificationWorker<T> {
    receiver: mpsc::UnboundedReceiver<OutboundMessage>,
    transport: T,
}

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Messages the transport accepted
    pub delivered: usize,
    /// Messages the transport rejected
    pub failed: usize,
}

/// Create a queue and the worker that delivers through `transport`.
#[must_use]
pub fn notification_queue<T>(transport: T) -> (NotificationQueue, NotificationWorker<T>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        NotificationQueue { sender },
        NotificationWorker {
            receiver,
            transport,
        },
    )
}

impl<T: NotificationTransport + 'static> NotificationWorker<T> {
    /// Deliver messages until every [`NotificationQueue`] handle is dropped.
    pub async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();

        while let Some(message) = self.receiver.recv().await {
            match self.transport.deliver(&message).await {
                Ok(()) => {
                    stats.delivered += 1;
                    tracing::debug!(
                        channel = message.channel(),
                        to = message.recipient(),
                        "Notification delivered"
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        channel = message.channel(),
                        to = message.recipient(),
                        error = %e,
                        "Notification delivery failed"
                    );
                }
            }
        }

        tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Notification worker stopped"
        );
        stats
    }

    /// Run the worker on the current `tokio` runtime.
    pub fn spawn(self) -> JoinHandle<WorkerStats> {
        tokio::spawn(self.run())
    }
}
