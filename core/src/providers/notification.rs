//! Outbound notification traits.
//!
//! Messages are produced synchronously by the lifecycle and handed to a
//! [`NotificationSink`]. Delivery through a [`NotificationTransport`] happens
//! later, on a worker, and its failures never reach the lifecycle.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A message waiting to be delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Plain email with a ready-made body.
    Email {
        /// Recipient address
        to: String,
        /// Subject line
        subject: String,
        /// HTML body
        body: String,
    },
    /// Email rendered from a named template.
    TemplatedEmail {
        /// Recipient address
        to: String,
        /// Subject line
        subject: String,
        /// Template name, e.g. `mail_placed.html`
        template: String,
        /// Template variables
        context: serde_json::Value,
    },
    /// Text message.
    Sms {
        /// Recipient phone number
        to: String,
        /// Message text
        body: String,
    },
}

impl OutboundMessage {
    /// Recipient address or phone number.
    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::Email { to, .. } | Self::TemplatedEmail { to, .. } | Self::Sms { to, .. } => to,
        }
    }

    /// Short channel name for logs.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        match self {
            Self::Email { .. } | Self::TemplatedEmail { .. } => "email",
            Self::Sms { .. } => "sms",
        }
    }
}

/// Accepts messages for later delivery.
///
/// `enqueue` must not block on delivery.
pub trait NotificationSink: Send + Sync {
    /// Queue a message.
    ///
    /// # Errors
    ///
    /// Returns `ShipmentError::Notification` if the queue is closed.
    fn enqueue(&self, message: OutboundMessage) -> Result<()>;
}

/// Email delivery service (SMTP, console).
pub trait EmailTransport: Send + Sync {
    /// Send an email with a ready-made HTML body.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network request fails
    /// - Email provider rejects the request
    fn send_email(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Render `template` with `context` and send it.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The template is unknown
    /// - Network request fails
    /// - Email provider rejects the request
    fn send_templated_email(
        &self,
        to: &str,
        subject: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// SMS delivery service (Twilio, console).
pub trait SmsTransport: Send + Sync {
    /// Send a text message.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network request fails
    /// - SMS provider rejects the request
    fn send_sms(
        &self,
        to: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Delivers any [`OutboundMessage`].
pub trait NotificationTransport: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying transport fails.
    fn deliver(
        &self,
        message: &OutboundMessage,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// An email transport and an SMS transport routed by message kind.
#[derive(Debug, Clone)]
pub struct Transports<E, S> {
    /// Email transport
    pub email: E,
    /// SMS transport
    pub sms: S,
}

impl<E, S> Transports<E, S> {
    /// Pair an email and an SMS transport.
    #[must_use]
    pub const fn new(email: E, sms: S) -> Self {
        Self { email, sms }
    }
}

impl<E: EmailTransport, S: SmsTransport> NotificationTransport for Transports<E, S> {
    async fn deliver(&self, message: &OutboundMessage) -> Result<()> {
        match message {
            OutboundMessage::Email { to, subject, body } => {
                self.email.send_email(to, subject, body).await
            }
            OutboundMessage::TemplatedEmail {
                to,
                subject,
                template,
                context,
            } => {
                self.email
                    .send_templated_email(to, subject, template, context)
                    .await
            }
            OutboundMessage::Sms { to, body } => self.sms.send_sms(to, body).await,
        }
    }
}
