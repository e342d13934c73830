//! Notification trigger.
//!
//! Maps a status change to the message the client receives and to the side
//! effect that goes with it (verification code, review link). The mapping
//! itself is pure, see [`plan_for`]. Issuing the verification code is
//! synchronous so the code exists before the update that caused it returns.
//! Everything else is queued on a [`NotificationSink`].

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::error::Result;
use crate::providers::{NotificationSink, OutboundMessage, VerificationCodeStore};
use crate::token::{TokenCodec, TokenPurpose};
use crate::types::{Shipment, ShipmentId, ShipmentStatus};

/// Extra work attached to a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Just the email
    EmailOnly,
    /// Issue a delivery verification code
    VerificationCode,
    /// Include a signed review link
    ReviewToken,
}

/// What to send for a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPlan {
    /// Email subject
    pub subject: &'static str,
    /// Email template name
    pub template: &'static str,
    /// Attached side effect
    pub side_effect: SideEffect,
}

/// The notification plan for entering `status`, `None` when the client is not told.
#[must_use]
pub const fn plan_for(status: ShipmentStatus) -> Option<NotificationPlan> {
    match status {
        ShipmentStatus::Placed => Some(NotificationPlan {
            subject: "Your shipment has been placed 📦",
            template: "mail_placed.html",
            side_effect: SideEffect::EmailOnly,
        }),
        ShipmentStatus::InTransit => None,
        ShipmentStatus::OutForDelivery => Some(NotificationPlan {
            subject: "Your shipment is out for delivery 🚚",
            template: "mail_out_for_delivery.html",
            side_effect: SideEffect::VerificationCode,
        }),
        ShipmentStatus::Delivered => Some(NotificationPlan {
            subject: "Your shipment has been delivered 🛳",
            template: "mail_delivered.html",
            side_effect: SideEffect::ReviewToken,
        }),
        ShipmentStatus::Cancelled => Some(NotificationPlan {
            subject: "Your shipment has been cancelled ❌",
            template: "mail_cancelled.html",
            side_effect: SideEffect::EmailOnly,
        }),
    }
}

/// Six-digit delivery verification code, `100000..=999999`.
#[must_use]
pub fn generate_verification_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Names shown in notification emails.
#[derive(Debug, Clone, Copy)]
pub struct Parties<'a> {
    /// Seller name
    pub seller: &'a str,
    /// Delivery partner name
    pub delivery_partner: &'a str,
}

/// Fires notifications after status-changing timeline appends.
#[derive(Debug, Clone)]
pub struct NotificationTrigger<C, N> {
    codes: C,
    sink: N,
    tokens: TokenCodec,
    app: AppConfig,
}

impl<C: VerificationCodeStore, N: NotificationSink> NotificationTrigger<C, N> {
    /// Trigger issuing codes into `codes` and queueing messages on `sink`.
    #[must_use]
    pub const fn new(codes: C, sink: N, tokens: TokenCodec, app: AppConfig) -> Self {
        Self {
            codes,
            sink,
            tokens,
            app,
        }
    }

    /// Verification code store.
    #[must_use]
    pub const fn codes(&self) -> &C {
        &self.codes
    }

    /// Outbound message sink.
    #[must_use]
    pub const fn sink(&self) -> &N {
        &self.sink
    }

    /// Token codec used for review links.
    #[must_use]
    pub const fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Signed review token for a shipment.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the token cannot be encoded.
    pub fn review_token(&self, shipment: ShipmentId, issued_at: DateTime<Utc>) -> Result<String> {
        self.tokens
            .encode(TokenPurpose::Review, &shipment.to_string(), issued_at)
    }

    /// Public link to the review form.
    #[must_use]
    pub fn review_url(&self, token: &str) -> String {
        format!("{}/shipment/review?token={token}", self.app.base_url())
    }

    /// Notify the client that `shipment` entered its current status.
    ///
    /// Never fails. Code store and queue errors are logged and dropped, the
    /// status change that caused the notification stands.
    pub async fn fire(&self, shipment: &Shipment, parties: Parties<'_>, now: DateTime<Utc>) {
        let Some(status) = shipment.status() else {
            return;
        };
        let Some(plan) = plan_for(status) else {
            tracing::debug!(shipment_id = %shipment.id, %status, "No notification for status");
            return;
        };

        let mut context = Map::new();
        context.insert("shipment_id".into(), Value::String(shipment.id.to_string()));
        context.insert("seller".into(), Value::String(parties.seller.to_string()));
        context.insert(
            "delivery_partner".into(),
            Value::String(parties.delivery_partner.to_string()),
        );

        match plan.side_effect {
            SideEffect::EmailOnly => {}
            SideEffect::VerificationCode => self.issue_code(shipment, &mut context).await,
            SideEffect::ReviewToken => match self.review_token(shipment.id, now) {
                Ok(token) => {
                    context.insert("review_url".into(), Value::String(self.review_url(&token)));
                }
                Err(e) => {
                    tracing::warn!(shipment_id = %shipment.id, error = %e, "Failed to issue review token");
                }
            },
        }

        self.enqueue(OutboundMessage::TemplatedEmail {
            to: shipment.client_contact_email.clone(),
            subject: plan.subject.to_string(),
            template: plan.template.to_string(),
            context: Value::Object(context),
        });

        tracing::info!(
            shipment_id = %shipment.id,
            %status,
            template = plan.template,
            "Notification queued"
        );
    }

    async fn issue_code(&self, shipment: &Shipment, context: &mut Map<String, Value>) {
        let code = generate_verification_code();

        if let Err(e) = self.codes.set_code(shipment.id, &code).await {
            tracing::warn!(
                shipment_id = %shipment.id,
                error = %e,
                "Failed to store verification code"
            );
            return;
        }

        match &shipment.client_contact_phone {
            Some(phone) => self.enqueue(OutboundMessage::Sms {
                to: phone.clone(),
                body: format!(
                    "Your verification code for delivery of shipment {} is {code}.",
                    shipment.id
                ),
            }),
            None => {
                context.insert("verification_code".into(), Value::String(code));
            }
        }
    }

    /// Queue a message, logging instead of failing.
    pub fn enqueue(&self, message: OutboundMessage) {
        let channel = message.channel();
        if let Err(e) = self.sink.enqueue(message) {
            tracing::warn!(channel, error = %e, "Failed to queue notification");
        }
    }
}

#[cfg(all(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::mocks::{MockCodeStore, RecordingSink, sample_shipment};
    use crate::types::{EventId, ShipmentEvent};

    fn trigger() -> NotificationTrigger<MockCodeStore, RecordingSink> {
        NotificationTrigger::new(
            MockCodeStore::new(),
            RecordingSink::new(),
            TokenCodec::new("secret"),
            AppConfig {
                name: "Shiptrack".into(),
                domain: "track.example.com".into(),
                scheme: "https".into(),
            },
        )
    }

    fn with_status(mut shipment: Shipment, status: ShipmentStatus) -> Shipment {
        let sequence = shipment.timeline.len() as u64 + 1;
        shipment.timeline.push(ShipmentEvent {
            id: EventId::new(),
            shipment_id: shipment.id,
            location: 11001,
            status,
            description: String::new(),
            created_at: Utc::now(),
            sequence,
        });
        shipment
    }

    const PARTIES: Parties<'static> = Parties {
        seller: "Acme",
        delivery_partner: "FastShip",
    };

    #[test]
    fn test_plan_table() {
        assert!(plan_for(ShipmentStatus::InTransit).is_none());
        assert_eq!(
            plan_for(ShipmentStatus::Placed).unwrap().template,
            "mail_placed.html"
        );
        assert_eq!(
            plan_for(ShipmentStatus::OutForDelivery).unwrap().side_effect,
            SideEffect::VerificationCode
        );
        assert_eq!(
            plan_for(ShipmentStatus::Delivered).unwrap().subject,
            "Your shipment has been delivered 🛳"
        );
        assert_eq!(
            plan_for(ShipmentStatus::Cancelled).unwrap().subject,
            "Your shipment has been cancelled ❌"
        );
    }

    #[test]
    fn test_verification_code_is_six_digits() {
        for _ in 0..100 {
            let code: u32 = generate_verification_code().parse().unwrap();
            assert!((100_000..=999_999).contains(&code));
        }
    }

    #[tokio::test]
    async fn test_in_transit_sends_nothing() {
        let trigger = trigger();
        let shipment = with_status(sample_shipment(), ShipmentStatus::InTransit);

        trigger.fire(&shipment, PARTIES, Utc::now()).await;

        assert!(trigger.sink().messages().is_empty());
    }

    #[tokio::test]
    async fn test_out_for_delivery_without_phone_puts_code_in_email() {
        let trigger = trigger();
        let mut shipment = sample_shipment();
        shipment.client_contact_phone = None;
        let shipment = with_status(shipment, ShipmentStatus::OutForDelivery);

        trigger.fire(&shipment, PARTIES, Utc::now()).await;

        let stored = trigger.codes().get_code(shipment.id).await.unwrap().unwrap();
        let messages = trigger.sink().messages();
        assert_eq!(messages.len(), 1);
        let OutboundMessage::TemplatedEmail { context, .. } = &messages[0] else {
            panic!("expected templated email");
        };
        assert_eq!(context["verification_code"], stored.as_str());
        assert_eq!(context["seller"], "Acme");
        assert_eq!(context["delivery_partner"], "FastShip");
    }

    #[tokio::test]
    async fn test_out_for_delivery_with_phone_sends_sms() {
        let trigger = trigger();
        let mut shipment = sample_shipment();
        shipment.client_contact_phone = Some("+573001234567".into());
        let shipment = with_status(shipment, ShipmentStatus::OutForDelivery);

        trigger.fire(&shipment, PARTIES, Utc::now()).await;

        let stored = trigger.codes().get_code(shipment.id).await.unwrap().unwrap();
        let messages = trigger.sink().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            OutboundMessage::Sms {
                to: "+573001234567".into(),
                body: format!(
                    "Your verification code for delivery of shipment {} is {stored}.",
                    shipment.id
                ),
            }
        );
        let OutboundMessage::TemplatedEmail { context, .. } = &messages[1] else {
            panic!("expected templated email");
        };
        assert!(context.get("verification_code").is_none());
    }

    #[tokio::test]
    async fn test_delivered_includes_review_url() {
        let trigger = trigger();
        let shipment = with_status(sample_shipment(), ShipmentStatus::Delivered);

        trigger.fire(&shipment, PARTIES, Utc::now()).await;

        let messages = trigger.sink().messages();
        let OutboundMessage::TemplatedEmail { context, .. } = &messages[0] else {
            panic!("expected templated email");
        };
        let url = context["review_url"].as_str().unwrap();
        assert!(url.starts_with("https://track.example.com/shipment/review?token="));
    }

    #[tokio::test]
    async fn test_queue_failure_is_swallowed() {
        let trigger = trigger();
        trigger.sink().fail_with("queue closed");
        let shipment = with_status(sample_shipment(), ShipmentStatus::Placed);

        trigger.fire(&shipment, PARTIES, Utc::now()).await;

        assert!(trigger.sink().messages().is_empty());
    }
}
