//! Shipment lifecycle.
//!
//! Orchestrates creation, partner updates, cancellation, tagging and
//! reviews. Status moves `placed → in_transit → out_for_delivery →
//! delivered`, and `cancelled` is reachable from anything before
//! `delivered`. Both `delivered` and `cancelled` are terminal.
//!
//! After every append that moves the derived status, the lifecycle fires the
//! [`NotificationTrigger`]. Notification problems are logged and never fail
//! the call that caused them.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! # use shiptrack_core::config::{AppConfig, LifecycleConfig};
//! # use shiptrack_core::environment::SystemClock;
//! # use shiptrack_core::lifecycle::ShipmentLifecycle;
//! # use shiptrack_core::mocks::{sample_partner, sample_seller, InMemoryStore, MockCodeStore, RecordingSink};
//! # use shiptrack_core::notification::NotificationTrigger;
//! # use shiptrack_core::providers::PartnerRepository;
//! # use shiptrack_core::token::TokenCodec;
//! # use shiptrack_core::types::{CreateShipment, ShipmentStatus};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> shiptrack_core::Result<()> {
//! let store = InMemoryStore::new();
//! store.insert_partner(&sample_partner("FastShip", &[11001], 1)).await?;
//!
//! let trigger = NotificationTrigger::new(
//!     MockCodeStore::new(),
//!     RecordingSink::new(),
//!     TokenCodec::new("secret"),
//!     AppConfig::default(),
//! );
//! let lifecycle = ShipmentLifecycle::new(
//!     store,
//!     trigger,
//!     Arc::new(SystemClock),
//!     LifecycleConfig::default(),
//! );
//!
//! let seller = sample_seller("Acme", 22002);
//! let shipment = lifecycle
//!     .create(
//!         CreateShipment {
//!             content: "Books and notes".into(),
//!             weight: 2.5,
//!             destination: 11001,
//!             client_contact_email: "client@example.com".into(),
//!             client_contact_phone: None,
//!         },
//!         &seller,
//!     )
//!     .await?;
//!
//! assert_eq!(shipment.status(), Some(ShipmentStatus::Placed));
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use std::sync::Arc;
use uuid::Uuid;

use crate::assignment::AssignmentEngine;
use crate::capacity::CapacityIndex;
use crate::config::LifecycleConfig;
use crate::environment::Clock;
use crate::error::{Result, ShipmentError};
use crate::notification::{NotificationTrigger, Parties};
use crate::providers::{
    NotificationSink, PartnerRepository, SellerRepository, ShipmentRepository,
    VerificationCodeStore,
};
use crate::timeline::{AppendOutcome, Timeline};
use crate::token::TokenPurpose;
use crate::types::{
    CreateShipment, DeliveryPartner, Review, ReviewId, ReviewRequest, Seller, Shipment,
    ShipmentId, ShipmentPatch, ShipmentStatus, Tag, TagName,
};
use crate::utils::{self, CONTENT_LEN, MAX_COMMENT_LEN};

/// Description of the event appended when a seller cancels.
pub const CANCELLED_BY_SELLER: &str = "cancelled by seller";

/// Shipment lifecycle service.
///
/// # Type Parameters
///
/// - `R`: Repository for shipments, partners and sellers
/// - `C`: Verification code store
/// - `N`: Notification sink
pub struct ShipmentLifecycle<R, C, N> {
    repo: R,
    assignment: AssignmentEngine<R>,
    trigger: NotificationTrigger<C, N>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl<R, C, N> ShipmentLifecycle<R, C, N>
where
    R: ShipmentRepository + PartnerRepository + SellerRepository + Clone,
    C: VerificationCodeStore,
    N: NotificationSink,
{
    /// Create a lifecycle service.
    #[must_use]
    pub fn new(
        repo: R,
        trigger: NotificationTrigger<C, N>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        let assignment = AssignmentEngine::new(CapacityIndex::new(repo.clone()));
        Self {
            repo,
            assignment,
            trigger,
            clock,
            config,
        }
    }

    /// Lifecycle rules in effect.
    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Notification trigger.
    #[must_use]
    pub const fn trigger(&self) -> &NotificationTrigger<C, N> {
        &self.trigger
    }

    /// Assignment engine.
    #[must_use]
    pub const fn assignment(&self) -> &AssignmentEngine<R> {
        &self.assignment
    }

    fn timeline(&self) -> Timeline<'_, R> {
        Timeline::new(&self.repo, self.clock.as_ref())
    }

    async fn load(&self, id: ShipmentId) -> Result<Shipment> {
        self.repo
            .get_shipment(id)
            .await?
            .ok_or_else(|| ShipmentError::not_found("shipment", id))
    }

    // ═══════════════════════════════════════════════════════════
    // Creation
    // ═══════════════════════════════════════════════════════════

    /// Create a shipment for `seller`, assign a partner and record `placed`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The request is malformed → `ValidationError`
    /// - No serviceable partner has room → `NoCapacityAvailable`
    /// - The repository fails
    pub async fn create(&self, request: CreateShipment, seller: &Seller) -> Result<Shipment> {
        validate_create(&request)?;

        let now = self.clock.now();
        let mut shipment = Shipment {
            id: ShipmentId::new(),
            content: request.content.trim().to_string(),
            weight: request.weight,
            destination: request.destination,
            client_contact_email: request.client_contact_email,
            client_contact_phone: request.client_contact_phone,
            seller_id: seller.id(),
            partner_id: None,
            created_at: now,
            estimated_delivery: estimated_delivery_from(now, self.config.estimated_delivery()),
            timeline: Vec::new(),
            review: None,
            tags: Vec::new(),
        };

        let partner = self.persist_with_partner(&mut shipment).await?;

        if let Err(e) = self
            .timeline()
            .append(
                &mut shipment,
                Some(seller.zip_code),
                Some(ShipmentStatus::Placed),
                None,
            )
            .await
        {
            // A shipment without its genesis event would hold capacity forever
            if let Err(cleanup) = self.repo.delete_shipment(shipment.id).await {
                tracing::warn!(shipment_id = %shipment.id, error = %cleanup, "Failed to remove half-created shipment");
            }
            return Err(e);
        }

        tracing::info!(
            shipment_id = %shipment.id,
            seller_id = %seller.id(),
            partner_id = %partner.id(),
            destination = shipment.destination,
            "Shipment created"
        );

        self.trigger
            .fire(
                &shipment,
                Parties {
                    seller: seller.name(),
                    delivery_partner: partner.name(),
                },
                now,
            )
            .await;

        Ok(shipment)
    }

    /// Assign a partner and insert the shipment, retrying with the next
    /// eligible partner when the chosen one fills up first.
    async fn persist_with_partner(&self, shipment: &mut Shipment) -> Result<DeliveryPartner> {
        let destination = shipment.destination;
        let mut excluded = Vec::new();

        for attempt in 1..=self.config.assignment_attempts.max(1) {
            let candidate = self
                .assignment
                .assign_excluding(destination, &excluded)
                .await?;
            let partner_id = candidate.partner_id();

            match self.repo.insert_assigned(shipment, partner_id).await {
                Ok(()) => {
                    shipment.partner_id = Some(partner_id);
                    return Ok(candidate.partner);
                }
                Err(ShipmentError::CapacityExhausted) => {
                    tracing::warn!(
                        shipment_id = %shipment.id,
                        %partner_id,
                        attempt,
                        "Partner filled up during assignment, retrying"
                    );
                    excluded.push(partner_id);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ShipmentError::NoCapacityAvailable { destination })
    }

    // ═══════════════════════════════════════════════════════════
    // Partner Updates
    // ═══════════════════════════════════════════════════════════

    /// Apply a partner's update to a shipment.
    ///
    /// Once a shipment is `delivered`, any update needs the verification
    /// code issued when it went out for delivery. A matching code is
    /// consumed.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The patch is empty → `ValidationError`
    /// - Unknown shipment → `NotFound`
    /// - `acting_partner` is not the assigned partner → `Unauthorized`
    /// - Delivered and the code is missing or wrong → `Forbidden`
    /// - Delivered, the code is correct, and the patch would write nothing →
    ///   `ValidationError` (the code is kept)
    /// - Cancelled → `InvalidState`
    /// - The repository fails
    pub async fn update(
        &self,
        id: ShipmentId,
        patch: ShipmentPatch,
        acting_partner: &DeliveryPartner,
    ) -> Result<Shipment> {
        if patch.is_empty() {
            return Err(ShipmentError::ValidationError(
                "update must change at least one field".into(),
            ));
        }

        let mut shipment = self.load(id).await?;

        if shipment.partner_id != Some(acting_partner.id()) {
            tracing::warn!(shipment_id = %id, partner_id = %acting_partner.id(), "Update by unassigned partner");
            return Err(ShipmentError::Unauthorized);
        }

        let current = shipment.status();
        let gated = match current {
            Some(ShipmentStatus::Delivered) => true,
            Some(ShipmentStatus::Cancelled) => {
                return Err(ShipmentError::InvalidState {
                    operation: "update",
                    status: current,
                });
            }
            _ => {
                self.config.require_code_on_delivery
                    && patch.status == Some(ShipmentStatus::Delivered)
            }
        };

        let touches_timeline = patch.touches_timeline(shipment.latest_event());
        let code = if gated {
            let code = required_code(&patch)?;
            // A one-time code is never spent on a patch that writes nothing
            if !touches_timeline && patch.estimated_delivery.is_none() {
                self.check_code(id, code).await?;
                return Err(ShipmentError::ValidationError(
                    "update changes nothing".into(),
                ));
            }
            Some(self.consume_code(id, code).await?)
        } else {
            None
        };

        let outcome = match self.apply(&mut shipment, patch, touches_timeline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(code) = code {
                    self.restore_code(id, &code).await;
                }
                return Err(e);
            }
        };

        if let Some(outcome) = outcome {
            tracing::info!(
                shipment_id = %id,
                from = ?outcome.previous_status,
                to = %outcome.event.status,
                location = outcome.event.location,
                "Shipment updated"
            );

            if outcome.status_changed() {
                self.notify(&shipment).await;
            }
        }

        Ok(shipment)
    }

    async fn apply(
        &self,
        shipment: &mut Shipment,
        patch: ShipmentPatch,
        touches_timeline: bool,
    ) -> Result<Option<AppendOutcome>> {
        if let Some(estimated_delivery) = patch.estimated_delivery {
            self.repo
                .update_estimated_delivery(shipment.id, estimated_delivery)
                .await?;
            shipment.estimated_delivery = estimated_delivery;
        }

        if !touches_timeline {
            return Ok(None);
        }

        self.timeline()
            .append(shipment, patch.location, patch.status, patch.description)
            .await
            .map(Some)
    }

    async fn consume_code(&self, id: ShipmentId, code: &str) -> Result<String> {
        if self.trigger.codes().consume_code(id, code).await? {
            tracing::info!(shipment_id = %id, "Verification code accepted");
            Ok(code.to_string())
        } else {
            tracing::warn!(shipment_id = %id, "Verification code rejected");
            Err(invalid_code())
        }
    }

    // Same verdict as `consume_code`, but leaves the stored code in place
    async fn check_code(&self, id: ShipmentId, code: &str) -> Result<()> {
        let stored = self.trigger.codes().get_code(id).await?;
        if stored.is_some_and(|stored| constant_time_eq(stored.as_bytes(), code.as_bytes())) {
            Ok(())
        } else {
            tracing::warn!(shipment_id = %id, "Verification code rejected");
            Err(invalid_code())
        }
    }

    // Puts back a code consumed by an update whose writes failed
    async fn restore_code(&self, id: ShipmentId, code: &str) {
        match self.trigger.codes().set_code(id, code).await {
            Ok(()) => {
                tracing::warn!(shipment_id = %id, "Update failed, verification code restored");
            }
            Err(e) => {
                tracing::error!(shipment_id = %id, error = %e, "Failed to restore verification code");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Seller Operations
    // ═══════════════════════════════════════════════════════════

    /// Cancel a shipment on behalf of its seller.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Unknown shipment → `NotFound`
    /// - `seller` does not own the shipment → `Unauthorized`
    /// - Already delivered or cancelled → `InvalidState`
    /// - The repository fails
    pub async fn cancel(&self, id: ShipmentId, seller: &Seller) -> Result<Shipment> {
        let mut shipment = self.load(id).await?;

        if shipment.seller_id != seller.id() {
            return Err(ShipmentError::Unauthorized);
        }

        let current = shipment.status();
        if current.is_some_and(ShipmentStatus::is_terminal) {
            return Err(ShipmentError::InvalidState {
                operation: "cancel",
                status: current,
            });
        }

        self.timeline()
            .append(
                &mut shipment,
                Some(seller.zip_code),
                Some(ShipmentStatus::Cancelled),
                Some(CANCELLED_BY_SELLER.to_string()),
            )
            .await?;

        tracing::info!(shipment_id = %id, seller_id = %seller.id(), "Shipment cancelled");

        self.notify(&shipment).await;
        Ok(shipment)
    }

    // ═══════════════════════════════════════════════════════════
    // Reviews
    // ═══════════════════════════════════════════════════════════

    /// Record the client's review using the token from the delivery email.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The token is invalid or expired → `Unauthorized`
    /// - Rating outside 1..=5 or comment too long → `ValidationError`
    /// - Unknown shipment → `NotFound`
    /// - Not delivered → `InvalidState`
    /// - Already reviewed → `Conflict`
    /// - The repository fails
    pub async fn rate(&self, review_token: &str, request: ReviewRequest) -> Result<Review> {
        let now = self.clock.now();
        let subject = self.trigger.tokens().decode(
            review_token,
            TokenPurpose::Review,
            self.config.review_token_max_age(),
            now,
        )?;
        let id = Uuid::parse_str(&subject)
            .map(ShipmentId::from_uuid)
            .map_err(|_| ShipmentError::Unauthorized)?;

        if !(1..=5).contains(&request.rating) {
            return Err(ShipmentError::ValidationError(
                "rating must be between 1 and 5".into(),
            ));
        }
        let comment = request
            .comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());
        if comment
            .as_ref()
            .is_some_and(|comment| comment.chars().count() > MAX_COMMENT_LEN)
        {
            return Err(ShipmentError::ValidationError(format!(
                "comment must be at most {MAX_COMMENT_LEN} characters"
            )));
        }

        let shipment = self.load(id).await?;
        let status = shipment.status();
        if status != Some(ShipmentStatus::Delivered) {
            return Err(ShipmentError::InvalidState {
                operation: "review",
                status,
            });
        }
        if shipment.review.is_some() {
            return Err(ShipmentError::Conflict(
                "shipment has already been reviewed".into(),
            ));
        }

        let review = Review {
            id: ReviewId::new(),
            shipment_id: id,
            rating: request.rating,
            comment,
            created_at: now,
        };
        self.repo.insert_review(&review).await?;

        tracing::info!(shipment_id = %id, rating = review.rating, "Review recorded");
        Ok(review)
    }

    /// Re-issue the review token of a delivered shipment.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Unknown shipment → `NotFound`
    /// - Not delivered → `InvalidState`
    pub async fn review_token_for(&self, id: ShipmentId) -> Result<String> {
        let shipment = self.load(id).await?;
        let status = shipment.status();
        if status != Some(ShipmentStatus::Delivered) {
            return Err(ShipmentError::InvalidState {
                operation: "issue a review token for",
                status,
            });
        }
        self.trigger.review_token(id, self.clock.now())
    }

    // ═══════════════════════════════════════════════════════════
    // Tags
    // ═══════════════════════════════════════════════════════════

    /// Attach a tag.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Unknown shipment → `NotFound`
    /// - A tag with the same name is attached → `Conflict`
    pub async fn add_tag(&self, id: ShipmentId, tag: Tag) -> Result<Shipment> {
        let mut shipment = self.load(id).await?;
        if shipment.has_tag(tag.name) {
            return Err(ShipmentError::Conflict(format!(
                "tag {} is already attached",
                tag.name
            )));
        }

        self.repo.add_tag(id, &tag).await?;
        tracing::debug!(shipment_id = %id, tag = %tag.name, "Tag added");
        shipment.tags.push(tag);
        Ok(shipment)
    }

    /// Detach a tag.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Unknown shipment → `NotFound`
    /// - No tag with that name is attached → `Conflict`
    pub async fn remove_tag(&self, id: ShipmentId, name: TagName) -> Result<Shipment> {
        let mut shipment = self.load(id).await?;
        if !shipment.has_tag(name) {
            return Err(ShipmentError::Conflict(format!(
                "tag {name} is not attached"
            )));
        }

        self.repo.remove_tag(id, name).await?;
        tracing::debug!(shipment_id = %id, tag = %name, "Tag removed");
        shipment.tags.retain(|tag| tag.name != name);
        Ok(shipment)
    }

    // ═══════════════════════════════════════════════════════════
    // Queries and Admin
    // ═══════════════════════════════════════════════════════════

    /// Get a shipment with its timeline, review and tags.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or error if the repository fails.
    pub async fn get(&self, id: ShipmentId) -> Result<Shipment> {
        self.load(id).await
    }

    /// Every shipment.
    ///
    /// # Errors
    ///
    /// Returns error if the repository fails.
    pub async fn get_all(&self) -> Result<Vec<Shipment>> {
        self.repo.list_shipments().await
    }

    /// Delete a shipment regardless of its status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or error if the repository fails.
    pub async fn delete(&self, id: ShipmentId) -> Result<()> {
        if self.repo.delete_shipment(id).await? {
            tracing::info!(shipment_id = %id, "Shipment deleted");
            Ok(())
        } else {
            Err(ShipmentError::not_found("shipment", id))
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Notifications
    // ═══════════════════════════════════════════════════════════

    async fn notify(&self, shipment: &Shipment) {
        let seller = match self.repo.get_seller(shipment.seller_id).await {
            Ok(Some(seller)) => seller.account.name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(shipment_id = %shipment.id, error = %e, "Failed to load seller for notification");
                String::new()
            }
        };

        let partner = match shipment.partner_id {
            Some(partner_id) => match self.repo.get_partner(partner_id).await {
                Ok(Some(partner)) => partner.account.name,
                Ok(None) => String::new(),
                Err(e) => {
                    tracing::warn!(shipment_id = %shipment.id, error = %e, "Failed to load partner for notification");
                    String::new()
                }
            },
            None => String::new(),
        };

        self.trigger
            .fire(
                shipment,
                Parties {
                    seller: &seller,
                    delivery_partner: &partner,
                },
                self.clock.now(),
            )
            .await;
    }
}

fn required_code(patch: &ShipmentPatch) -> Result<&str> {
    patch
        .verification_code
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| ShipmentError::Forbidden("verification code required".into()))
}

fn invalid_code() -> ShipmentError {
    ShipmentError::Forbidden("invalid verification code".into())
}

// Windows past the calendar's range clamp to its ends
fn estimated_delivery_from(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_add_signed(window).unwrap_or(if window < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

fn validate_create(request: &CreateShipment) -> Result<()> {
    utils::check_len("content", request.content.trim(), CONTENT_LEN)?;
    utils::check_weight(request.weight)?;
    utils::check_email("client_contact_email", &request.client_contact_email)?;
    if let Some(phone) = &request.client_contact_phone {
        if !utils::is_valid_phone(phone) {
            return Err(ShipmentError::ValidationError(
                "client_contact_phone is not a valid phone number".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::environment::FixedClock;
    use crate::mocks::{InMemoryStore, MockCodeStore, RecordingSink, sample_partner, sample_seller};
    use crate::token::TokenCodec;
    type Lifecycle = ShipmentLifecycle<InMemoryStore, MockCodeStore, RecordingSink>;

    struct Fixture {
        store: InMemoryStore,
        codes: MockCodeStore,
        sink: RecordingSink,
        clock: FixedClock,
        lifecycle: Lifecycle,
        seller: Seller,
        partner: DeliveryPartner,
    }

    async fn fixture() -> Fixture {
        fixture_with(LifecycleConfig::default()).await
    }

    async fn fixture_with(config: LifecycleConfig) -> Fixture {
        let store = InMemoryStore::new();
        let codes = MockCodeStore::new();
        let sink = RecordingSink::new();
        let clock = FixedClock::new(Utc::now());

        let seller = sample_seller("Acme", 22002);
        let partner = sample_partner("FastShip", &[11001], 5);
        store.insert_seller(&seller).await.unwrap();
        store.insert_partner(&partner).await.unwrap();

        let trigger = NotificationTrigger::new(
            codes.clone(),
            sink.clone(),
            TokenCodec::new("secret"),
            AppConfig::default(),
        );
        let lifecycle = ShipmentLifecycle::new(
            store.clone(),
            trigger,
            Arc::new(clock.clone()),
            config,
        );

        Fixture {
            store,
            codes,
            sink,
            clock,
            lifecycle,
            seller,
            partner,
        }
    }

    fn request() -> CreateShipment {
        CreateShipment {
            content: "Books and notes".into(),
            weight: 2.5,
            destination: 11001,
            client_contact_email: "client@example.com".into(),
            client_contact_phone: None,
        }
    }

    fn to_status(status: ShipmentStatus) -> ShipmentPatch {
        ShipmentPatch {
            status: Some(status),
            ..ShipmentPatch::default()
        }
    }

    #[tokio::test]
    async fn test_create_validates_request() {
        let f = fixture().await;

        for bad in [
            CreateShipment { content: "Box".into(), ..request() },
            CreateShipment { weight: 0.0, ..request() },
            CreateShipment { weight: 30.0, ..request() },
            CreateShipment { client_contact_email: "nope".into(), ..request() },
            CreateShipment { client_contact_phone: Some("abc".into()), ..request() },
        ] {
            let err = f.lifecycle.create(bad, &f.seller).await.unwrap_err();
            assert!(matches!(err, ShipmentError::ValidationError(_)), "{err:?}");
        }
        assert!(f.lifecycle.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_assigns_and_records_placed() {
        let f = fixture().await;
        let now = f.clock.now();

        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();

        assert_eq!(shipment.partner_id, Some(f.partner.id()));
        assert_eq!(shipment.timeline.len(), 1);
        assert_eq!(shipment.timeline[0].location, f.seller.zip_code);
        assert_eq!(shipment.status(), Some(ShipmentStatus::Placed));
        assert_eq!(shipment.estimated_delivery, now + Duration::days(3));

        let messages = f.sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(f.lifecycle.get(shipment.id).await.unwrap(), shipment);
    }

    #[tokio::test]
    async fn test_update_by_other_partner_is_unauthorized() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        let stranger = sample_partner("Stranger", &[11001], 5);

        let err = f
            .lifecycle
            .update(shipment.id, to_status(ShipmentStatus::InTransit), &stranger)
            .await
            .unwrap_err();

        assert_eq!(err, ShipmentError::Unauthorized);
    }

    #[tokio::test]
    async fn test_empty_patch_and_unknown_shipment() {
        let f = fixture().await;

        let err = f
            .lifecycle
            .update(ShipmentId::new(), ShipmentPatch::default(), &f.partner)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::ValidationError(_)));

        let err = f
            .lifecycle
            .update(ShipmentId::new(), to_status(ShipmentStatus::InTransit), &f.partner)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_estimated_delivery_only_appends_nothing() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        let eta = f.clock.now() + Duration::days(7);

        let updated = f
            .lifecycle
            .update(
                shipment.id,
                ShipmentPatch {
                    estimated_delivery: Some(eta),
                    ..ShipmentPatch::default()
                },
                &f.partner,
            )
            .await
            .unwrap();

        assert_eq!(updated.timeline.len(), 1);
        assert_eq!(updated.estimated_delivery, eta);
        assert_eq!(f.lifecycle.get(shipment.id).await.unwrap().estimated_delivery, eta);
    }

    #[tokio::test]
    async fn test_location_change_appends_without_notifying() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        f.sink.clear();

        let updated = f
            .lifecycle
            .update(
                shipment.id,
                ShipmentPatch {
                    location: Some(33003),
                    ..ShipmentPatch::default()
                },
                &f.partner,
            )
            .await
            .unwrap();

        assert_eq!(updated.timeline.len(), 2);
        assert_eq!(updated.status(), Some(ShipmentStatus::Placed));
        assert!(f.sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_shipment_rejects_updates() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        f.lifecycle.cancel(shipment.id, &f.seller).await.unwrap();

        let err = f
            .lifecycle
            .update(shipment.id, to_status(ShipmentStatus::InTransit), &f.partner)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ShipmentError::InvalidState { status: Some(ShipmentStatus::Cancelled), .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_guards() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        let other = sample_seller("Other", 44004);

        let err = f.lifecycle.cancel(shipment.id, &other).await.unwrap_err();
        assert_eq!(err, ShipmentError::Unauthorized);

        let cancelled = f.lifecycle.cancel(shipment.id, &f.seller).await.unwrap();
        assert_eq!(cancelled.timeline.len(), 2);
        let last = cancelled.latest_event().unwrap();
        assert_eq!(last.status, ShipmentStatus::Cancelled);
        assert_eq!(last.location, f.seller.zip_code);
        assert_eq!(last.description, CANCELLED_BY_SELLER);

        let err = f.lifecycle.cancel(shipment.id, &f.seller).await.unwrap_err();
        assert!(matches!(err, ShipmentError::InvalidState { operation: "cancel", .. }));
    }

    #[tokio::test]
    async fn test_code_required_on_delivery_when_configured() {
        let f = fixture_with(LifecycleConfig::default().with_code_on_delivery(true)).await;

        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        f.lifecycle
            .update(shipment.id, to_status(ShipmentStatus::OutForDelivery), &f.partner)
            .await
            .unwrap();

        let err = f
            .lifecycle
            .update(shipment.id, to_status(ShipmentStatus::Delivered), &f.partner)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::Forbidden(_)));

        let code = f.codes.get_code(shipment.id).await.unwrap().unwrap();
        let delivered = f
            .lifecycle
            .update(
                shipment.id,
                ShipmentPatch {
                    verification_code: Some(code),
                    ..to_status(ShipmentStatus::Delivered)
                },
                &f.partner,
            )
            .await
            .unwrap();
        assert_eq!(delivered.status(), Some(ShipmentStatus::Delivered));
        assert!(f.codes.is_empty());
    }

    async fn delivered_with_code(f: &Fixture) -> (Shipment, String) {
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();
        f.lifecycle
            .update(shipment.id, to_status(ShipmentStatus::OutForDelivery), &f.partner)
            .await
            .unwrap();
        let delivered = f
            .lifecycle
            .update(shipment.id, to_status(ShipmentStatus::Delivered), &f.partner)
            .await
            .unwrap();
        let code = f.codes.get_code(shipment.id).await.unwrap().unwrap();
        (delivered, code)
    }

    fn with_code(patch: ShipmentPatch, code: &str) -> ShipmentPatch {
        ShipmentPatch {
            verification_code: Some(code.to_string()),
            ..patch
        }
    }

    #[tokio::test]
    async fn test_failed_write_keeps_verification_code() {
        let f = fixture().await;
        let (shipment, code) = delivered_with_code(&f).await;

        f.store.fail_appends_with("connection reset");
        let err = f
            .lifecycle
            .update(
                shipment.id,
                with_code(to_status(ShipmentStatus::InTransit), &code),
                &f.partner,
            )
            .await
            .unwrap_err();
        assert_eq!(err, ShipmentError::Storage("connection reset".into()));
        assert_eq!(f.codes.get_code(shipment.id).await.unwrap(), Some(code.clone()));

        f.store.recover();
        let updated = f
            .lifecycle
            .update(
                shipment.id,
                with_code(to_status(ShipmentStatus::InTransit), &code),
                &f.partner,
            )
            .await
            .unwrap();
        assert_eq!(updated.status(), Some(ShipmentStatus::InTransit));
        assert!(f.codes.is_empty());
    }

    #[tokio::test]
    async fn test_gated_patch_that_writes_nothing_keeps_code() {
        let f = fixture().await;
        let (shipment, code) = delivered_with_code(&f).await;

        let err = f
            .lifecycle
            .update(
                shipment.id,
                with_code(to_status(ShipmentStatus::Delivered), &code),
                &f.partner,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::ValidationError(_)), "{err:?}");

        let err = f
            .lifecycle
            .update(
                shipment.id,
                with_code(to_status(ShipmentStatus::Delivered), "000000"),
                &f.partner,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::Forbidden(_)), "{err:?}");
        assert_eq!(f.codes.get_code(shipment.id).await.unwrap(), Some(code.clone()));

        let eta = f.clock.now() + Duration::days(1);
        let updated = f
            .lifecycle
            .update(
                shipment.id,
                with_code(
                    ShipmentPatch {
                        estimated_delivery: Some(eta),
                        ..ShipmentPatch::default()
                    },
                    &code,
                ),
                &f.partner,
            )
            .await
            .unwrap();
        assert_eq!(updated.estimated_delivery, eta);
        assert_eq!(updated.timeline.len(), shipment.timeline.len());
        assert!(f.codes.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_config_windows_saturate() {
        let f = fixture_with(
            LifecycleConfig::default()
                .with_estimated_delivery_days(i64::MAX)
                .with_review_token_max_age(u64::MAX),
        )
        .await;
        let review = ReviewRequest {
            rating: 5,
            comment: None,
        };

        let err = f.lifecycle.rate("garbage.sig", review.clone()).await.unwrap_err();
        assert_eq!(err, ShipmentError::Unauthorized);

        let (shipment, _) = delivered_with_code(&f).await;
        assert_eq!(shipment.estimated_delivery, DateTime::<Utc>::MAX_UTC);

        let token = f.lifecycle.review_token_for(shipment.id).await.unwrap();
        let recorded = f.lifecycle.rate(&token, review).await.unwrap();
        assert_eq!(recorded.rating, 5);
    }

    #[tokio::test]
    async fn test_tags() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();

        let tagged = f
            .lifecycle
            .add_tag(shipment.id, Tag::with_instruction(TagName::Fragile, "Glass inside"))
            .await
            .unwrap();
        assert_eq!(tagged.tags.len(), 1);

        let err = f
            .lifecycle
            .add_tag(shipment.id, Tag::new(TagName::Fragile))
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::Conflict(_)));

        let untagged = f
            .lifecycle
            .remove_tag(shipment.id, TagName::Fragile)
            .await
            .unwrap();
        assert!(untagged.tags.is_empty());

        let err = f
            .lifecycle
            .remove_tag(shipment.id, TagName::Fragile)
            .await
            .unwrap_err();
        assert!(matches!(err, ShipmentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_frees_capacity() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();

        f.lifecycle.delete(shipment.id).await.unwrap();

        let err = f.lifecycle.get(shipment.id).await.unwrap_err();
        assert!(matches!(err, ShipmentError::NotFound { .. }));
        let err = f.lifecycle.delete(shipment.id).await.unwrap_err();
        assert!(matches!(err, ShipmentError::NotFound { .. }));

        let capacity = f
            .lifecycle
            .assignment()
            .index()
            .capacity_of(f.partner.id())
            .await
            .unwrap();
        assert_eq!(capacity.active_shipments, 0);
    }

    #[tokio::test]
    async fn test_review_token_only_after_delivery() {
        let f = fixture().await;
        let shipment = f.lifecycle.create(request(), &f.seller).await.unwrap();

        let err = f.lifecycle.review_token_for(shipment.id).await.unwrap_err();
        assert!(matches!(err, ShipmentError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let f = fixture().await;
        f.store.fail_with("connection reset");

        let err = f.lifecycle.create(request(), &f.seller).await.unwrap_err();

        assert_eq!(err, ShipmentError::Storage("connection reset".into()));
        assert!(!err.is_user_error());
    }
}
