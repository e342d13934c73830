//! Repository traits for shipments, delivery partners and sellers.

use crate::capacity::PartnerCapacity;
use crate::error::Result;
use crate::types::{
    DeliveryPartner, PartnerId, Review, Seller, SellerId, Shipment, ShipmentEvent, ShipmentId,
    Tag, TagName,
};
use chrono::{DateTime, Utc};

/// Shipment repository.
///
/// A fetched [`Shipment`] always carries its timeline (in insertion order),
/// its review and its tags.
pub trait ShipmentRepository: Send + Sync {
    /// Persist a new shipment assigned to `partner`.
    ///
    /// The partner's active shipment count is re-checked against its
    /// `max_handling_capacity` in the same atomic step as the insert.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The partner has no spare capacity → `ShipmentError::CapacityExhausted`
    /// - The partner does not exist → `ShipmentError::NotFound`
    /// - Database query fails
    fn insert_assigned(
        &self,
        shipment: &Shipment,
        partner: PartnerId,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Get shipment by ID, with timeline, review and tags.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn get_shipment(
        &self,
        id: ShipmentId,
    ) -> impl std::future::Future<Output = Result<Option<Shipment>>> + Send;

    /// List every shipment, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn list_shipments(&self) -> impl std::future::Future<Output = Result<Vec<Shipment>>> + Send;

    /// Replace the estimated delivery timestamp.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Shipment not found → `ShipmentError::NotFound`
    /// - Database query fails
    fn update_estimated_delivery(
        &self,
        id: ShipmentId,
        estimated_delivery: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Append one timeline event. Existing events are never touched.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Shipment not found → `ShipmentError::NotFound`
    /// - Database query fails
    fn append_event(
        &self,
        event: &ShipmentEvent,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Store the review of a shipment.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A review already exists → `ShipmentError::Conflict`
    /// - Database query fails
    fn insert_review(&self, review: &Review)
    -> impl std::future::Future<Output = Result<()>> + Send;

    /// Attach a tag.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The tag name is already attached → `ShipmentError::Conflict`
    /// - Shipment not found → `ShipmentError::NotFound`
    /// - Database query fails
    fn add_tag(
        &self,
        id: ShipmentId,
        tag: &Tag,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Detach a tag.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The tag name is not attached → `ShipmentError::Conflict`
    /// - Database query fails
    fn remove_tag(
        &self,
        id: ShipmentId,
        name: TagName,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete a shipment with its events, review and tags.
    ///
    /// # Returns
    ///
    /// `true` if a shipment was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn delete_shipment(
        &self,
        id: ShipmentId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Delivery partner repository.
pub trait PartnerRepository: Send + Sync {
    /// Partners serving `destination` with their active shipment counts.
    ///
    /// Ordered by `(created_at, id)` so that repeated calls over the same data
    /// return the same order.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn find_serviceable(
        &self,
        destination: u32,
    ) -> impl std::future::Future<Output = Result<Vec<PartnerCapacity>>> + Send;

    /// One partner with its active shipment count.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn partner_capacity(
        &self,
        id: PartnerId,
    ) -> impl std::future::Future<Output = Result<Option<PartnerCapacity>>> + Send;

    /// Get partner by ID.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn get_partner(
        &self,
        id: PartnerId,
    ) -> impl std::future::Future<Output = Result<Option<DeliveryPartner>>> + Send;

    /// Register a partner.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Email already registered → `ShipmentError::Conflict`
    /// - Database query fails
    fn insert_partner(
        &self,
        partner: &DeliveryPartner,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Replace a partner's serviceable zip codes and capacity.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Partner not found → `ShipmentError::NotFound`
    /// - Database query fails
    fn update_partner(
        &self,
        partner: &DeliveryPartner,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Mark a partner's email as verified.
    ///
    /// # Returns
    ///
    /// `false` if no such partner exists.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn set_partner_email_verified(
        &self,
        id: PartnerId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Seller repository.
pub trait SellerRepository: Send + Sync {
    /// Register a seller.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Email already registered → `ShipmentError::Conflict`
    /// - Database query fails
    fn insert_seller(
        &self,
        seller: &Seller,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Get seller by ID.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn get_seller(
        &self,
        id: SellerId,
    ) -> impl std::future::Future<Output = Result<Option<Seller>>> + Send;

    /// Mark a seller's email as verified.
    ///
    /// # Returns
    ///
    /// `false` if no such seller exists.
    ///
    /// # Errors
    ///
    /// Returns error if database query fails.
    fn set_seller_email_verified(
        &self,
        id: SellerId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
