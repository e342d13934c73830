//! Partner capacity index.
//!
//! Read-only view over the partner repository: who serves a destination and
//! how much room each of them has left.

use crate::error::{Result, ShipmentError};
use crate::providers::PartnerRepository;
use crate::types::{DeliveryPartner, PartnerId};
use serde::{Deserialize, Serialize};

/// A partner paired with its number of active shipments.
///
/// Active means the shipment's derived status is neither `delivered` nor
/// `cancelled`. A shipment without events counts as active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerCapacity {
    /// The partner
    pub partner: DeliveryPartner,
    /// Shipments currently held by the partner
    pub active_shipments: u32,
}

impl PartnerCapacity {
    /// Remaining capacity, never below zero.
    #[must_use]
    pub const fn current_capacity(&self) -> u32 {
        self.partner
            .max_handling_capacity
            .saturating_sub(self.active_shipments)
    }

    /// Whether one more shipment fits.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.current_capacity() > 0
    }

    /// Partner ID
    #[must_use]
    pub const fn partner_id(&self) -> PartnerId {
        self.partner.account.id
    }
}

/// Capacity queries for delivery partners.
#[derive(Debug, Clone)]
pub struct CapacityIndex<P> {
    partners: P,
}

impl<P: PartnerRepository> CapacityIndex<P> {
    /// Index over `partners`.
    #[must_use]
    pub const fn new(partners: P) -> Self {
        Self { partners }
    }

    /// Partners serving `destination`, ordered by `(created_at, id)`.
    ///
    /// # Errors
    ///
    /// Returns error if the repository query fails.
    pub async fn find_serviceable(&self, destination: u32) -> Result<Vec<PartnerCapacity>> {
        let candidates = self.partners.find_serviceable(destination).await?;
        tracing::debug!(
            destination,
            candidates = candidates.len(),
            "Loaded serviceable partners"
        );
        Ok(candidates)
    }

    /// Capacity of one partner.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown partner, or error if the query fails.
    pub async fn capacity_of(&self, partner: PartnerId) -> Result<PartnerCapacity> {
        self.partners
            .partner_capacity(partner)
            .await?
            .ok_or_else(|| ShipmentError::not_found("partner", partner))
    }
}
