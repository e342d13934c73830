//! Assignment engine: first eligible partner wins.
//!
//! No load balancing and no round-robin. The engine walks the capacity index
//! in its stable order and takes the first partner with room. It mutates
//! nothing; the capacity check that actually guards the insert lives in
//! [`crate::providers::ShipmentRepository::insert_assigned`].

use crate::capacity::{CapacityIndex, PartnerCapacity};
use crate::error::{Result, ShipmentError};
use crate::providers::PartnerRepository;
use crate::types::PartnerId;

/// Picks a delivery partner for a new shipment.
#[derive(Debug, Clone)]
pub struct AssignmentEngine<P> {
    index: CapacityIndex<P>,
}

impl<P: PartnerRepository> AssignmentEngine<P> {
    /// Engine over a capacity index.
    #[must_use]
    pub const fn new(index: CapacityIndex<P>) -> Self {
        Self { index }
    }

    /// The capacity index this engine reads from.
    #[must_use]
    pub const fn index(&self) -> &CapacityIndex<P> {
        &self.index
    }

    /// First serviceable partner with spare capacity.
    ///
    /// # Errors
    ///
    /// Returns `NoCapacityAvailable` when nobody serves `destination` or
    /// everybody who does is full.
    pub async fn assign(&self, destination: u32) -> Result<PartnerCapacity> {
        self.assign_excluding(destination, &[]).await
    }

    /// Like [`assign`](Self::assign), skipping partners in `excluded`.
    ///
    /// # Errors
    ///
    /// Returns `NoCapacityAvailable` when no remaining partner qualifies.
    pub async fn assign_excluding(
        &self,
        destination: u32,
        excluded: &[PartnerId],
    ) -> Result<PartnerCapacity> {
        let chosen = self
            .index
            .find_serviceable(destination)
            .await?
            .into_iter()
            .filter(|entry| !excluded.contains(&entry.partner_id()))
            .find(PartnerCapacity::has_capacity);

        match chosen {
            Some(entry) => {
                tracing::debug!(
                    destination,
                    partner_id = %entry.partner_id(),
                    remaining = entry.current_capacity(),
                    "Selected delivery partner"
                );
                Ok(entry)
            }
            None => {
                tracing::info!(destination, "No delivery partner with spare capacity");
                Err(ShipmentError::NoCapacityAvailable { destination })
            }
        }
    }
}
