//! In-memory repository.
//!
//! One store implements all three repository traits so that the capacity
//! check in `insert_assigned` sees every shipment under a single lock.

use crate::capacity::PartnerCapacity;
use crate::error::{Result, ShipmentError};
use crate::providers::{PartnerRepository, SellerRepository, ShipmentRepository};
use crate::types::{
    DeliveryPartner, PartnerId, Review, Seller, SellerId, Shipment, ShipmentEvent, ShipmentId,
    Tag, TagName,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    shipments: HashMap<ShipmentId, Shipment>,
    partners: HashMap<PartnerId, DeliveryPartner>,
    sellers: HashMap<SellerId, Seller>,
    failure: Option<String>,
    append_failure: Option<String>,
}

impl State {
    fn active_shipments(&self, partner: PartnerId) -> u32 {
        let count = self
            .shipments
            .values()
            .filter(|shipment| shipment.partner_id == Some(partner) && shipment.is_active())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn capacity(&self, partner: &DeliveryPartner) -> PartnerCapacity {
        PartnerCapacity {
            partner: partner.clone(),
            active_shipments: self.active_shipments(partner.id()),
        }
    }

    fn shipment_mut(&mut self, id: ShipmentId) -> Result<&mut Shipment> {
        self.shipments
            .get_mut(&id)
            .ok_or_else(|| ShipmentError::not_found("shipment", id))
    }

    fn email_taken(&self, email: &str) -> bool {
        self.sellers
            .values()
            .any(|seller| seller.account.email.eq_ignore_ascii_case(email))
            || self
                .partners
                .values()
                .any(|partner| partner.account.email.eq_ignore_ascii_case(email))
    }
}

/// In-memory shipment, partner and seller repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        let state = self
            .state
            .lock()
            .map_err(|_| ShipmentError::Storage("store lock poisoned".into()))?;
        if let Some(message) = &state.failure {
            return Err(ShipmentError::Storage(message.clone()));
        }
        Ok(state)
    }

    /// Make every subsequent call fail with `Storage(message)` (for testing).
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.failure = Some(message.to_string());
        }
    }

    /// Make every subsequent `append_event` fail with `Storage(message)` while
    /// other calls keep working (for testing).
    pub fn fail_appends_with(&self, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.append_failure = Some(message.to_string());
        }
    }

    /// Clear failures injected with [`fail_with`](Self::fail_with) or
    /// [`fail_appends_with`](Self::fail_appends_with).
    pub fn recover(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failure = None;
            state.append_failure = None;
        }
    }

    /// Insert a shipment as-is, skipping the capacity check (for testing).
    pub fn seed_shipment(&self, shipment: &Shipment) {
        if let Ok(mut state) = self.state.lock() {
            state.shipments.insert(shipment.id, shipment.clone());
        }
    }

    /// Current stored copy of a shipment (for testing).
    #[must_use]
    pub fn snapshot_shipment(&self, id: ShipmentId) -> Option<Shipment> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.shipments.get(&id).cloned())
    }
}

impl ShipmentRepository for InMemoryStore {
    async fn insert_assigned(&self, shipment: &Shipment, partner: PartnerId) -> Result<()> {
        let mut state = self.lock()?;

        let Some(record) = state.partners.get(&partner) else {
            return Err(ShipmentError::not_found("partner", partner));
        };
        if !state.capacity(record).has_capacity() {
            return Err(ShipmentError::CapacityExhausted);
        }

        let mut stored = shipment.clone();
        stored.partner_id = Some(partner);
        state.shipments.insert(stored.id, stored);
        Ok(())
    }

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        Ok(self.lock()?.shipments.get(&id).cloned())
    }

    async fn list_shipments(&self) -> Result<Vec<Shipment>> {
        let mut shipments: Vec<Shipment> = self.lock()?.shipments.values().cloned().collect();
        shipments.sort_by_key(|shipment| (shipment.created_at, shipment.id));
        Ok(shipments)
    }

    async fn update_estimated_delivery(
        &self,
        id: ShipmentId,
        estimated_delivery: DateTime<Utc>,
    ) -> Result<()> {
        self.lock()?.shipment_mut(id)?.estimated_delivery = estimated_delivery;
        Ok(())
    }

    async fn append_event(&self, event: &ShipmentEvent) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(message) = &state.append_failure {
            return Err(ShipmentError::Storage(message.clone()));
        }

        let timeline = &mut state.shipment_mut(event.shipment_id)?.timeline;
        if timeline.iter().any(|existing| existing.sequence == event.sequence) {
            return Err(ShipmentError::Conflict(format!(
                "event {} already recorded for shipment {}",
                event.sequence, event.shipment_id
            )));
        }
        timeline.push(event.clone());
        Ok(())
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut state = self.lock()?;
        let shipment = state.shipment_mut(review.shipment_id)?;
        if shipment.review.is_some() {
            return Err(ShipmentError::Conflict(
                "shipment has already been reviewed".into(),
            ));
        }
        shipment.review = Some(review.clone());
        Ok(())
    }

    async fn add_tag(&self, id: ShipmentId, tag: &Tag) -> Result<()> {
        let mut state = self.lock()?;
        let shipment = state.shipment_mut(id)?;
        if shipment.has_tag(tag.name) {
            return Err(ShipmentError::Conflict(format!(
                "tag {} is already attached",
                tag.name
            )));
        }
        shipment.tags.push(tag.clone());
        Ok(())
    }

    async fn remove_tag(&self, id: ShipmentId, name: TagName) -> Result<()> {
        let mut state = self.lock()?;
        let shipment = state.shipment_mut(id)?;
        let before = shipment.tags.len();
        shipment.tags.retain(|tag| tag.name != name);
        if shipment.tags.len() == before {
            return Err(ShipmentError::Conflict(format!("tag {name} is not attached")));
        }
        Ok(())
    }

    async fn delete_shipment(&self, id: ShipmentId) -> Result<bool> {
        Ok(self.lock()?.shipments.remove(&id).is_some())
    }
}

impl PartnerRepository for InMemoryStore {
    async fn find_serviceable(&self, destination: u32) -> Result<Vec<PartnerCapacity>> {
        let state = self.lock()?;
        let mut found: Vec<PartnerCapacity> = state
            .partners
            .values()
            .filter(|partner| partner.serves(destination))
            .map(|partner| state.capacity(partner))
            .collect();
        found.sort_by_key(|entry| (entry.partner.account.created_at, entry.partner.id()));
        Ok(found)
    }

    async fn partner_capacity(&self, id: PartnerId) -> Result<Option<PartnerCapacity>> {
        let state = self.lock()?;
        Ok(state.partners.get(&id).map(|partner| state.capacity(partner)))
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<DeliveryPartner>> {
        Ok(self.lock()?.partners.get(&id).cloned())
    }

    async fn insert_partner(&self, partner: &DeliveryPartner) -> Result<()> {
        let mut state = self.lock()?;
        if state.email_taken(&partner.account.email) {
            return Err(ShipmentError::Conflict("email already registered".into()));
        }
        state.partners.insert(partner.id(), partner.clone());
        Ok(())
    }

    async fn update_partner(&self, partner: &DeliveryPartner) -> Result<()> {
        let mut state = self.lock()?;
        let Some(stored) = state.partners.get_mut(&partner.id()) else {
            return Err(ShipmentError::not_found("partner", partner.id()));
        };
        stored.serviceable_zip_codes.clone_from(&partner.serviceable_zip_codes);
        stored.max_handling_capacity = partner.max_handling_capacity;
        Ok(())
    }

    async fn set_partner_email_verified(&self, id: PartnerId) -> Result<bool> {
        let mut state = self.lock()?;
        match state.partners.get_mut(&id) {
            Some(partner) => {
                partner.account.email_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl SellerRepository for InMemoryStore {
    async fn insert_seller(&self, seller: &Seller) -> Result<()> {
        let mut state = self.lock()?;
        if state.email_taken(&seller.account.email) {
            return Err(ShipmentError::Conflict("email already registered".into()));
        }
        state.sellers.insert(seller.id(), seller.clone());
        Ok(())
    }

    async fn get_seller(&self, id: SellerId) -> Result<Option<Seller>> {
        Ok(self.lock()?.sellers.get(&id).cloned())
    }

    async fn set_seller_email_verified(&self, id: SellerId) -> Result<bool> {
        let mut state = self.lock()?;
        match state.sellers.get_mut(&id) {
            Some(seller) => {
                seller.account.email_verified = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
