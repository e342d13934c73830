//! In-memory provider implementations for tests and local runs.
//!
//! Enabled by the `test-utils` feature (on by default).

pub mod code_store;
pub mod notification;
pub mod store;

pub use code_store::MockCodeStore;
pub use notification::{MockTransport, RecordingSink};
pub use store::InMemoryStore;

use crate::types::{
    Account, DeliveryPartner, PartnerId, Seller, SellerId, Shipment, ShipmentId,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_REGISTRATION: AtomicI64 = AtomicI64::new(0);

/// Strictly increasing registration timestamps, so sample partners keep the
/// order they were built in.
fn next_registration_time() -> DateTime<Utc> {
    let offset = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
    DateTime::from_timestamp(1_700_000_000 + offset, 0).unwrap_or_default()
}

/// A verified seller located at `zip_code`.
#[must_use]
pub fn sample_seller(name: &str, zip_code: u32) -> Seller {
    Seller {
        account: Account {
            id: SellerId::new(),
            name: name.to_string(),
            email: format!("{}@sellers.example.com", name.to_lowercase().replace(' ', ".")),
            email_verified: true,
            created_at: next_registration_time(),
        },
        zip_code,
        address: None,
    }
}

/// A verified delivery partner serving `zip_codes`.
#[must_use]
pub fn sample_partner(name: &str, zip_codes: &[u32], max_handling_capacity: u32) -> DeliveryPartner {
    DeliveryPartner {
        account: Account {
            id: PartnerId::new(),
            name: name.to_string(),
            email: format!("{}@partners.example.com", name.to_lowercase().replace(' ', ".")),
            email_verified: true,
            created_at: next_registration_time(),
        },
        serviceable_zip_codes: zip_codes.iter().copied().collect(),
        max_handling_capacity,
    }
}

/// An unassigned shipment to 11001 with an empty timeline.
#[must_use]
pub fn sample_shipment() -> Shipment {
    let now = Utc::now();
    Shipment {
        id: ShipmentId::new(),
        content: "Books and notes".to_string(),
        weight: 2.5,
        destination: 11001,
        client_contact_email: "client@example.com".to_string(),
        client_contact_phone: None,
        seller_id: SellerId::new(),
        partner_id: None,
        created_at: now,
        estimated_delivery: now + Duration::days(3),
        timeline: Vec::new(),
        review: None,
        tags: Vec::new(),
    }
}
