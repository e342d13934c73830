//! Domain types for shipment tracking.
//!
//! Shipments never store their status. It is always derived from the latest
//! entry of the shipment's timeline, see [`crate::timeline`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ShipmentError;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a shipment
    ShipmentId
);
uuid_id!(
    /// Unique identifier for a timeline event
    EventId
);
uuid_id!(
    /// Unique identifier for a delivery partner
    PartnerId
);
uuid_id!(
    /// Unique identifier for a seller
    SellerId
);
uuid_id!(
    /// Unique identifier for a review
    ReviewId
);

// ============================================================================
// Status
// ============================================================================

/// Status recorded on a timeline event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Created by the seller, partner assigned
    Placed,
    /// Moving between hubs
    InTransit,
    /// On the last leg, verification code issued
    OutForDelivery,
    /// Handed to the client (terminal)
    Delivered,
    /// Cancelled by the seller (terminal)
    Cancelled,
}

impl ShipmentStatus {
    /// Every status in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Placed,
        Self::InTransit,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Placed => "placed",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// `delivered` and `cancelled` end the lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = ShipmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ShipmentError::ValidationError(format!("unknown status '{s}'")))
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// One immutable entry of a shipment's timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    /// Event ID
    pub id: EventId,
    /// Shipment the event belongs to
    pub shipment_id: ShipmentId,
    /// Zip code where the event happened
    pub location: u32,
    /// Status after this event
    pub status: ShipmentStatus,
    /// Human-readable description
    pub description: String,
    /// When the event was recorded
    pub created_at: DateTime<Utc>,
    /// Per-shipment insertion counter, breaks `created_at` ties
    pub sequence: u64,
}

// ============================================================================
// Tags
// ============================================================================

/// Closed set of handling tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagName {
    /// Handle with care
    Fragile,
    /// Spoils over time
    Perishable,
    /// Needs lifting equipment
    Heavy,
    /// Gift wrapped
    Gift,
    /// Contains electronics
    Electronics,
    /// Paperwork only
    Documents,
    /// Return to seller
    Return,
    /// Priority handling
    Express,
    /// Crosses a border
    International,
    /// Cold chain
    TemperatureControlled,
    /// No special handling
    Standard,
}

impl TagName {
    /// Every tag name.
    pub const ALL: [Self; 11] = [
        Self::Fragile,
        Self::Perishable,
        Self::Heavy,
        Self::Gift,
        Self::Electronics,
        Self::Documents,
        Self::Return,
        Self::Express,
        Self::International,
        Self::TemperatureControlled,
        Self::Standard,
    ];

    /// Wire name of the tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fragile => "fragile",
            Self::Perishable => "perishable",
            Self::Heavy => "heavy",
            Self::Gift => "gift",
            Self::Electronics => "electronics",
            Self::Documents => "documents",
            Self::Return => "return",
            Self::Express => "express",
            Self::International => "international",
            Self::TemperatureControlled => "temperature_controlled",
            Self::Standard => "standard",
        }
    }

    /// Handling instruction used when the caller does not supply one.
    #[must_use]
    pub const fn default_instruction(self) -> &'static str {
        match self {
            Self::Fragile => "Handle with care. Do not stack heavy items on top.",
            Self::Perishable => "Deliver promptly. Keep away from heat.",
            Self::Heavy => "Use lifting equipment or two-person handling.",
            Self::Gift => "Do not include invoices or price tags.",
            Self::Electronics => "Keep dry and avoid strong magnetic fields.",
            Self::Documents => "Keep flat and dry.",
            Self::Return => "Route back to the seller's location.",
            Self::Express => "Prioritise over standard shipments.",
            Self::International => "Customs paperwork must travel with the parcel.",
            Self::TemperatureControlled => "Keep within the labelled temperature range.",
            Self::Standard => "No special handling required.",
        }
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagName {
    type Err = ShipmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s.trim())
            .ok_or_else(|| ShipmentError::ValidationError(format!("unknown tag '{s}'")))
    }
}

/// A tag attached to a shipment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag name
    pub name: TagName,
    /// Free-text handling instruction
    pub instruction: String,
}

impl Tag {
    /// Tag with its default instruction.
    #[must_use]
    pub fn new(name: TagName) -> Self {
        Self {
            name,
            instruction: name.default_instruction().to_string(),
        }
    }

    /// Tag with a custom instruction.
    #[must_use]
    pub fn with_instruction(name: TagName, instruction: impl Into<String>) -> Self {
        Self {
            name,
            instruction: instruction.into(),
        }
    }
}

// ============================================================================
// Reviews
// ============================================================================

/// Client review left after delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Review ID
    pub id: ReviewId,
    /// Reviewed shipment
    pub shipment_id: ShipmentId,
    /// Rating from 1 to 5
    pub rating: u8,
    /// Optional comment
    pub comment: Option<String>,
    /// When the review was left
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Accounts
// ============================================================================

/// Fields shared by sellers and delivery partners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account<Id> {
    /// Account ID
    pub id: Id,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Whether the email address has been verified
    pub email_verified: bool,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// A seller who creates shipments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
    /// Shared account fields
    pub account: Account<SellerId>,
    /// Zip code where shipments are handed over
    pub zip_code: u32,
    /// Street address
    pub address: Option<String>,
}

impl Seller {
    /// Seller ID
    #[must_use]
    pub const fn id(&self) -> SellerId {
        self.account.id
    }

    /// Seller name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.account.name
    }
}

/// A delivery partner that carries shipments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPartner {
    /// Shared account fields
    pub account: Account<PartnerId>,
    /// Destination zip codes this partner delivers to
    pub serviceable_zip_codes: BTreeSet<u32>,
    /// Maximum number of active shipments
    pub max_handling_capacity: u32,
}

impl DeliveryPartner {
    /// Partner ID
    #[must_use]
    pub const fn id(&self) -> PartnerId {
        self.account.id
    }

    /// Partner name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.account.name
    }

    /// Whether this partner delivers to `destination`.
    #[must_use]
    pub fn serves(&self, destination: u32) -> bool {
        self.serviceable_zip_codes.contains(&destination)
    }
}

// ============================================================================
// Shipment
// ============================================================================

/// A shipment together with its timeline, review and tags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    /// Shipment ID
    pub id: ShipmentId,
    /// What is being shipped
    pub content: String,
    /// Weight in kilograms
    pub weight: f64,
    /// Destination zip code
    pub destination: u32,
    /// Client email, receives every notification
    pub client_contact_email: String,
    /// Client phone, receives the verification code when present
    pub client_contact_phone: Option<String>,
    /// Owning seller
    pub seller_id: SellerId,
    /// Assigned delivery partner
    pub partner_id: Option<PartnerId>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Estimated delivery timestamp
    pub estimated_delivery: DateTime<Utc>,
    /// Append-only event log, in insertion order
    pub timeline: Vec<ShipmentEvent>,
    /// Client review, once delivered
    pub review: Option<Review>,
    /// Handling tags
    pub tags: Vec<Tag>,
}

impl Shipment {
    /// Current status, derived from the latest timeline event.
    #[must_use]
    pub fn status(&self) -> Option<ShipmentStatus> {
        crate::timeline::derive_status(&self.timeline)
    }

    /// Latest timeline event.
    #[must_use]
    pub fn latest_event(&self) -> Option<&ShipmentEvent> {
        crate::timeline::latest(&self.timeline)
    }

    /// Whether the shipment still occupies partner capacity.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status().is_some_and(ShipmentStatus::is_terminal)
    }

    /// Whether a tag with this name is attached.
    #[must_use]
    pub fn has_tag(&self, name: TagName) -> bool {
        self.tags.iter().any(|tag| tag.name == name)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Payload for creating a shipment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateShipment {
    /// What is being shipped (5 to 30 characters)
    pub content: String,
    /// Weight in kilograms (above 0, at most 25)
    pub weight: f64,
    /// Destination zip code
    pub destination: u32,
    /// Client email
    pub client_contact_email: String,
    /// Client phone
    pub client_contact_phone: Option<String>,
}

/// Partial update applied by the assigned delivery partner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPatch {
    /// New location
    pub location: Option<u32>,
    /// New status
    pub status: Option<ShipmentStatus>,
    /// Custom event description
    pub description: Option<String>,
    /// New estimated delivery
    pub estimated_delivery: Option<DateTime<Utc>>,
    /// Code issued when the shipment went out for delivery
    pub verification_code: Option<String>,
}

impl ShipmentPatch {
    /// A patch carrying no field besides the verification code changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.status.is_none()
            && self.description.is_none()
            && self.estimated_delivery.is_none()
    }

    /// Whether applying this patch on top of `latest` records a new event.
    #[must_use]
    pub fn touches_timeline(&self, latest: Option<&ShipmentEvent>) -> bool {
        if self.description.is_some() {
            return true;
        }
        match latest {
            Some(event) => {
                self.status.is_some_and(|status| status != event.status)
                    || self.location.is_some_and(|location| location != event.location)
            }
            None => self.status.is_some() || self.location.is_some(),
        }
    }
}

/// Review submitted through the tokenized review link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Rating from 1 to 5
    pub rating: u8,
    /// Optional comment
    pub comment: Option<String>,
}
