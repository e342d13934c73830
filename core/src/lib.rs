//! # Shiptrack Core
//!
//! Shipment lifecycle, partner assignment and client notifications.
//!
//! ## Components
//!
//! - **Timeline** ([`timeline`]): append-only event log per shipment. The
//!   current status is derived from the latest event and never stored.
//! - **Capacity index** ([`capacity`]): partners serving a destination and
//!   their remaining handling capacity.
//! - **Assignment engine** ([`assignment`]): first serviceable partner with
//!   room wins.
//! - **Lifecycle** ([`lifecycle`]): create, update, cancel, tag, review, get
//!   and delete shipments.
//! - **Notification trigger** ([`notification`]): the email, SMS and
//!   verification code that go with each status change.
//! - **Accounts** ([`accounts`]): seller and partner registration, email
//!   verification, partner profile updates.
//!
//! ## Control Flow
//!
//! ```text
//! create ─► AssignmentEngine ─► ShipmentRepository::insert_assigned (atomic capacity check)
//!        ─► Timeline::append(placed) ─► NotificationTrigger
//!
//! update ─► authorize ─► verification gate ─► Timeline::append ─► NotificationTrigger
//! ```
//!
//! All collaborators sit behind traits in [`providers`]. Production
//! implementations live in the `shiptrack-stores` crate, in-memory ones in
//! [`mocks`] (feature `test-utils`).

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod accounts;
pub mod assignment;
pub mod capacity;
pub mod config;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod providers;
pub mod queue;
pub mod timeline;
pub mod token;
pub mod types;
pub mod utils;

#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use accounts::AccountsService;
pub use config::Config;
pub use environment::{Clock, SystemClock};
pub use error::{Result, ShipmentError};
pub use lifecycle::ShipmentLifecycle;
pub use notification::NotificationTrigger;
pub use queue::{NotificationQueue, NotificationWorker, notification_queue};
pub use token::TokenCodec;
pub use types::{
    CreateShipment, DeliveryPartner, PartnerId, Seller, SellerId, Shipment, ShipmentEvent,
    ShipmentId, ShipmentPatch, ShipmentStatus, Tag, TagName,
};
