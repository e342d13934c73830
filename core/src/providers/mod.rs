//! Collaborator traits.
//!
//! The lifecycle and accounts services depend only on these traits. The
//! `shiptrack-stores` crate provides the production implementations
//! (`PostgreSQL`, `Redis`, SMTP, Twilio) and [`crate::mocks`] provides
//! in-memory ones for tests and local runs.
//!
//! ```text
//! ShipmentLifecycle ──► ShipmentRepository ┐
//!        │          ──► PartnerRepository  ├─ one store (atomic capacity check)
//!        │          ──► SellerRepository   ┘
//!        │
//!        └─► NotificationTrigger ──► VerificationCodeStore (synchronous)
//!                              └──► NotificationSink ──► NotificationWorker ──► NotificationTransport
//! ```

pub mod code_store;
pub mod notification;
pub mod repository;

pub use code_store::VerificationCodeStore;
pub use notification::{
    EmailTransport, NotificationSink, NotificationTransport, OutboundMessage, SmsTransport,
    Transports,
};
pub use repository::{PartnerRepository, SellerRepository, ShipmentRepository};
