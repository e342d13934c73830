//! # Shiptrack Stores
//!
//! Production implementations of the collaborator traits defined in
//! `shiptrack-core`:
//!
//! - [`PostgresStore`]: shipment, partner and seller repositories on `sqlx`
//! - [`RedisVerificationCodeStore`]: delivery verification codes on `redis`
//! - [`SmtpEmailTransport`]: email over SMTP with `lettre`
//! - [`TwilioSmsTransport`]: text messages through the Twilio REST API
//! - [`ConsoleEmailTransport`] / [`ConsoleSmsTransport`]: print to stdout
//!
//! Tests that need a running PostgreSQL or Redis are `#[ignore]`d. Run them
//! with `cargo test -p shiptrack-stores -- --ignored` and `DATABASE_URL` /
//! `REDIS_URL` set.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod code_redis;
pub mod console;
pub mod postgres;
pub mod sms;
pub mod smtp_email;
pub mod templates;

pub use code_redis::RedisVerificationCodeStore;
pub use console::{ConsoleEmailTransport, ConsoleSmsTransport};
pub use postgres::PostgresStore;
pub use sms::TwilioSmsTransport;
pub use smtp_email::SmtpEmailTransport;
