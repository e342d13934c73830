//! Error types for shipment lifecycle operations.

use crate::types::ShipmentStatus;
use thiserror::Error;

/// Result type alias for shipment operations.
pub type Result<T> = std::result::Result<T, ShipmentError>;

/// Error taxonomy for the shipment core.
///
/// Business rejections (`NotFound` through `ValidationError`) are surfaced to
/// callers as-is and never retried. System faults propagate as unexpected
/// failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ShipmentError {
    // ═══════════════════════════════════════════════════════════
    // Business Rejections
    // ═══════════════════════════════════════════════════════════

    /// Unknown identifier.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier that was not found
        id: String,
    },

    /// Acting principal has no rights over the resource.
    #[error("Not authorized to access this shipment")]
    Unauthorized,

    /// Right principal, wrong credential (e.g. bad verification code).
    #[error("Operation forbidden: {0}")]
    Forbidden(String),

    /// Operation is not valid for the shipment's current derived status.
    #[error("Cannot {operation} a shipment in status {status:?}")]
    InvalidState {
        /// Operation that was attempted
        operation: &'static str,
        /// Derived status at the time of the attempt
        status: Option<ShipmentStatus>,
    },

    /// No serviceable partner has spare capacity for the destination.
    #[error("No delivery partner available for destination {destination}")]
    NoCapacityAvailable {
        /// Destination zip code
        destination: u32,
    },

    /// Duplicate add or redundant removal.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed request or patch.
    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Partner filled up between assignment and persistence.
    ///
    /// Raised by repositories; the lifecycle retries assignment on it.
    #[error("Delivery partner capacity exhausted")]
    CapacityExhausted,

    /// Persistence layer failure (connectivity, constraint violation).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Notification transport failure. Never reaches lifecycle callers.
    #[error("Notification error: {0}")]
    Notification(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ShipmentError {
    /// Build a `NotFound` error for an entity kind and id.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` if this is a business-rule rejection rather than a fault.
    ///
    /// # Examples
    ///
    /// ```
    /// # use shiptrack_core::ShipmentError;
    /// assert!(ShipmentError::Unauthorized.is_user_error());
    /// assert!(!ShipmentError::Storage("down".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Unauthorized
                | Self::Forbidden(_)
                | Self::InvalidState { .. }
                | Self::NoCapacityAvailable { .. }
                | Self::Conflict(_)
                | Self::ValidationError(_)
        )
    }
}

impl From<serde_json::Error> for ShipmentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
