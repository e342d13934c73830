//! Verification code store trait.

use crate::error::Result;
use crate::types::ShipmentId;

/// Store for the one-time delivery verification codes.
///
/// Keyed by shipment ID, last write wins, no expiry.
///
/// # Security Requirements
///
/// 1. **Atomicity**: `consume_code()` must compare and delete in one step
/// 2. **Single-use**: A consumed code cannot be used again
/// 3. **Constant-time**: The comparison must not leak how much of the code matched
pub trait VerificationCodeStore: Send + Sync {
    /// Store (or replace) the code for a shipment.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn set_code(
        &self,
        shipment: ShipmentId,
        code: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Current code for a shipment, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn get_code(
        &self,
        shipment: ShipmentId,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Consume the code if it matches.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: The code matched and has been deleted
    /// - `Ok(false)`: No code stored, or it does not match (the stored code is kept)
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn consume_code(
        &self,
        shipment: ShipmentId,
        code: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}
