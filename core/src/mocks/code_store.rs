//! Mock verification code store for testing.

use crate::error::{Result, ShipmentError};
use crate::providers::VerificationCodeStore;
use crate::types::ShipmentId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory code store with single-use consumption.
#[derive(Debug, Clone, Default)]
pub struct MockCodeStore {
    codes: Arc<Mutex<HashMap<ShipmentId, String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MockCodeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Storage(message)` (for testing).
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    /// Number of stored codes (for testing).
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.lock().map_or(0, |codes| codes.len())
    }

    /// Whether no code is stored (for testing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ShipmentId, String>>> {
        let failure = self
            .failure
            .lock()
            .map_err(|_| ShipmentError::Storage("code store lock poisoned".into()))?
            .clone();
        if let Some(message) = failure {
            return Err(ShipmentError::Storage(message));
        }
        self.codes
            .lock()
            .map_err(|_| ShipmentError::Storage("code store lock poisoned".into()))
    }
}

impl VerificationCodeStore for MockCodeStore {
    async fn set_code(&self, shipment: ShipmentId, code: &str) -> Result<()> {
        self.lock()?.insert(shipment, code.to_string());
        Ok(())
    }

    async fn get_code(&self, shipment: ShipmentId) -> Result<Option<String>> {
        Ok(self.lock()?.get(&shipment).cloned())
    }

    async fn consume_code(&self, shipment: ShipmentId, code: &str) -> Result<bool> {
        let mut codes = self.lock()?;

        // Compare and delete under one lock
        let matches = codes.get(&shipment).is_some_and(|stored| {
            constant_time_eq::constant_time_eq(stored.as_bytes(), code.as_bytes())
        });
        if matches {
            codes.remove(&shipment);
        }
        Ok(matches)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_code_is_single_use() {
        let store = MockCodeStore::new();
        let shipment = ShipmentId::new();
        store.set_code(shipment, "482913").await.unwrap();

        assert!(!store.consume_code(shipment, "000000").await.unwrap());
        assert_eq!(store.get_code(shipment).await.unwrap().as_deref(), Some("482913"));

        assert!(store.consume_code(shipment, "482913").await.unwrap());
        assert!(!store.consume_code(shipment, "482913").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MockCodeStore::new();
        let shipment = ShipmentId::new();
        store.set_code(shipment, "111111").await.unwrap();
        store.set_code(shipment, "222222").await.unwrap();

        assert!(!store.consume_code(shipment, "111111").await.unwrap());
        assert!(store.consume_code(shipment, "222222").await.unwrap());
    }
}
