//! Redis-based verification code store.
//!
//! Codes live under `shiptrack:code:{shipment_id}` with no TTL. A new code
//! for the same shipment overwrites the previous one.
//!
//! # Consumption
//!
//! `consume_code` reads the stored code and compares it in constant time,
//! then deletes it with a compare-and-delete script. Two concurrent consumers
//! presenting the right code cannot both succeed, since only one `DEL` can
//! remove the key.

use constant_time_eq::constant_time_eq;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use shiptrack_core::config::RedisConfig;
use shiptrack_core::error::{Result, ShipmentError};
use shiptrack_core::providers::VerificationCodeStore;
use shiptrack_core::types::ShipmentId;

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// `Redis`-backed verification code store.
///
/// This type is `Clone`. Clones share one `ConnectionManager`.
#[derive(Clone)]
pub struct RedisVerificationCodeStore {
    conn_manager: ConnectionManager,
    compare_and_delete: Script,
}

impl RedisVerificationCodeStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The URL is malformed
    /// - Connection to the server fails
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            ShipmentError::Storage(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            ShipmentError::Storage(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisVerificationCodeStore initialized successfully");

        Ok(Self {
            conn_manager,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        })
    }

    /// Connect using [`RedisConfig`].
    ///
    /// # Errors
    ///
    /// See [`RedisVerificationCodeStore::new`].
    pub async fn from_config(config: &RedisConfig) -> Result<Self> {
        Self::new(&config.url).await
    }

    fn code_key(shipment: ShipmentId) -> String {
        format!("shiptrack:code:{shipment}")
    }
}

impl VerificationCodeStore for RedisVerificationCodeStore {
    async fn set_code(&self, shipment: ShipmentId, code: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: () = conn
            .set(Self::code_key(shipment), code)
            .await
            .map_err(|e| ShipmentError::Storage(format!("Failed to store code: {e}")))?;

        tracing::debug!(shipment_id = %shipment, "Stored verification code");
        Ok(())
    }

    async fn get_code(&self, shipment: ShipmentId) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();

        conn.get(Self::code_key(shipment))
            .await
            .map_err(|e| ShipmentError::Storage(format!("Failed to get code: {e}")))
    }

    async fn consume_code(&self, shipment: ShipmentId, code: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let key = Self::code_key(shipment);

        let stored: Option<String> = conn
            .get(&key)
            .await
            .map_err(|e| ShipmentError::Storage(format!("Failed to get code: {e}")))?;

        let Some(stored) = stored else {
            tracing::debug!(shipment_id = %shipment, "No verification code stored");
            return Ok(false);
        };

        if !constant_time_eq(stored.as_bytes(), code.as_bytes()) {
            tracing::warn!(shipment_id = %shipment, "Verification code mismatch");
            return Ok(false);
        }

        let deleted: i64 = self
            .compare_and_delete
            .key(&key)
            .arg(&stored)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| ShipmentError::Storage(format!("Failed to consume code: {e}")))?;

        if deleted == 0 {
            tracing::warn!(shipment_id = %shipment, "Verification code consumed concurrently");
        }
        Ok(deleted == 1)
    }
}
