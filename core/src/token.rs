//! Signed, time-limited tokens for review and email verification links.
//!
//! Format: `base64url(json claims) "." base64url(HMAC-SHA256(secret, first part))`.
//! The purpose is part of the signed claims, so a review token can never be
//! replayed as an email verification token.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

use crate::error::{Result, ShipmentError};

type HmacSha256 = Hmac<Sha256>;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Leave a review on a delivered shipment
    Review,
    /// Confirm a seller or partner email address
    EmailVerification,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    purpose: TokenPurpose,
    sub: String,
    iat: i64,
}

/// Encodes and verifies signed tokens.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenCodec {
    /// Codec signing with `secret`.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ShipmentError::Serialization(format!("invalid signing key: {e}")))
    }

    /// Issue a token for `subject`.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the claims cannot be encoded.
    pub fn encode(
        &self,
        purpose: TokenPurpose,
        subject: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = Claims {
            purpose,
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    /// Verify a token and return its subject.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the token is malformed, was signed with another
    /// secret, was issued for another purpose, or is older than `max_age`.
    pub fn decode(
        &self,
        token: &str,
        purpose: TokenPurpose,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let (payload, signature) = token.split_once('.').ok_or(ShipmentError::Unauthorized)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ShipmentError::Unauthorized)?;

        // verify_slice compares in constant time
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("Rejected token with bad signature");
            return Err(ShipmentError::Unauthorized);
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(ShipmentError::Unauthorized)?;

        if claims.purpose != purpose {
            tracing::debug!(expected = ?purpose, got = ?claims.purpose, "Rejected token for another purpose");
            return Err(ShipmentError::Unauthorized);
        }

        let issued_at =
            DateTime::<Utc>::from_timestamp(claims.iat, 0).ok_or(ShipmentError::Unauthorized)?;
        if now - issued_at > max_age {
            tracing::debug!(%issued_at, "Rejected expired token");
            return Err(ShipmentError::Unauthorized);
        }

        Ok(claims.sub)
    }
}
