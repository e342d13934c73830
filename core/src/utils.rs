//! Input validation helpers shared by the lifecycle and accounts services.

use crate::error::{Result, ShipmentError};

/// Shipment content length bounds, in characters.
pub const CONTENT_LEN: (usize, usize) = (5, 30);

/// Maximum shipment weight in kilograms.
pub const MAX_WEIGHT_KG: f64 = 25.0;

/// Account name length bounds, in characters.
pub const NAME_LEN: (usize, usize) = (3, 50);

/// Maximum review comment length, in characters.
pub const MAX_COMMENT_LEN: usize = 500;

/// Validate email address format.
///
/// This performs basic RFC 5322 validation:
/// - Must contain exactly one `@`
/// - Must have non-empty local and domain parts
/// - Length must be between 3 and 255 characters
///
/// # Examples
///
/// ```
/// use shiptrack_core::utils::is_valid_email;
///
/// assert!(is_valid_email("client@example.com"));
/// assert!(is_valid_email("client+parcel@mail.example.com"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("@example.com"));
/// assert!(!is_valid_email("client@"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }

    if !domain.contains('.') {
        return false;
    }

    let valid_local_chars =
        |c: char| c.is_alphanumeric() || c == '.' || c == '-' || c == '+' || c == '_';
    let valid_domain_chars = |c: char| c.is_alphanumeric() || c == '.' || c == '-';

    if !local.chars().all(valid_local_chars) || !domain.chars().all(valid_domain_chars) {
        return false;
    }

    domain.split('.').all(|part| !part.is_empty())
}

/// Validate a phone number in loose E.164 form.
///
/// An optional leading `+` followed by 7 to 15 digits. Spaces and dashes are
/// tolerated as separators.
///
/// # Examples
///
/// ```
/// use shiptrack_core::utils::is_valid_phone;
///
/// assert!(is_valid_phone("+57 300 123 4567"));
/// assert!(!is_valid_phone("call me"));
/// ```
#[must_use]
pub fn is_valid_phone(phone: &str) -> bool {
    let body = phone.strip_prefix('+').unwrap_or(phone);
    if !body.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') {
        return false;
    }
    let digits = body.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
}

/// Check a string's character count against inclusive bounds.
///
/// # Errors
///
/// Returns `ValidationError` naming `field` when out of bounds.
pub fn check_len(field: &str, value: &str, (min, max): (usize, usize)) -> Result<()> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ShipmentError::ValidationError(format!(
            "{field} must be between {min} and {max} characters, got {len}"
        )));
    }
    Ok(())
}

/// Check an email address.
///
/// # Errors
///
/// Returns `ValidationError` if the address is malformed.
pub fn check_email(field: &str, email: &str) -> Result<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ShipmentError::ValidationError(format!(
            "{field} is not a valid email address"
        )))
    }
}

/// Check a shipment weight.
///
/// # Errors
///
/// Returns `ValidationError` unless `0 < weight <= 25`.
pub fn check_weight(weight: f64) -> Result<()> {
    if weight.is_finite() && weight > 0.0 && weight <= MAX_WEIGHT_KG {
        Ok(())
    } else {
        Err(ShipmentError::ValidationError(format!(
            "weight must be above 0 and at most {MAX_WEIGHT_KG} kg"
        )))
    }
}
