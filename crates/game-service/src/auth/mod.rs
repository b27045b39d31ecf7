//! Application-key authentication for client requests.
//!
//! A client proves it holds the application key without sending it:
//!
//! ```text
//! hash = HMAC-SHA256(app_key, user_id || timestamp_be_u64 || nonce)
//! ```
//!
//! - `timestamp` is the issuance time truncated to whole seconds
//! - `nonce` is 8 bytes from the system CSPRNG
//! - Verification recomputes the tag and compares in constant time
//!   (`ring::hmac::verify`)
//!
//! Tracking of already-seen nonces is left to the caller; this module only
//! produces and checks the fields.

use crate::errors::AuthError;
use crate::observability::metrics;

use chrono::{DateTime, Utc};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 8;

/// How long after issuance auth data is accepted.
pub const AUTH_DATA_LIFETIME: Duration = Duration::from_secs(1);

/// Authentication data sent by a client alongside its user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthData {
    /// User the data was issued for.
    pub user_id: String,
    /// Issuance time, seconds since the Unix epoch.
    pub timestamp: i64,
    /// Lowercase hex nonce.
    pub nonce: String,
    /// Lowercase hex HMAC-SHA256 tag.
    pub hash: String,
}

/// Draw a fresh nonce from the system CSPRNG.
///
/// # Errors
///
/// Returns `AuthError::Entropy` if the OS entropy source fails.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], AuthError> {
    let rng = SystemRandom::new();
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| AuthError::Entropy)?;
    Ok(nonce)
}

/// Big-endian encoding of a seconds timestamp, as fed into the HMAC.
#[must_use]
pub fn timestamp_bytes(seconds: i64) -> [u8; 8] {
    seconds.to_be_bytes()
}

fn auth_message(user_id: &[u8], timestamp: &[u8], nonce: &[u8]) -> Vec<u8> {
    [user_id, timestamp, nonce].concat()
}

/// Compute the binary HMAC-SHA256 tag over `user_id || timestamp || nonce`.
#[must_use]
pub fn calculate_hmac(key: &[u8], user_id: &[u8], timestamp: &[u8], nonce: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, &auth_message(user_id, timestamp, nonce));
    tag.as_ref().to_vec()
}

/// Check a binary tag against the given fields in constant time.
#[must_use]
pub fn valid_hmac(
    mac: &[u8],
    key: &[u8],
    user_id: &[u8],
    timestamp: &[u8],
    nonce: &[u8],
) -> bool {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    hmac::verify(&key, &auth_message(user_id, timestamp, nonce), mac).is_ok()
}

/// Lowercase hex form of [`calculate_hmac`].
#[must_use]
pub fn calculate_hex_hmac(key: &[u8], user_id: &[u8], timestamp: &[u8], nonce: &[u8]) -> String {
    hex::encode(calculate_hmac(key, user_id, timestamp, nonce))
}

/// Hex form of [`valid_hmac`]. Input that is not valid hex never verifies.
#[must_use]
pub fn valid_hex_hmac(
    hex_mac: &str,
    key: &[u8],
    user_id: &[u8],
    timestamp: &[u8],
    nonce: &[u8],
) -> bool {
    match hex::decode(hex_mac) {
        Ok(mac) => valid_hmac(&mac, key, user_id, timestamp, nonce),
        Err(_) => false,
    }
}

/// Issue auth data for `user_id` at `issued_at` (truncated to seconds).
///
/// # Errors
///
/// Fails only if nonce generation fails.
pub fn generate_auth_data(
    key: &[u8],
    user_id: &str,
    issued_at: DateTime<Utc>,
) -> Result<AuthData, AuthError> {
    let timestamp = issued_at.timestamp();
    let nonce = generate_nonce()?;
    let hash = calculate_hex_hmac(
        key,
        user_id.as_bytes(),
        &timestamp_bytes(timestamp),
        &nonce,
    );

    Ok(AuthData {
        user_id: user_id.to_string(),
        timestamp,
        nonce: hex::encode(nonce),
        hash,
    })
}

/// Validate auth data presented by `user_id` at `check_time`.
///
/// Only forward drift is treated as expiry: a `check_time` at or before the
/// issuance second always passes the time check.
///
/// # Errors
///
/// - `UserIdMismatch` if the data was issued for another user
/// - `Malformed` if the nonce is not hex
/// - `InvalidHash` if the tag does not verify under `key`
/// - `Expired` if `check_time` is more than [`AUTH_DATA_LIFETIME`] after issuance
pub fn valid_auth_data(
    data: &AuthData,
    key: &[u8],
    user_id: &str,
    check_time: DateTime<Utc>,
) -> Result<(), AuthError> {
    let result = check_auth_data(data, key, user_id, check_time);
    if let Err(e) = &result {
        debug!(target: "game.auth", error = %e, "Auth data rejected");
        metrics::record_auth_failure(auth_failure_label(e));
    }
    result
}

fn check_auth_data(
    data: &AuthData,
    key: &[u8],
    user_id: &str,
    check_time: DateTime<Utc>,
) -> Result<(), AuthError> {
    if data.user_id != user_id {
        return Err(AuthError::UserIdMismatch);
    }

    let nonce = hex::decode(&data.nonce)
        .map_err(|e| AuthError::Malformed(format!("nonce is not hex: {e}")))?;

    if !valid_hex_hmac(
        &data.hash,
        key,
        user_id.as_bytes(),
        &timestamp_bytes(data.timestamp),
        &nonce,
    ) {
        return Err(AuthError::InvalidHash);
    }

    let issued_at = DateTime::<Utc>::from_timestamp(data.timestamp, 0)
        .ok_or_else(|| AuthError::Malformed("timestamp out of range".to_string()))?;

    // A negative elapsed time fails the conversion and is accepted.
    if let Ok(elapsed) = (check_time - issued_at).to_std() {
        if elapsed > AUTH_DATA_LIFETIME {
            return Err(AuthError::Expired);
        }
    }

    Ok(())
}

fn auth_failure_label(err: &AuthError) -> &'static str {
    match err {
        AuthError::InvalidHash => "invalid_hash",
        AuthError::UserIdMismatch => "user_mismatch",
        AuthError::Expired => "expired",
        AuthError::Malformed(_) => "malformed",
        AuthError::Entropy => "entropy",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap() + TimeDelta::milliseconds(250)
    }

    #[test]
    fn test_hmac_roundtrip_and_field_sensitivity() {
        let key = b"hoge";
        let user_id = b"alice";
        let timestamp = timestamp_bytes(fixed_now().timestamp());
        let nonce = generate_nonce().unwrap();

        let mac = calculate_hmac(key, user_id, &timestamp, &nonce);
        assert_eq!(mac.len(), 32);
        assert!(valid_hmac(&mac, key, user_id, &timestamp, &nonce));

        let hex_mac = calculate_hex_hmac(key, user_id, &timestamp, &nonce);
        assert_eq!(hex_mac.len(), 64);
        assert!(valid_hex_hmac(&hex_mac, key, user_id, &timestamp, &nonce));

        // Different key
        assert!(!valid_hmac(&mac, b"fuga", user_id, &timestamp, &nonce));
        assert!(!valid_hex_hmac(&hex_mac, b"fuga", user_id, &timestamp, &nonce));

        // Different user
        assert!(!valid_hmac(&mac, key, b"bob", &timestamp, &nonce));
        assert!(!valid_hex_hmac(&hex_mac, key, b"bob", &timestamp, &nonce));

        // Different timestamp
        let later = timestamp_bytes(fixed_now().timestamp() + 30);
        assert!(!valid_hmac(&mac, key, user_id, &later, &nonce));
        assert!(!valid_hex_hmac(&hex_mac, key, user_id, &later, &nonce));

        // Different nonce
        let other_nonce = generate_nonce().unwrap();
        assert_ne!(nonce, other_nonce);
        assert!(!valid_hmac(&mac, key, user_id, &timestamp, &other_nonce));
        assert!(!valid_hex_hmac(&hex_mac, key, user_id, &timestamp, &other_nonce));
    }

    #[test]
    fn test_valid_hex_hmac_rejects_non_hex() {
        let nonce = generate_nonce().unwrap();
        let timestamp = timestamp_bytes(0);
        assert!(!valid_hex_hmac("not-hex", b"key", b"alice", &timestamp, &nonce));
        assert!(!valid_hex_hmac("abcd", b"key", b"alice", &timestamp, &nonce));
    }

    #[test]
    fn test_generate_auth_data_truncates_to_seconds() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        assert_eq!(data.user_id, "user001");
        assert_eq!(data.timestamp, now.timestamp());
        assert_eq!(data.nonce.len(), NONCE_LEN * 2);
        assert_eq!(data.hash.len(), 64);
    }

    #[test]
    fn test_valid_auth_data_at_issuance_second() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        let truncated = DateTime::<Utc>::from_timestamp(now.timestamp(), 0).unwrap();
        assert_eq!(valid_auth_data(&data, b"testappkey", "user001", truncated), Ok(()));
        assert_eq!(valid_auth_data(&data, b"testappkey", "user001", now), Ok(()));
    }

    #[test]
    fn test_valid_auth_data_expires_after_lifetime() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        let result = valid_auth_data(&data, b"testappkey", "user001", now + TimeDelta::seconds(1));
        assert_eq!(result, Err(AuthError::Expired));
    }

    #[test]
    fn test_valid_auth_data_accepts_check_time_before_issuance() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        let result = valid_auth_data(&data, b"testappkey", "user001", now - TimeDelta::hours(1));
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_valid_auth_data_rejects_other_user() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        let result = valid_auth_data(&data, b"testappkey", "user002", now - TimeDelta::seconds(1));
        assert_eq!(result, Err(AuthError::UserIdMismatch));
    }

    #[test]
    fn test_valid_auth_data_rejects_other_key() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        let result = valid_auth_data(&data, b"otherkey", "user001", now - TimeDelta::seconds(1));
        assert_eq!(result, Err(AuthError::InvalidHash));
    }

    #[test]
    fn test_valid_auth_data_rejects_tampered_fields() {
        let now = fixed_now();
        let data = generate_auth_data(b"testappkey", "user001", now).unwrap();

        let mut shifted = data.clone();
        shifted.timestamp -= 10;
        assert_eq!(
            valid_auth_data(&shifted, b"testappkey", "user001", now),
            Err(AuthError::InvalidHash)
        );

        let mut renonced = data.clone();
        renonced.nonce = hex::encode(generate_nonce().unwrap());
        assert_eq!(
            valid_auth_data(&renonced, b"testappkey", "user001", now),
            Err(AuthError::InvalidHash)
        );

        let mut garbled = data;
        garbled.nonce = "zz".to_string();
        assert!(matches!(
            valid_auth_data(&garbled, b"testappkey", "user001", now),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_auth_data_wire_form() {
        let data = AuthData {
            user_id: "id0001".to_string(),
            timestamp: 1_700_000_000,
            nonce: "0011223344556677".to_string(),
            hash: "ab".repeat(32),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["nonce"], "0011223344556677");
    }
}
