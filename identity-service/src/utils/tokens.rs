//! Bearer token utilities: opaque secrets and grant authorization codes.
//!
//! A code encodes `(owner id, issued-at epoch, nonce)` so expiry can be
//! checked without a separate table; the owning grant stores the codes it
//! has issued.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use service_core::error::AppError;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Generate an opaque bearer secret: 32 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time secret comparison.
pub fn verify_secret(candidate: &str, expected: &str) -> bool {
    candidate.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Mint an authorization code for `owner_id` issued at `issued_at`.
pub fn mint_code(owner_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    URL_SAFE_NO_PAD.encode(format!(
        "{owner_id}:{}:{}",
        issued_at.timestamp(),
        hex::encode(nonce)
    ))
}

/// A decoded authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    pub owner_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
}

/// Decode a code minted by [`mint_code`].
pub fn parse_code(code: &str) -> Result<Code, AppError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(code)
        .map_err(|_| AppError::Validation("malformed authorization code".to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| AppError::Validation("malformed authorization code".to_string()))?;
    let mut parts = decoded.splitn(3, ':');
    let (owner, epoch, nonce) = match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(epoch), Some(nonce)) => (owner, epoch, nonce),
        _ => return Err(AppError::Validation("malformed authorization code".to_string())),
    };
    let owner_id = Uuid::parse_str(owner)
        .map_err(|_| AppError::Validation("malformed authorization code".to_string()))?;
    let epoch: i64 = epoch
        .parse()
        .map_err(|_| AppError::Validation("malformed authorization code".to_string()))?;
    let issued_at = DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| AppError::Validation("malformed authorization code".to_string()))?;
    Ok(Code {
        owner_id,
        issued_at,
        nonce: nonce.to_string(),
    })
}

impl Code {
    /// Whether the code was issued within `max_age` of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.issued_at) <= max_age
    }
}
