//! HMAC-SHA256 webhook signatures.
//!
//! The ACH gateway signs the raw request body with the shared webhook secret
//! and sends the lowercase hex digest in `x-remitian-signature`. Verification
//! must run over the exact bytes received, before any JSON parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_webhook_payload(body: &[u8], secret: &str) -> Result<String, CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a signature header against `body`.
///
/// A missing header, non-hex header, or wrong-length digest is simply
/// `false`.
pub fn verify_webhook_signature(body: &[u8], signature: Option<&str>, secret: &str) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
