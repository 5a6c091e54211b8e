//! Ed25519 authentication of interaction requests.
//!
//! The platform signs `timestamp || body` with the application's key and
//! sends the signature hex-encoded.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use super::error::CommandError;

pub const SIGNATURE_HEADER: &str = "X-Signature-Ed25519";
pub const TIMESTAMP_HEADER: &str = "X-Signature-Timestamp";

/// Parses the application's hex-encoded public key.
pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey, CommandError> {
    let bytes = hex::decode(hex_key.trim())
        .map_err(|e| CommandError::InvalidPublicKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CommandError::InvalidPublicKey("expected 32 bytes".into()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| CommandError::InvalidPublicKey(e.to_string()))
}

/// Returns `true` if `signature_hex` is a valid signature of
/// `timestamp || body`. Malformed input is simply invalid.
pub fn verify_interaction(key: &VerifyingKey, signature_hex: &str, timestamp: &str, body: &[u8]) -> bool {
    let Ok(bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&bytes);

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);

    key.verify(&message, &signature).is_ok()
}
