//! Cryptographic Utilities
//!
//! Signed tokens have the shape `<payload>.<signature>` where the signature is
//! the URL-safe (unpadded) base64 of `HMAC-SHA256(secret, payload)`.

use base64::{Engine, engine::general_purpose};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Why a signed token was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("token is not of the form <payload>.<signature>")]
    Malformed,
    #[error("signature is not valid base64")]
    Encoding,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Generate a random 32-byte signing secret
pub fn random_secret() -> [u8; 32] {
    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    secret
}

/// Decode standard (padded) base64, as used for secrets in configuration
pub fn from_base64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::STANDARD.decode(s)
}

/// Compute HMAC-SHA256
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Sign `payload` and return `<payload>.<signature>`
///
/// The payload must not contain `.`.
pub fn sign_token(secret: &[u8], payload: &str) -> String {
    let signature = hmac_sha256(secret, payload.as_bytes());
    format!(
        "{}.{}",
        payload,
        general_purpose::URL_SAFE_NO_PAD.encode(signature)
    )
}

/// Verify a token produced by [`sign_token`] and return its payload
///
/// Comparison is constant-time.
pub fn verify_token<'a>(secret: &[u8], token: &'a str) -> Result<&'a str, SignatureError> {
    let (payload, signature_b64) = token.split_once('.').ok_or(SignatureError::Malformed)?;
    if payload.is_empty() || signature_b64.contains('.') {
        return Err(SignatureError::Malformed);
    }

    let signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| SignatureError::Encoding)?;

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| SignatureError::Mismatch)?;

    Ok(payload)
}
