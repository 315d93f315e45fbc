//! HMAC-SHA256 signatures for notification ingress.
//!
//! Producers sign the raw request body with a shared secret and send
//! `X-Arrival-Signature: sha256=<hex>`. Verification is constant-time via the
//! `hmac` crate.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "x-arrival-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("malformed signature")]
    Malformed,

    #[error("signature verification failed")]
    Mismatch,

    #[error("invalid HMAC key: {0}")]
    InvalidKey(String),
}

/// Verify `signature` (`sha256=<hex>` or bare hex) over `body`.
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let hex_sig = signature.trim();
    let hex_sig = hex_sig.strip_prefix("sha256=").unwrap_or(hex_sig);
    let expected = hex_decode(hex_sig).ok_or(SignatureError::Malformed)?;

    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Compute the `sha256=<hex>` header value for `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex_encode(&mac.finalize().into_bytes())))
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
