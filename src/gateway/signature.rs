//! HMAC-SHA256 signing for the payment gateway trust boundary.
//!
//! The outbound signature covers the exact concatenation
//! `merchant_code + merchant_ref + amount`; any deviation in byte order is
//! rejected by the gateway. Callback verification recomputes the HMAC over
//! the raw body bytes as received, never over a re-serialized object, since
//! re-serialization can reorder keys and break the digest.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signature for an outbound transaction-creation request, hex-encoded.
pub fn sign_transaction(
    merchant_code: &str,
    merchant_ref: &str,
    amount: i64,
    private_key: &str,
) -> String {
    let mut mac = HmacSha256::new_from_slice(private_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(merchant_code.as_bytes());
    mac.update(merchant_ref.as_bytes());
    mac.update(amount.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies an `X-Callback-Signature` header against the raw request body.
/// Comparison happens in constant time via `Mac::verify_slice`. A malformed
/// hex header simply fails verification.
pub fn verify_callback(raw_body: &[u8], signature_hex: &str, private_key: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(private_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the callback signature for a body. Used by tests and by any
/// outbound webhook we may emit ourselves.
pub fn callback_signature(raw_body: &[u8], private_key: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(private_key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}
