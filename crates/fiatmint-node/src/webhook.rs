//! Payment processor webhook signatures.
//!
//! The processor signs the raw request body with a BLAKE3 keyed hash and
//! sends it hex-encoded in `x-signature`. The 32-byte key is derived from
//! the shared secret.

use zeroize::Zeroizing;

pub const SIGNATURE_HEADER: &str = "x-signature";

const KEY_CONTEXT: &str = "fiatmint 2024-06 payment webhook signing key";

/// Derive the keyed-hash key from a shared secret.
pub fn signing_key(secret: &str) -> Zeroizing<[u8; 32]> {
    Zeroizing::new(blake3::derive_key(KEY_CONTEXT, secret.as_bytes()))
}

/// Hex signature of `body` under `key`.
pub fn sign(key: &[u8; 32], body: &[u8]) -> String {
    hex::encode(blake3::keyed_hash(key, body).as_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify(key: &[u8; 32], body: &[u8], signature: &str) -> bool {
    let Ok(bytes) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(raw) = <[u8; 32]>::try_from(bytes.as_slice()) else {
        return false;
    };
    blake3::Hash::from(raw) == blake3::keyed_hash(key, body)
}
