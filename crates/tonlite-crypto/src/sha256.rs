//! SHA256 digests.
//!
//! Used for frame checksums (`SHA256(nonce || payload)`), key IDs, and the
//! handshake parameter hash.

use sha2::{Digest, Sha256};

/// Compute the SHA256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the SHA256 digest of several slices hashed in sequence.
///
/// Equivalent to hashing the concatenation without allocating it.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}
