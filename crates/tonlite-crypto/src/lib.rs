//! Cryptographic primitives for the TON liteserver client.
//!
//! The ADNL TCP handshake and session encryption need four capabilities,
//! and this crate provides exactly those:
//!
//! - **SHA256** digests for frame checksums and key IDs
//! - **AES-256-CTR** keystreams for session encryption
//! - **Ed25519** identity keypairs (servers publish Ed25519 keys)
//! - **ECDH** over those keys (converted to X25519) to derive the
//!   handshake shared secret
//!
//! Key IDs (ADNL addresses) are `SHA256(tl_prefix || public_key)` where the
//! prefix is the `pub.ed25519` TL constructor in little-endian.

pub mod cipher;
pub mod ecdh;
pub mod keys;
pub mod sha256;

pub use cipher::{derive_handshake_cipher, Cipher, SessionKeys};
pub use ecdh::{shared_secret_ed25519, EcdhError};
pub use keys::{key_id, Keypair, ED25519_TL_PREFIX};
pub use sha256::{sha256, sha256_concat};

/// Fill a buffer with cryptographically secure random bytes.
pub fn fill_random(dest: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(dest);
}

/// Generate a random 32-byte value (query IDs, frame nonces).
pub fn random_id() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    fill_random(&mut bytes);
    bytes
}
