//! ECDH over Ed25519 keys, as used by the ADNL handshake.
//!
//! TON identities are Ed25519 keys, but key agreement runs on the Montgomery
//! curve. The private seed is converted via SHA512 + RFC 7748 clamping, the
//! public key via the Edwards-to-Montgomery birational map, then a standard
//! X25519 exchange produces the shared secret.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha512};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Errors from key agreement.
#[derive(Debug, Error)]
pub enum EcdhError {
    /// The peer public key is not a valid Edwards point.
    #[error("invalid Ed25519 public key")]
    InvalidPublicKey,

    /// The shared secret came out all zeros (low-order point).
    #[error("weak key: shared secret is all zeros")]
    WeakKey,
}

/// Convert an Ed25519 seed to a clamped X25519 scalar.
fn ed25519_seed_to_x25519(seed: &[u8; 32]) -> [u8; 32] {
    let hash = Sha512::digest(seed);

    let mut scalar = [0u8; 32];
    scalar.copy_from_slice(&hash[..32]);

    // RFC 7748 clamping.
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;

    scalar
}

/// Convert an Ed25519 public key to its X25519 (Montgomery) form.
fn ed25519_public_to_x25519(public: &[u8; 32]) -> Result<[u8; 32], EcdhError> {
    let point = CompressedEdwardsY::from_slice(public)
        .map_err(|_| EcdhError::InvalidPublicKey)?
        .decompress()
        .ok_or(EcdhError::InvalidPublicKey)?;

    Ok(point.to_montgomery().to_bytes())
}

/// Compute the ADNL handshake shared secret from Ed25519 key material.
///
/// Symmetric: `shared(a_seed, b_pub) == shared(b_seed, a_pub)`. Rejects
/// peer keys that would yield an all-zero secret.
pub fn shared_secret_ed25519(
    my_seed: &[u8; 32],
    their_public: &[u8; 32],
) -> Result<[u8; 32], EcdhError> {
    let scalar = ed25519_seed_to_x25519(my_seed);
    let montgomery = ed25519_public_to_x25519(their_public)?;

    let secret = StaticSecret::from(scalar)
        .diffie_hellman(&PublicKey::from(montgomery))
        .to_bytes();

    if secret.iter().all(|&b| b == 0) {
        return Err(EcdhError::WeakKey);
    }
    Ok(secret)
}
